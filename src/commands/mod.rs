pub mod executor;
pub mod gateway;
pub mod pm2;
pub mod process_monitor;
