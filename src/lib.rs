//! Browser dashboard for PM2.
//!
//! The server never manages processes itself: it forwards a small, validated
//! set of `pm2` commands and relays `pm2 jlist` to authenticated clients,
//! either on request or pushed over a WebSocket.

pub mod commands;
pub mod config;
pub mod error;
pub mod web;
pub mod web_server;
