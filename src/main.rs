use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pm2_dashboard::config::{self, Config, PORT_ENV};
use pm2_dashboard::web_server;

#[derive(Parser, Debug)]
#[command(name = "pm2-dashboard", version, about = "Web dashboard for PM2 managed processes")]
struct Cli {
    /// Port to listen on (overrides PORT and the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file to read instead of ~/.pm2-dashboard/config.json
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serve the dashboard page and assets from this directory
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "pm2_dashboard=trace"
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filter) = &cli.log_level {
        logger.parse_filters(filter);
    }
    logger.init();

    let config = load_config(&cli)?;
    if config.uses_default_password() {
        log::warn!("Using the default password; set \"password\" in the config file");
    }

    log::info!("Starting PM2 dashboard on port {}", config.port);
    web_server::create_web_server(config, cli.static_dir).await
}

fn load_config(cli: &Cli) -> Result<Config> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config::default_config_path().context("Could not determine home directory")?,
    };

    let env_port = std::env::var(PORT_ENV).ok();
    Config::resolve(&path, env_port.as_deref(), cli.port)
}
