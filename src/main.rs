mod activity_log;
mod ai;
mod bridge;
mod config;
mod console;
mod context;
mod device;
mod editor;
mod learn;
mod mapping;
mod router;
mod session;
mod store;

use crate::ai::{AiGateway, GeminiClient};
use crate::config::{AppConfig, ConfigLoader};
use crate::session::Session;
use anyhow::Result;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "config/typist.json";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout belongs to the console
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting MIDI Typist");

    let config = load_config()?;

    let (bridge, events) = bridge::connect(&config.host_addr).await?;

    let gateway = AiGateway::new(
        GeminiClient::new(&config.ai),
        Duration::from_secs(config.ai.timeout_secs),
    );
    let (session, ai_results) = Session::new(bridge, gateway, config.log_capacity);

    let input = console::spawn_stdin_reader();
    info!("Ready, type 'help' for commands");

    let exit = router::run(session, events, ai_results, input, tokio::signal::ctrl_c()).await;
    info!("Shutting down MIDI Typist ({:?})", exit);

    Ok(())
}

fn load_config() -> Result<AppConfig> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    match ConfigLoader::load_or_default(&path) {
        Ok(config) => {
            info!("Using configuration from {} (host {})", path, config.host_addr);
            Ok(config)
        }
        Err(e) => {
            error!("Failed to load config: {e:#}");
            Err(e)
        }
    }
}
