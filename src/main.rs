mod bot;
mod config;
mod inference;
mod platform;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::Relay;
use crate::config::Config;
use crate::inference::{HfInferenceClient, Inference};
use crate::platform::telegram::{Messenger, TelegramClient};
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hum_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional config file; environment variables take precedence
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &config_path {
        info!("Loading configuration from: {}", path.display());
    }
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  Mode: {}", config.relay.mode);
    info!("  Text model: {}", config.inference.text_model);
    info!("  Speech model: {}", config.inference.speech_model);
    info!("  Webhook URL: {}", config.telegram.webhook_url());

    for name in config.missing_credentials() {
        warn!("{} is not set; related features are unavailable", name);
    }

    let messenger = TelegramClient::new(&config.telegram)?
        .map(|client| Arc::new(client) as Arc<dyn Messenger>);
    let inference = HfInferenceClient::new(config.inference.clone())
        .map(|client| Arc::new(client) as Arc<dyn Inference>);

    let state = AppState {
        relay: Arc::new(Relay::new(config.relay.clone(), messenger, inference)),
        webhook_url: config.telegram.webhook_url(),
    };

    server::serve(&config, state).await
}
