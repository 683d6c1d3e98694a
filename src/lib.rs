pub mod alert;
pub mod config;
pub mod domain;
pub mod notifier;
pub mod provider;
pub mod shutdown;
pub mod state;
pub mod utils;
pub mod watcher;

use alert::AlertEngine;
use config::AppConfig;
use notifier::{ConsoleNotifier, NotifierHub};
use state::StateStore;
use watcher::BalanceWatcher;

use anyhow::{Context, Result};
use tracing::info;

pub async fn run() -> Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;
    let provider = provider::build_provider(&config.provider, config.request_timeout)
        .context("could not initialise SMS provider")?;
    info!("📱 Using {} provider", provider.name());

    let alert_engine = AlertEngine::new(config.policy);
    let store = StateStore::new(&config.state_file);
    let notifier = NotifierHub::new(
        ConsoleNotifier::new(),
        provider.clone(),
        config.recipients.clone(),
    );

    let shutdown = shutdown::spawn_signal_listener();
    let mut app = BalanceWatcher::new(config, alert_engine, provider, store, notifier);
    app.run(shutdown).await;
    Ok(())
}
