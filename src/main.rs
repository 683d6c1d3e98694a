// balance-watch - SMS balance monitor
// Polls the SMS gateway balance and sends rate-limited low-balance alerts

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match dotenv::dotenv() {
        Ok(path) => info!("📄 Loaded .env from {:?}", path),
        Err(e) => warn!("⚠️  Could not load .env file: {}", e),
    }

    info!("🏗️  Starting balance-watch");

    if let Err(e) = balance_watch::run().await {
        error!("💥 {:#}", e);
        std::process::exit(1);
    }
}
