use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Resolves on SIGINT (Ctrl+C) or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}

/// Spawns a task that flips the returned receiver to `true` once a shutdown
/// signal arrives.
pub fn spawn_signal_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("🛑 Shutdown requested, finishing current check");
        let _ = tx.send(true);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn shutdown_signal_waits_for_a_signal() {
        let result = timeout(Duration::from_millis(10), shutdown_signal()).await;
        assert!(result.is_err(), "shutdown_signal should wait for signal");
    }

    #[tokio::test]
    async fn listener_starts_unsignalled() {
        let rx = spawn_signal_listener();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!*rx.borrow());
    }
}
