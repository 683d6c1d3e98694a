use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::alert::{Action, AlertEngine, SkipReason, StateUpdate};
use crate::config::AppConfig;
use crate::domain::MonitorState;
use crate::notifier::NotifierHub;
use crate::provider::{ProviderError, SmsProvider};
use crate::state::StateStore;
use crate::utils::mask_url;

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    FetchFailed,
    Skipped(SkipReason),
    /// `delivered` is false when the SMS could not be sent; the slot is still used.
    Notified { number: u32, delivered: bool },
}

pub struct BalanceWatcher {
    config: AppConfig,
    alert_engine: AlertEngine,
    provider: Arc<dyn SmsProvider>,
    store: StateStore,
    notifier: NotifierHub,
}

impl BalanceWatcher {
    pub fn new(
        config: AppConfig,
        alert_engine: AlertEngine,
        provider: Arc<dyn SmsProvider>,
        store: StateStore,
        notifier: NotifierHub,
    ) -> Self {
        Self {
            config,
            alert_engine,
            provider,
            store,
            notifier,
        }
    }

    /// Checks immediately, then again `check_interval` after each check
    /// completes, until `shutdown` flips to `true`.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let policy = self.alert_engine.policy();
        info!(
            "🔌 Monitoring {} balance at {}",
            self.provider.name(),
            mask_url(self.config.provider.base_url())
        );
        info!(
            "📋 Threshold {}, cooldown {}m, max {} notifications, min change {}",
            policy.threshold,
            policy.notification_cooldown.as_secs() / 60,
            policy.max_consecutive_notifications,
            policy.balance_change_threshold
        );
        info!(
            "👁️  Checking every {}s, alerting {} recipient(s), state in {}",
            self.config.check_interval.as_secs(),
            self.notifier.recipients().len(),
            self.store.path().display()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match AssertUnwindSafe(self.run_cycle(Utc::now()))
                .catch_unwind()
                .await
            {
                Ok(outcome) => debug!("Check finished: {:?}", outcome),
                Err(panic) => error!("💥 Check aborted: {}", panic_message(&*panic)),
            }

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = sleep(self.config.check_interval) => {}
            }
        }

        let state = self.store.load().await;
        info!(
            "👋 Stopped after {} checks, {} notifications sent",
            state.total_checks, state.total_notifications
        );
    }

    /// One poll: record the check, fetch the balance, decide, notify.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let mut state = self.store.load().await;
        state.record_check(now);
        self.persist(&state).await;

        let provider = self.provider.name();
        let balance = match bounded(self.config.request_timeout, self.provider.check_balance()).await
        {
            Ok(balance) => balance,
            Err(e) => {
                error!("❌ Balance check via {} failed: {}", provider, e);
                return CycleOutcome::FetchFailed;
            }
        };
        info!(
            "💰 {} balance: {} (threshold {})",
            provider,
            balance,
            self.alert_engine.policy().threshold
        );

        let mut state = self.store.load().await;
        let decision = self.alert_engine.decide(now, balance, &state);
        if decision.update.apply(&mut state) {
            self.persist(&state).await;
        }

        match decision.action {
            Action::Skip(reason) => {
                if let StateUpdate::Recovered {
                    reset_count: true, ..
                } = decision.update
                {
                    info!("✅ Balance recovered above threshold, notification counter reset");
                }
                info!("⏭️  No notification: {}", reason);
                CycleOutcome::Skipped(reason)
            }
            Action::Send {
                notification_number,
            } => {
                warn!(
                    "🚨 Balance {} is at or below {}, sending notification #{}",
                    balance,
                    self.alert_engine.policy().threshold,
                    notification_number
                );
                let alert =
                    self.alert_engine
                        .compose_alert(provider, balance, notification_number, now);
                let delivered =
                    match bounded(self.config.request_timeout, self.notifier.send(&alert)).await {
                        Ok(_) => true,
                        Err(e) => {
                            error!(
                                "❌ Notification #{} not delivered ({}), slot still counted",
                                notification_number, e
                            );
                            false
                        }
                    };
                CycleOutcome::Notified {
                    number: notification_number,
                    delivered,
                }
            }
        }
    }

    pub async fn current_state(&mut self) -> MonitorState {
        self.store.load().await
    }

    async fn persist(&mut self, state: &MonitorState) {
        if let Err(e) = self.store.save(state).await {
            warn!(
                "⚠️  Could not persist state to {}: {}",
                self.store.path().display(),
                e
            );
        }
    }
}

async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    timeout(limit, call)
        .await
        .unwrap_or(Err(ProviderError::Timeout(limit)))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            // Sender gone without signalling; keep polling forever.
            std::future::pending::<()>().await;
        }
    }
}
