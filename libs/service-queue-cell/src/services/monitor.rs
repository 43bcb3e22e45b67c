use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::services::dispatcher::QueueCallDispatcher;

/// Background sweep that auto-skips patients who never arrived at their booth.
pub struct NoShowMonitor {
    dispatcher: Arc<QueueCallDispatcher>,
    sweep_interval: Duration,
    is_shutdown: RwLock<bool>,
}

impl NoShowMonitor {
    pub fn new(dispatcher: Arc<QueueCallDispatcher>) -> Self {
        let seconds = dispatcher.policy().no_show_sweep_interval_seconds.max(1);
        Self {
            dispatcher,
            sweep_interval: Duration::from_secs(seconds),
            is_shutdown: RwLock::new(false),
        }
    }

    pub fn with_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Runs until `shutdown` is called.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        info!(
            "Starting no-show monitor (every {:?}, grace {}s)",
            self.sweep_interval,
            self.dispatcher.policy().no_show_grace_seconds
        );

        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if *self.is_shutdown.read().await {
                debug!("No-show monitor received shutdown signal");
                break;
            }

            let skipped = self.dispatcher.sweep_no_shows().await;
            if !skipped.is_empty() {
                warn!("No-show sweep skipped {} task(s)", skipped.len());
            }
        }

        info!("No-show monitor stopped");
    }

    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }
}
