//! Background reclamation of pending bookings past their time-to-live.

use super::coordinator::CheckoutCoordinator;
use crate::config::ReconciliationConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodic sweep over stale pending bookings
pub struct Sweeper {
    coordinator: Arc<CheckoutCoordinator>,
    ttl: chrono::Duration,
    interval: Duration,
    batch_size: usize,
    shutdown: watch::Receiver<bool>,
}

impl Sweeper {
    /// Create a sweeper and the sender that stops it.
    ///
    /// Send `true` to stop the loop after the current sweep.
    #[must_use]
    pub fn new(
        coordinator: Arc<CheckoutCoordinator>,
        config: &ReconciliationConfig,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper = Self {
            coordinator,
            ttl: config.pending_ttl(),
            interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            batch_size: config.sweep_batch_size.max(1),
            shutdown: shutdown_rx,
        };
        (sweeper, shutdown_tx)
    }

    /// Run until the shutdown signal is received
    pub async fn run(mut self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            ttl_secs = self.ttl.num_seconds(),
            batch_size = self.batch_size,
            "Pending booking sweeper started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*self.shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.coordinator.sweep_expired(self.ttl, self.batch_size).await {
                        tracing::error!(error = %e, "Pending booking sweep failed");
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Pending booking sweeper stopped");
    }

    /// Run on a background task
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
