//! Shared application state.
//!
//! Holds the configuration and the single [`Gatekeeper`] instance built at
//! startup. Cloning is cheap; every field is an `Arc` or a handle.
//!
//! # Structured Concurrency
//!
//! The state owns one background task, the sweeper, which evicts expired rate
//! windows and token cache entries every `STATE_SWEEP_INTERVAL_SECS`. It is
//! tracked with `tokio_util::task::TaskTracker` and stopped through a
//! `CancellationToken`; call [`AppState::shutdown`] before exit.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::auth::{Gatekeeper, IntrospectionClient};
use crate::config::Config;

/// Shared application state for the router and handlers.
///
/// Must be created inside a Tokio runtime: construction spawns the sweeper.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gatekeeper: Arc<Gatekeeper>,
    /// Timestamp when the application started
    pub started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, introspector: IntrospectionClient) -> Self {
        let gatekeeper = Arc::new(Gatekeeper::new(&config, introspector));

        let state = Self {
            config: Arc::new(config),
            gatekeeper,
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_sweeper_task();
        state
    }

    /// Spawn the periodic state sweeper.
    ///
    /// Only the gatekeeper handle is moved into the task.
    fn spawn_sweeper_task(&self) {
        let gatekeeper = self.gatekeeper.clone();
        let period = self.config.state_sweep_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("State sweeper received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let stats = gatekeeper.sweep().await;
                        trace!(
                            rate_windows = stats.rate_windows,
                            cache_entries = stats.cache_entries,
                            "State sweep completed"
                        );
                    }
                }
            }

            debug!("State sweeper shutting down");
        });
    }

    /// Gracefully stop background tasks and wait for them.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Whether [`AppState::shutdown`] has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn state(sweep: Duration) -> AppState {
        let config = Config {
            state_sweep_interval: sweep,
            ..Config::default()
        };
        let introspector = IntrospectionClient::with_http_client(reqwest::Client::new(), &config);
        AppState::new(config, introspector)
    }

    #[tokio::test]
    async fn test_shutdown_stops_sweeper() {
        let state = state(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;

        tokio::time::timeout(Duration::from_secs(1), state.shutdown())
            .await
            .unwrap_or_else(|_| panic!("sweeper did not stop"));
    }

    #[tokio::test]
    async fn test_uptime_starts_at_zero() {
        let state = state(Duration::from_secs(60));
        assert_eq!(state.uptime_seconds(), 0);
        state.shutdown().await;
    }
}
