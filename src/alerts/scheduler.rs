//! Periodic fetch of monitored businesses

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use super::config::{AlertConfig, AlertState};
use super::queue::QueueManager;
use crate::storage::{AlertStore, StoreError};

/// Load every business under monitoring together with its alert state
pub async fn fetch_states(
    store: &dyn AlertStore,
    timeout: Duration,
) -> Result<Vec<AlertState>, FetchError> {
    match tokio::time::timeout(timeout, store.alert_states()).await {
        Ok(result) => result.map_err(FetchError::Store),
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}

/// Wakes every `tick_interval` and feeds the queue
pub struct Scheduler {
    store: Arc<dyn AlertStore>,
    queue: Arc<QueueManager>,
    interval: Duration,
    store_timeout: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<dyn AlertStore>, queue: Arc<QueueManager>, config: &AlertConfig) -> Self {
        Self {
            store,
            queue,
            interval: config.tick_interval,
            store_timeout: config.store_timeout,
        }
    }

    /// Start the scheduling loop. It only ends with the runtime.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let span = tracing::info_span!("delay_alerts");
        tokio::spawn(async move { self.run().await }.instrument(span))
    }

    async fn run(&self) {
        tracing::info!("Delay alert scheduler started with interval {:?}", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;
            self.tick().await;
        }
    }

    /// One fetch + dispatch pass. Returns the number of states fetched.
    pub async fn tick(&self) -> usize {
        let states = match fetch_states(self.store.as_ref(), self.store_timeout).await {
            Ok(states) => states,
            Err(e) => {
                // Retried on the next interval
                tracing::error!(error = %e, "Failed to fetch delay alerts");
                return 0;
            }
        };

        let fetched = states.len();
        if fetched > 0 {
            let spawned = self.queue.dispatch(states);
            tracing::debug!(fetched, spawned, "Dispatched delay alerts");
        }
        fetched
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("selecting alerts: {0}")]
    Store(#[from] StoreError),

    #[error("selecting alerts: timed out after {0:?}")]
    Timeout(Duration),
}
