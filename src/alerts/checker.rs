//! One delay-alert cycle for one business

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;

use super::config::{AlertConfig, AlertState};
use super::delay::{has_delay, mean_delay, NotificationWindow};
use super::notifier::{Delivery, DeliveryFailures, NotificationSender};
use super::payload::NotificationPayload;
use crate::clock::SharedClock;
use crate::storage::{AlertStore, DelayUpdate, StoreError};

/// Where a business stands after a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Still late; alert row updated
    Delayed,
    /// No delay any more; alert row deleted
    Resolved,
    /// Still late, but monitoring was stopped while the cycle ran; nothing
    /// written
    Stopped,
}

/// What a completed cycle did
#[derive(Debug)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub delay: TimeDelta,
    pub window: NotificationWindow,
    /// Notifications accepted by the push service
    pub notified: usize,
    /// Pending appointments without any channel to reach them
    pub unreachable: usize,
    /// Deliveries that failed; they never abort the cycle
    pub failures: Option<DeliveryFailures>,
}

/// Runs delay-alert cycles against the store
pub struct AlertWorker {
    store: Arc<dyn AlertStore>,
    sender: NotificationSender,
    clock: SharedClock,
    config: AlertConfig,
}

impl AlertWorker {
    pub fn new(
        store: Arc<dyn AlertStore>,
        sender: NotificationSender,
        clock: SharedClock,
        config: AlertConfig,
    ) -> Self {
        Self {
            store,
            sender,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Recompute the delay of `state`'s business, notify the customers in
    /// the selected window and persist the new state.
    #[tracing::instrument(skip_all, fields(business_id = %state.business_id))]
    pub async fn run_cycle(&self, state: &AlertState) -> Result<CycleReport, CycleError> {
        let business_id = state.business_id.as_str();
        let now = self.clock.now();

        let mean = self
            .bounded(
                "fetching delay",
                mean_delay(
                    self.store.as_ref(),
                    business_id,
                    self.config.sample_size,
                    self.clock.today(),
                ),
            )
            .await?;
        // Not enough starts yet reads as on time
        let delay = mean.unwrap_or(TimeDelta::zero());
        let delayed = has_delay(delay, self.config.delay_threshold);

        tracing::info!(
            checking_started = ?state.checking_started,
            last_delay = ?state.last_delay,
            last_cutoff = ?state.last_start_cutoff,
            delay = ?delay,
            delayed,
            "Running delay alert cycle"
        );

        let window = NotificationWindow::select(state, delay, delayed, now, &self.config);

        let pending = self
            .bounded(
                "selecting appointments",
                self.store
                    .pending_appointments(business_id, window.start, window.end),
            )
            .await?;

        let mut deliveries = Vec::with_capacity(pending.len());
        let mut unreachable = 0;
        for appt in pending {
            // Phone and email have no delivery channel yet
            let Some(subscription) = appt.push else {
                unreachable += 1;
                continue;
            };
            let payload = if delayed {
                NotificationPayload::delay_detected(
                    business_id,
                    &state.business_name,
                    delay,
                    &appt.customer_link,
                )
            } else {
                NotificationPayload::delay_resolved(
                    business_id,
                    &state.business_name,
                    &appt.customer_link,
                )
            };
            deliveries.push(Delivery {
                subscription,
                payload,
            });
        }

        if unreachable > 0 {
            tracing::debug!(unreachable, "Pending appointments without push subscription");
        }

        let (notified, failures) = match self.sender.send_all(deliveries).await {
            Ok(sent) => (sent, None),
            Err(failures) => {
                for failure in &failures.failures {
                    tracing::warn!(error = %failure, "Push delivery failed");
                }
                (failures.sent, Some(failures))
            }
        };

        let outcome = if delayed {
            let update = DelayUpdate {
                observed_at: now,
                delay,
                start_cutoff: now + self.config.alert_window,
            };
            let updated = self
                .bounded("updating alert", self.store.record_delay(business_id, update))
                .await?;
            if updated {
                CycleOutcome::Delayed
            } else {
                tracing::warn!("Alert row gone, delay not recorded");
                CycleOutcome::Stopped
            }
        } else {
            self.bounded("deleting alert", self.store.clear_alert(business_id))
                .await?;
            tracing::info!("Delay resolved, monitoring stopped");
            CycleOutcome::Resolved
        };

        Ok(CycleReport {
            outcome,
            delay,
            window,
            notified,
            unreachable,
            failures,
        })
    }

    /// Run a store call under the configured timeout
    async fn bounded<T, F>(&self, op: &'static str, call: F) -> Result<T, CycleError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timeout = self.config.store_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(CycleError::Store { op, source }),
            Err(_) => Err(CycleError::Timeout { op, timeout }),
        }
    }
}

/// Failures that abort a cycle; the next tick retries
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("{op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{op}: store call timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },
}
