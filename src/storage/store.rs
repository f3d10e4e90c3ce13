use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::alerts::AlertState;
use crate::data::PendingAppointment;

/// New values written by a cycle that still observes a delay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayUpdate {
    /// Used as `checking_started` only if that is still unset
    pub observed_at: DateTime<Utc>,
    pub delay: TimeDelta,
    pub start_cutoff: DateTime<Utc>,
}

/// Persistent state consulted and updated by the delay-alert engine
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insert an empty alert row for the business unless one exists.
    /// Returns whether a row was created.
    async fn start_monitoring(&self, business_id: &str) -> Result<bool, StoreError>;

    /// All alert rows joined with their business name
    async fn alert_states(&self) -> Result<Vec<AlertState>, StoreError>;

    /// `started_at - start` of the `limit` most recently started
    /// appointments scheduled on `day`, newest first
    async fn recent_delays(
        &self,
        business_id: &str,
        day: NaiveDate,
        limit: usize,
    ) -> Result<Vec<TimeDelta>, StoreError>;

    /// Appointments neither started, finished nor canceled whose scheduled
    /// start lies in `[start, end)`
    async fn pending_appointments(
        &self,
        business_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PendingAppointment>, StoreError>;

    /// Update the alert row of a still-delayed business. Never creates a
    /// row: returns `false`, writing nothing, when monitoring was stopped.
    async fn record_delay(&self, business_id: &str, update: DelayUpdate)
        -> Result<bool, StoreError>;

    /// Delete the alert row. Returns whether one existed.
    async fn clear_alert(&self, business_id: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Business '{0}' not found")]
    BusinessNotFound(String),

    #[error("Appointment '{0}' not found")]
    AppointmentNotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
