use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::store::{AlertStore, DelayUpdate, StoreError};
use crate::alerts::AlertState;
use crate::data::{Appointment, Business, PendingAppointment};

/// Lifecycle timestamps an appointment can receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    Started,
    Finished,
    Canceled,
}

#[derive(Debug, Clone, Default)]
struct AlertRow {
    checking_started: Option<DateTime<Utc>>,
    last_delay: Option<TimeDelta>,
    last_start_cutoff: Option<DateTime<Utc>>,
}

/// In-memory store holding businesses, appointments and alert rows
pub struct MemoryStore {
    businesses: DashMap<String, Business>,
    /// Appointments indexed by ID
    appointments: DashMap<String, Appointment>,
    /// At most one alert row per business
    alerts: DashMap<String, AlertRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            businesses: DashMap::new(),
            appointments: DashMap::new(),
            alerts: DashMap::new(),
        }
    }

    /// Insert or rename a business
    pub fn upsert_business(&self, business: Business) {
        self.businesses.insert(business.id.clone(), business);
    }

    pub fn business(&self, id: &str) -> Option<Business> {
        self.businesses.get(id).map(|b| b.clone())
    }

    /// Insert or replace an appointment. Returns true if it was new.
    pub fn upsert_appointment(&self, appointment: Appointment) -> Result<bool, StoreError> {
        if !self.businesses.contains_key(&appointment.business_id) {
            return Err(StoreError::BusinessNotFound(appointment.business_id));
        }
        Ok(self
            .appointments
            .insert(appointment.id.clone(), appointment)
            .is_none())
    }

    pub fn appointment(&self, id: &str) -> Option<Appointment> {
        self.appointments.get(id).map(|a| a.clone())
    }

    /// Stamp an appointment lifecycle timestamp
    pub fn set_milestone(
        &self,
        appointment_id: &str,
        milestone: Milestone,
        at: DateTime<Utc>,
    ) -> Result<Appointment, StoreError> {
        let mut appt = self
            .appointments
            .get_mut(appointment_id)
            .ok_or_else(|| StoreError::AppointmentNotFound(appointment_id.to_string()))?;

        match milestone {
            Milestone::Started => appt.started_at = Some(at),
            Milestone::Finished => appt.finished_at = Some(at),
            Milestone::Canceled => appt.canceled_at = Some(at),
        }
        Ok(appt.clone())
    }

    /// Attach a raw push subscription to the appointment with this customer link.
    /// Returns whether an appointment matched.
    pub fn set_push_subscription(&self, customer_link: &str, raw: String) -> bool {
        let mut matched = false;
        for mut appt in self.appointments.iter_mut() {
            if appt.customer_link == customer_link {
                appt.push_subscription = Some(raw.clone());
                matched = true;
            }
        }
        matched
    }

    /// Number of businesses under monitoring
    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
    (start, start + TimeDelta::days(1))
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn start_monitoring(&self, business_id: &str) -> Result<bool, StoreError> {
        if !self.businesses.contains_key(business_id) {
            return Err(StoreError::BusinessNotFound(business_id.to_string()));
        }
        match self.alerts.entry(business_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(AlertRow::default());
                Ok(true)
            }
        }
    }

    async fn alert_states(&self) -> Result<Vec<AlertState>, StoreError> {
        let mut states: Vec<AlertState> = self
            .alerts
            .iter()
            .filter_map(|row| {
                let business = self.businesses.get(row.key())?;
                Some(AlertState {
                    business_id: row.key().clone(),
                    business_name: business.name.clone(),
                    checking_started: row.checking_started,
                    last_delay: row.last_delay,
                    last_start_cutoff: row.last_start_cutoff,
                })
            })
            .collect();
        states.sort_by(|a, b| a.business_id.cmp(&b.business_id));
        Ok(states)
    }

    async fn recent_delays(
        &self,
        business_id: &str,
        day: NaiveDate,
        limit: usize,
    ) -> Result<Vec<TimeDelta>, StoreError> {
        let (day_start, day_end) = day_bounds(day);

        let mut started: Vec<(DateTime<Utc>, TimeDelta)> = self
            .appointments
            .iter()
            .filter(|a| a.business_id == business_id && a.end >= day_start && a.start < day_end)
            .filter_map(|a| a.started_at.map(|at| (at, at - a.start)))
            .collect();

        started.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(started.into_iter().take(limit).map(|(_, d)| d).collect())
    }

    async fn pending_appointments(
        &self,
        business_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PendingAppointment>, StoreError> {
        let mut pending: Vec<PendingAppointment> = self
            .appointments
            .iter()
            .filter(|a| {
                a.business_id == business_id && a.is_pending() && a.start >= start && a.start < end
            })
            .map(|a| PendingAppointment::from(a.value()))
            .collect();

        pending.sort_by(|a, b| a.start.cmp(&b.start));
        Ok(pending)
    }

    async fn record_delay(
        &self,
        business_id: &str,
        update: DelayUpdate,
    ) -> Result<bool, StoreError> {
        let Some(mut row) = self.alerts.get_mut(business_id) else {
            return Ok(false);
        };
        row.checking_started.get_or_insert(update.observed_at);
        // Stored as whole seconds
        row.last_delay = Some(TimeDelta::seconds(update.delay.num_seconds()));
        row.last_start_cutoff = Some(update.start_cutoff);
        Ok(true)
    }

    async fn clear_alert(&self, business_id: &str) -> Result<bool, StoreError> {
        Ok(self.alerts.remove(business_id).is_some())
    }
}
