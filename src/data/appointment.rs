use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business offering appointments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Business {
    pub id: String,
    pub name: String,
}

impl Business {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A booked appointment as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub business_id: String,
    /// Customer-facing reference used in links sent to the customer
    pub customer_link: String,
    /// Scheduled start
    pub start: DateTime<Utc>,
    /// Scheduled end
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Raw push subscription JSON as registered by the customer's browser
    #[serde(default)]
    pub push_subscription: Option<String>,
}

impl Appointment {
    pub fn new(
        id: impl Into<String>,
        business_id: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let id = id.into();
        Self {
            customer_link: id.clone(),
            id,
            business_id: business_id.into(),
            start,
            end,
            started_at: None,
            finished_at: None,
            canceled_at: None,
            phone: None,
            email: None,
            push_subscription: None,
        }
    }

    pub fn with_customer_link(mut self, link: impl Into<String>) -> Self {
        self.customer_link = link.into();
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_push_subscription(mut self, raw: impl Into<String>) -> Self {
        self.push_subscription = Some(raw.into());
        self
    }

    /// Not started, finished nor canceled
    pub fn is_pending(&self) -> bool {
        self.started_at.is_none() && self.finished_at.is_none() && self.canceled_at.is_none()
    }

    /// Parsed push handle; malformed blobs count as no handle
    pub fn push_handle(&self) -> Option<PushSubscription> {
        let raw = self.push_subscription.as_deref()?;
        match serde_json::from_str(raw) {
            Ok(sub) => Some(sub),
            Err(e) => {
                tracing::debug!(
                    appointment_id = %self.id,
                    error = %e,
                    "Ignoring malformed push subscription"
                );
                None
            }
        }
    }
}

/// Browser push subscription: endpoint plus the client's encryption keys
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default)]
    pub keys: PushKeys,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushKeys {
    #[serde(default)]
    pub p256dh: String,
    #[serde(default)]
    pub auth: String,
}

/// Appointment eligible for a delay notification
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAppointment {
    pub appointment_id: String,
    pub customer_link: String,
    pub start: DateTime<Utc>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub push: Option<PushSubscription>,
}

impl From<&Appointment> for PendingAppointment {
    fn from(a: &Appointment) -> Self {
        Self {
            appointment_id: a.id.clone(),
            customer_link: a.customer_link.clone(),
            start: a.start,
            phone: a.phone.clone(),
            email: a.email.clone(),
            push: a.push_handle(),
        }
    }
}
