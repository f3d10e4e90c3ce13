//! Fixtures shared by the alert engine tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use parking_lot::Mutex;

use super::checker::AlertWorker;
use super::config::AlertConfig;
use super::notifier::{DeliveryStatus, NotificationSender, NotifierError, PushTransport};
use crate::clock::FixedClock;
use crate::data::{Appointment, Business, PushSubscription};
use crate::storage::MemoryStore;

/// Records deliveries; endpoints listed in `failing` answer 410
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(String, serde_json::Value)>>,
    pub failing: Vec<String>,
}

impl RecordingTransport {
    pub fn failing(endpoints: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: endpoints.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn endpoints(&self) -> Vec<String> {
        let mut endpoints: Vec<String> = self.sent.lock().iter().map(|(e, _)| e.clone()).collect();
        endpoints.sort();
        endpoints
    }

    pub fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|(_, js)| js["title"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        body: Vec<u8>,
        _ttl: Duration,
    ) -> Result<DeliveryStatus, NotifierError> {
        let js: serde_json::Value = serde_json::from_slice(&body).unwrap();
        self.sent.lock().push((subscription.endpoint.clone(), js));
        let status = if self.failing.contains(&subscription.endpoint) {
            410
        } else {
            201
        };
        Ok(DeliveryStatus {
            status,
            body: String::new(),
        })
    }
}

pub fn subscription(endpoint: &str) -> PushSubscription {
    PushSubscription {
        endpoint: endpoint.to_string(),
        keys: Default::default(),
    }
}

pub fn subscription_json(endpoint: &str) -> String {
    serde_json::json!({
        "endpoint": endpoint,
        "keys": { "p256dh": "pk", "auth": "ak" }
    })
    .to_string()
}

/// 2020-05-13 14:05 UTC
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 5, 13, 14, 5, 0).unwrap()
}

pub fn mins(m: i64) -> TimeDelta {
    TimeDelta::minutes(m)
}

/// Store with business `b1` ("Barber") registered
pub fn store_with_business() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.upsert_business(Business::new("b1", "Barber"));
    store
}

/// Appointment that started `late` minutes after its scheduled start
pub fn add_started(store: &MemoryStore, id: &str, start: DateTime<Utc>, late: i64) {
    store
        .upsert_appointment(
            Appointment::new(id, "b1", start, start + mins(30)).with_started_at(start + mins(late)),
        )
        .unwrap();
}

/// Pending appointment of `b1`, with a push handle when `push` is set
pub fn add_pending(store: &MemoryStore, id: &str, start: DateTime<Utc>, push: bool) {
    let mut appt = Appointment::new(id, "b1", start, start + mins(30));
    if push {
        appt = appt.with_push_subscription(subscription_json(&format!("https://push/{}", id)));
    }
    store.upsert_appointment(appt).unwrap();
}

pub fn worker(
    store: Arc<MemoryStore>,
    transport: Arc<RecordingTransport>,
    clock: FixedClock,
    config: AlertConfig,
) -> AlertWorker {
    let sender = NotificationSender::new(transport, config.push_ttl);
    AlertWorker::new(store, sender, Arc::new(clock), config)
}
