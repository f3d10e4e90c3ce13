//! Push notification delivery

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use super::payload::NotificationPayload;
use crate::data::PushSubscription;

/// Response of the push service for one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryStatus {
    pub status: u16,
    pub body: String,
}

/// Channel addressed by a push subscription
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        body: Vec<u8>,
        ttl: Duration,
    ) -> Result<DeliveryStatus, NotifierError>;
}

/// Posts the JSON payload straight to the subscription endpoint
pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpPushTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        body: Vec<u8>,
        ttl: Duration,
    ) -> Result<DeliveryStatus, NotifierError> {
        let response = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", ttl.as_secs().to_string())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| NotifierError::Transport(format!("Failed to reach push service: {}", e)))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(DeliveryStatus { status, body })
    }
}

/// Logs notifications instead of delivering them
#[derive(Debug, Default)]
pub struct LogPushTransport;

#[async_trait]
impl PushTransport for LogPushTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        body: Vec<u8>,
        _ttl: Duration,
    ) -> Result<DeliveryStatus, NotifierError> {
        tracing::info!(
            endpoint = %subscription.endpoint,
            "Push disabled, skipping notification: {}",
            String::from_utf8_lossy(&body)
        );
        Ok(DeliveryStatus {
            status: 201,
            body: String::new(),
        })
    }
}

/// One notification for one recipient
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subscription: PushSubscription,
    pub payload: NotificationPayload,
}

/// Best-effort sender; never retries, the next cycle does
#[derive(Clone)]
pub struct NotificationSender {
    transport: Arc<dyn PushTransport>,
    ttl: Duration,
}

impl NotificationSender {
    pub fn new(transport: Arc<dyn PushTransport>, ttl: Duration) -> Self {
        Self { transport, ttl }
    }

    /// Send a single notification
    pub async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> Result<(), NotifierError> {
        let body =
            serde_json::to_vec(payload).map_err(|e| NotifierError::Serialize(e.to_string()))?;

        let delivery = self.transport.deliver(subscription, body, self.ttl).await?;
        if delivery.status >= 300 {
            return Err(NotifierError::Status {
                status: delivery.status,
                body: delivery.body,
            });
        }

        tracing::debug!(endpoint = %subscription.endpoint, "Push notification sent");
        Ok(())
    }

    /// Send all deliveries concurrently. Every delivery is attempted; the
    /// failures come back together.
    pub async fn send_all(&self, deliveries: Vec<Delivery>) -> Result<usize, DeliveryFailures> {
        let attempts = deliveries.iter().map(|d| async move {
            self.send(&d.subscription, &d.payload)
                .await
                .map_err(|error| DeliveryFailure {
                    endpoint: d.subscription.endpoint.clone(),
                    error,
                })
        });

        let mut sent = 0;
        let mut failures = Vec::new();
        for result in join_all(attempts).await {
            match result {
                Ok(()) => sent += 1,
                Err(failure) => failures.push(failure),
            }
        }

        if failures.is_empty() {
            Ok(sent)
        } else {
            Err(DeliveryFailures { sent, failures })
        }
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Push service returned status {status}; body: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, thiserror::Error)]
#[error("sending push notification to {endpoint}: {error}")]
pub struct DeliveryFailure {
    pub endpoint: String,
    #[source]
    pub error: NotifierError,
}

/// Failed deliveries of one fan-out
#[derive(Debug, Default, thiserror::Error)]
#[error("{} push deliveries failed{}", .failures.len(), joined(.failures))]
pub struct DeliveryFailures {
    /// Deliveries that did succeed alongside the failures
    pub sent: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryFailures {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }
}

fn joined(failures: &[DeliveryFailure]) -> String {
    failures.iter().map(|f| format!("; {}", f)).collect()
}
