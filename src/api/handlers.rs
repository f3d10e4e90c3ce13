use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::alerts::{AlertState, QueueManager};
use crate::clock::SharedClock;
use crate::data::{Appointment, Business};
use crate::sms::{SmsMessage, SmsOutbox};
use crate::storage::{AlertStore, MemoryStore, Milestone, StoreError};

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<QueueManager>,
    pub clock: SharedClock,
    /// Booking confirmations; `None` disables SMS entirely
    pub sms: Option<SmsOutbox>,
    /// Base URL of customer appointment pages
    pub link_base: String,
}

impl AppState {
    fn customer_url(&self, customer_link: &str) -> String {
        format!("{}/c/{}", self.link_base.trim_end_matches('/'), customer_link)
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Businesses & Appointments
// ============================================================================

pub async fn upsert_business(
    State(state): State<Arc<AppState>>,
    Json(business): Json<Business>,
) -> Result<Json<Business>, ApiError> {
    if business.id.trim().is_empty() {
        return Err(ApiError::BadRequest("missing business id".to_string()));
    }
    state.store.upsert_business(business.clone());
    Ok(Json(business))
}

#[derive(Deserialize)]
pub struct IngestRequest {
    pub appointments: Vec<Appointment>,
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub inserted: usize,
    pub updated: usize,
    pub errors: usize,
}

pub async fn ingest_appointments(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> Json<IngestResponse> {
    let mut response = IngestResponse {
        inserted: 0,
        updated: 0,
        errors: 0,
    };

    for appointment in request.appointments {
        let confirmation = appointment.phone.clone().map(|phone| {
            (
                phone,
                appointment.business_id.clone(),
                appointment.start,
                appointment.customer_link.clone(),
            )
        });

        match state.store.upsert_appointment(appointment) {
            Ok(true) => {
                response.inserted += 1;
                if let Some((phone, business_id, start, link)) = confirmation {
                    queue_confirmation(&state, phone, &business_id, start, &link);
                }
            }
            Ok(false) => response.updated += 1,
            Err(e) => {
                tracing::warn!("Failed to insert appointment: {}", e);
                response.errors += 1;
            }
        }
    }

    Json(response)
}

fn queue_confirmation(
    state: &AppState,
    phone: String,
    business_id: &str,
    start: DateTime<Utc>,
    customer_link: &str,
) {
    let Some(outbox) = &state.sms else {
        return;
    };
    let Some(business) = state.store.business(business_id) else {
        return;
    };
    let message = SmsMessage::appointment_confirmation(
        phone,
        &business.name,
        start,
        &state.customer_url(customer_link),
    );
    if let Err(e) = outbox.enqueue(message) {
        tracing::warn!(business_id = %business_id, error = %e, "Could not queue confirmation SMS");
    }
}

pub async fn mark_appointment(
    State(state): State<Arc<AppState>>,
    Path((id, milestone)): Path<(String, String)>,
) -> Result<Json<Appointment>, ApiError> {
    let milestone = match milestone.as_str() {
        "started" => Milestone::Started,
        "finished" => Milestone::Finished,
        "canceled" => Milestone::Canceled,
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown milestone '{}'",
                other
            )))
        }
    };

    let appointment = state
        .store
        .set_milestone(&id, milestone, state.clock.now())
        .map_err(ApiError::from)?;
    Ok(Json(appointment))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPushRequest {
    pub appointment_customer_link: String,
    pub subscription: serde_json::Value,
}

pub async fn register_push(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterPushRequest>,
) -> Result<StatusCode, ApiError> {
    if request.subscription.get("endpoint").is_none() {
        return Err(ApiError::BadRequest(
            "subscription has no endpoint".to_string(),
        ));
    }

    let matched = state.store.set_push_subscription(
        &request.appointment_customer_link,
        request.subscription.to_string(),
    );
    if !matched {
        return Err(ApiError::NotFound(format!(
            "Appointment '{}' not found",
            request.appointment_customer_link
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Delay Alerts
// ============================================================================

#[derive(Serialize)]
pub struct StartMonitoringResponse {
    pub result: &'static str,
    /// False when the business was already monitored
    pub created: bool,
}

pub async fn start_delay_alert(
    State(state): State<Arc<AppState>>,
    Path(business_id): Path<String>,
) -> Result<Json<StartMonitoringResponse>, ApiError> {
    let created = state
        .store
        .start_monitoring(&business_id)
        .await
        .map_err(ApiError::from)?;

    if created {
        tracing::info!(business_id = %business_id, "Delay monitoring started");
    }

    Ok(Json(StartMonitoringResponse {
        result: "ok",
        created,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStatus {
    #[serde(flatten)]
    pub state: AlertState,
    pub in_flight: bool,
    pub backlog: usize,
}

#[derive(Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertStatus>,
}

pub async fn list_delay_alerts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let states = state
        .store
        .alert_states()
        .await
        .map_err(ApiError::from)?;

    let alerts = states
        .into_iter()
        .map(|s| AlertStatus {
            in_flight: state.queue.in_flight(&s.business_id),
            backlog: state.queue.backlog_len(&s.business_id).unwrap_or(0),
            state: s,
        })
        .collect();

    Ok(Json(AlertsResponse { alerts }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::BusinessNotFound(_) | StoreError::AppointmentNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            StoreError::Unavailable(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
