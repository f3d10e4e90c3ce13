use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    health_check, ingest_appointments, list_delay_alerts, mark_appointment, register_push,
    start_delay_alert, upsert_business, AppState,
};
use crate::alerts::{
    AlertConfig, AlertWorker, HttpPushTransport, LogPushTransport, NotificationSender,
    PushTransport, QueueManager, Scheduler,
};
use crate::clock::{FixedClock, SharedClock, SystemClock};
use crate::sms::{LogSmsTransport, OutboxConfig, SmsOutbox};
use crate::storage::{AlertStore, MemoryStore};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub alert: AlertConfig,
    /// Send real web pushes; otherwise they are only logged
    pub push_enabled: bool,
    /// Freeze the clock at this instant
    pub fixed_now: Option<DateTime<Utc>>,
    /// Base URL of the customer-facing site, used in SMS links
    pub link_base: String,
    pub sms: OutboxConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            alert: AlertConfig::default(),
            push_enabled: false,
            fixed_now: None,
            link_base: "http://localhost:8080".to_string(),
            sms: OutboxConfig::default(),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Bookings
        .route("/businesses", post(upsert_business))
        .route("/appointments", post(ingest_appointments))
        .route("/appointments/:id/:milestone", post(mark_appointment))
        .route("/push-subscriptions", post(register_push))
        // Delay alerts
        .route("/businesses/:id/delay-alert", post(start_delay_alert))
        .route("/delay-alerts", get(list_delay_alerts))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());

    let clock: SharedClock = match config.fixed_now {
        Some(at) => {
            tracing::warn!("Clock frozen at {}", at);
            Arc::new(FixedClock::new(at))
        }
        None => Arc::new(SystemClock),
    };

    let transport: Arc<dyn PushTransport> = if config.push_enabled {
        Arc::new(HttpPushTransport::new())
    } else {
        tracing::info!("Push delivery disabled, notifications will only be logged");
        Arc::new(LogPushTransport)
    };
    let sender = NotificationSender::new(transport, config.alert.push_ttl);

    let alert_store: Arc<dyn AlertStore> = store.clone();
    let worker = Arc::new(AlertWorker::new(
        Arc::clone(&alert_store),
        sender,
        Arc::clone(&clock),
        config.alert.clone(),
    ));
    let queue = Arc::new(QueueManager::new(worker));

    // Start background workers
    let scheduler = Arc::new(Scheduler::new(
        alert_store,
        Arc::clone(&queue),
        &config.alert,
    ));
    let scheduler_handle = scheduler.start();

    let (outbox, sms_handle) = SmsOutbox::start(Arc::new(LogSmsTransport), config.sms.clone());

    let state = Arc::new(AppState {
        store,
        queue,
        clock,
        sms: Some(outbox),
        link_base: config.link_base.clone(),
    });

    // Build router
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting delaywatch server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler_handle.abort();
    sms_handle.abort();

    tracing::info!("delaywatch server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received, stopping workers...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::testing::{base_time, RecordingTransport};
    use crate::data::Business;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn create_test_state() -> Arc<AppState> {
        let store = Arc::new(MemoryStore::new());
        store.upsert_business(Business::new("b1", "Barber"));

        let clock: SharedClock = Arc::new(FixedClock::new(base_time()));
        let sender = NotificationSender::new(
            Arc::new(RecordingTransport::default()),
            AlertConfig::default().push_ttl,
        );
        let worker = Arc::new(AlertWorker::new(
            store.clone(),
            sender,
            Arc::clone(&clock),
            AlertConfig::default(),
        ));

        Arc::new(AppState {
            store,
            queue: Arc::new(QueueManager::new(worker)),
            clock,
            sms: None,
            link_base: "https://example.test".to_string(),
        })
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_empty(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = build_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_start_monitoring_is_idempotent() {
        let state = create_test_state();
        let app = build_router(Arc::clone(&state));

        let response = app
            .clone()
            .oneshot(post_empty("/businesses/b1/delay-alert"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["result"], "ok");
        assert_eq!(body["created"], true);

        let response = app
            .oneshot(post_empty("/businesses/b1/delay-alert"))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["created"], false);
        assert_eq!(state.store.alert_count(), 1);
    }

    #[tokio::test]
    async fn test_start_monitoring_unknown_business() {
        let state = create_test_state();
        let app = build_router(Arc::clone(&state));

        let response = app
            .oneshot(post_empty("/businesses/nope/delay-alert"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(json_body(response).await["error"].is_string());
        assert_eq!(state.store.alert_count(), 0);
    }

    #[tokio::test]
    async fn test_appointment_lifecycle() {
        let state = create_test_state();
        let app = build_router(Arc::clone(&state));

        let response = app
            .clone()
            .oneshot(post_json(
                "/appointments",
                serde_json::json!({
                    "appointments": [
                        {
                            "id": "a1",
                            "businessId": "b1",
                            "customerLink": "xyz",
                            "start": "2020-05-13T14:00:00Z",
                            "end": "2020-05-13T14:30:00Z",
                            "phone": "600123456"
                        },
                        {
                            "id": "a2",
                            "businessId": "missing",
                            "customerLink": "abc",
                            "start": "2020-05-13T15:00:00Z",
                            "end": "2020-05-13T15:30:00Z"
                        }
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["inserted"], 1);
        assert_eq!(body["errors"], 1);

        let response = app
            .clone()
            .oneshot(post_empty("/appointments/a1/started"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            state.store.appointment("a1").unwrap().started_at,
            Some(base_time())
        );

        let response = app
            .clone()
            .oneshot(post_empty("/appointments/a1/paused"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_empty("/appointments/zzz/finished"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_register_push_subscription() {
        let state = create_test_state();
        state
            .store
            .upsert_appointment(
                crate::data::Appointment::new("a1", "b1", base_time(), base_time())
                    .with_customer_link("xyz"),
            )
            .unwrap();
        let app = build_router(Arc::clone(&state));

        let subscription = serde_json::json!({
            "endpoint": "https://push.example/abc",
            "keys": {"p256dh": "key", "auth": "secret"}
        });

        let response = app
            .clone()
            .oneshot(post_json(
                "/push-subscriptions",
                serde_json::json!({
                    "appointmentCustomerLink": "xyz",
                    "subscription": subscription
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let handle = state.store.appointment("a1").unwrap().push_handle().unwrap();
        assert_eq!(handle.endpoint, "https://push.example/abc");

        let response = app
            .oneshot(post_json(
                "/push-subscriptions",
                serde_json::json!({
                    "appointmentCustomerLink": "unknown",
                    "subscription": subscription
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_delay_alerts() {
        let state = create_test_state();
        state.store.start_monitoring("b1").await.unwrap();
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/delay-alerts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let alerts = body["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["businessId"], "b1");
        assert_eq!(alerts[0]["businessName"], "Barber");
        assert_eq!(alerts[0]["inFlight"], false);
    }
}
