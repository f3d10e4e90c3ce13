//! delaywatch server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - DELAYWATCH_HOST: Bind address (default: 0.0.0.0)
//! - DELAYWATCH_PORT: Port number (default: 8080)
//! - DELAYWATCH_TICK_SECS: Seconds between delay checks (default: 300)
//! - DELAYWATCH_COOLDOWN_SECS: Pause between two cycles of one business (default: 60)
//! - DELAYWATCH_STORE_TIMEOUT_SECS: Limit on every store call (default: 10)
//! - DELAYWATCH_PUSH_TTL_SECS: How long the push service keeps a notice (default: 86400)
//! - DELAYWATCH_PUSH_ENABLED: Deliver web pushes instead of logging them (default: false)
//! - DELAYWATCH_FIXED_NOW: RFC 3339 instant to freeze the clock at (default: unset)
//! - DELAYWATCH_LINK_BASE: Customer site base URL for SMS links
//! - RUST_LOG: Log level (default: info)

use std::time::Duration;

use delaywatch::alerts::AlertConfig;
use delaywatch::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_secs(name: &str, default: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "delaywatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let defaults = ServerConfig::default();

    let host = std::env::var("DELAYWATCH_HOST").unwrap_or(defaults.host);
    let port: u16 = std::env::var("DELAYWATCH_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(defaults.port);
    let push_enabled = std::env::var("DELAYWATCH_PUSH_ENABLED")
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(defaults.push_enabled);
    let link_base = std::env::var("DELAYWATCH_LINK_BASE").unwrap_or(defaults.link_base);

    // Malformed value aborts startup
    let fixed_now = match std::env::var("DELAYWATCH_FIXED_NOW") {
        Ok(raw) => Some(chrono::DateTime::parse_from_rfc3339(&raw)?.with_timezone(&chrono::Utc)),
        Err(_) => None,
    };

    let alert_defaults = AlertConfig::default();
    let alert = AlertConfig::default()
        .with_tick_interval(env_secs("DELAYWATCH_TICK_SECS", alert_defaults.tick_interval.as_secs()))
        .with_cooldown(env_secs("DELAYWATCH_COOLDOWN_SECS", alert_defaults.cooldown.as_secs()))
        .with_store_timeout(env_secs(
            "DELAYWATCH_STORE_TIMEOUT_SECS",
            alert_defaults.store_timeout.as_secs(),
        ))
        .with_push_ttl(env_secs("DELAYWATCH_PUSH_TTL_SECS", alert_defaults.push_ttl.as_secs()));

    let config = ServerConfig {
        host,
        port,
        alert,
        push_enabled,
        fixed_now,
        link_base,
        sms: defaults.sms,
    };

    tracing::info!("delaywatch configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Tick interval: {:?}", config.alert.tick_interval);
    tracing::info!("  Cooldown: {:?}", config.alert.cooldown);
    tracing::info!("  Store timeout: {:?}", config.alert.store_timeout);
    tracing::info!(
        "  Push delivery: {}",
        if config.push_enabled { "ENABLED" } else { "LOG ONLY" }
    );
    if let Some(at) = config.fixed_now {
        tracing::info!("  Fixed clock: {}", at);
    }

    println!(
        r#"
     _      _                         _       _
  __| | ___| | __ _ _   ___      ____ _| |_ ___| |__
 / _` |/ _ \ |/ _` | | | \ \ /\ / / _` | __/ __| '_ \
| (_| |  __/ | (_| | |_| |\ V  V / (_| | || (__| | | |
 \__,_|\___|_|\__,_|\__, | \_/\_/ \__,_|\__\___|_| |_|
                    |___/

 Delay alerts for appointment businesses
 Version: {}
"#,
        env!("CARGO_PKG_VERSION")
    );

    run_server(config).await
}
