//! Outgoing SMS
//!
//! Messages are queued on an [`SmsOutbox`] and delivered by a small
//! supervised pool of workers with bounded, exponentially backed-off retries.
//! No real SMS provider is wired in; [`LogSmsTransport`] logs what would
//! have been sent.

pub mod outbox;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};

pub use outbox::{OutboxConfig, RetryPolicy, SmsOutbox};

/// Maximum length of a single SMS
pub const SMS_MAX_LEN: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

impl SmsMessage {
    pub fn new(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            body: body.into(),
        }
    }

    /// Booking confirmation pointing the customer at their appointment page.
    /// The business name is shortened, or left out when the link leaves no
    /// room for it, so the whole text fits one SMS.
    pub fn appointment_confirmation(
        to: impl Into<String>,
        business_name: &str,
        start: DateTime<Utc>,
        link: &str,
    ) -> Self {
        let when = format!(
            "Appointment on {}/{} at {}:{:02}",
            start.day(),
            start.month(),
            start.hour(),
            start.minute()
        );
        let suffix = format!(". Show your code here: {}", link);

        let fixed = when.chars().count() + " with ".len() + suffix.chars().count();
        let room = SMS_MAX_LEN.saturating_sub(fixed);
        let name_len = business_name.chars().count();

        let body = if name_len <= room {
            format!("{} with {}{}", when, business_name, suffix)
        } else if room > 3 {
            let kept: String = business_name.chars().take(room - 3).collect();
            format!("{} with {}...{}", when, kept, suffix)
        } else {
            format!("{}{}", when, suffix)
        };

        Self::new(to, body)
    }
}

/// Strip formatting from a phone number and add the country prefix if missing
pub fn normalize_phone(phone: &str, country_prefix: &str) -> String {
    let digits: String = phone
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | '-' | '.' | ' '))
        .collect();
    if digits.starts_with('+') || country_prefix.is_empty() {
        digits
    } else {
        format!("{}{}", country_prefix, digits)
    }
}

/// Provider able to deliver one SMS
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, message: &SmsMessage) -> Result<(), SmsError>;
}

/// Logs messages instead of sending them
#[derive(Debug, Default)]
pub struct LogSmsTransport;

#[async_trait]
impl SmsTransport for LogSmsTransport {
    async fn send(&self, message: &SmsMessage) -> Result<(), SmsError> {
        tracing::info!(to = %message.to, "Skipping SMS: {}", message.body);
        Ok(())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SmsError {
    /// The provider refused the message; retrying will not help
    #[error("SMS rejected: {0}")]
    Rejected(String),

    /// Temporary provider or network failure
    #[error("SMS provider unavailable: {0}")]
    Unavailable(String),

    #[error("SMS outbox full")]
    QueueFull,

    #[error("SMS outbox closed")]
    Closed,
}

impl SmsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SmsError::Unavailable(_))
    }
}
