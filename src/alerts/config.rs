//! Delay alert configuration and persisted state types

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of the delay-alert engine
#[derive(Debug, Clone, PartialEq)]
pub struct AlertConfig {
    /// Time between scheduler ticks
    pub tick_interval: Duration,
    /// Pause between two cycles of the same business
    pub cooldown: Duration,
    /// Upper bound for every store call
    pub store_timeout: Duration,
    /// A delay is real only if strictly greater than this
    pub delay_threshold: TimeDelta,
    /// Two delays closer than this are considered the same delay
    pub stability_tolerance: TimeDelta,
    /// How far ahead of now customers get notified
    pub alert_window: TimeDelta,
    /// Started appointments averaged per cycle
    pub sample_size: usize,
    /// Time-to-live handed to the push service
    pub push_ttl: Duration,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5 * 60),
            cooldown: Duration::from_secs(60),
            store_timeout: Duration::from_secs(10),
            delay_threshold: TimeDelta::minutes(5),
            stability_tolerance: TimeDelta::minutes(5),
            alert_window: TimeDelta::hours(2),
            sample_size: 1,
            push_ttl: Duration::from_secs(86400),
        }
    }
}

impl AlertConfig {
    /// Set the scheduler interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the inter-cycle cool-down
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the per-call store timeout
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Set the rolling-mean sample size
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_push_ttl(mut self, ttl: Duration) -> Self {
        self.push_ttl = ttl;
        self
    }
}

/// Persisted monitoring record of one business, joined with its name
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertState {
    pub business_id: String,
    pub business_name: String,
    /// First delay detection of the current episode
    pub checking_started: Option<DateTime<Utc>>,
    /// Delay observed by the last cycle that found one
    #[serde(with = "delay_secs", default)]
    pub last_delay: Option<TimeDelta>,
    /// Upper bound of the last notified window
    pub last_start_cutoff: Option<DateTime<Utc>>,
}

impl AlertState {
    /// Freshly activated monitoring, nothing detected yet
    pub fn new(business_id: impl Into<String>, business_name: impl Into<String>) -> Self {
        Self {
            business_id: business_id.into(),
            business_name: business_name.into(),
            ..Default::default()
        }
    }

    pub fn with_checking_started(mut self, at: DateTime<Utc>) -> Self {
        self.checking_started = Some(at);
        self
    }

    pub fn with_last_delay(mut self, delay: TimeDelta) -> Self {
        self.last_delay = Some(delay);
        self
    }

    pub fn with_last_start_cutoff(mut self, at: DateTime<Utc>) -> Self {
        self.last_start_cutoff = Some(at);
        self
    }
}

/// Stores delays as whole seconds
mod delay_secs {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(delay: &Option<TimeDelta>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match delay {
            Some(d) => serializer.serialize_some(&d.num_seconds()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<TimeDelta>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<i64>::deserialize(deserializer)?;
        Ok(secs.map(TimeDelta::seconds))
    }
}
