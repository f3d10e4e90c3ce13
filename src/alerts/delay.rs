//! Rolling delay estimate and notification window selection

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use super::config::{AlertConfig, AlertState};
use crate::storage::{AlertStore, StoreError};

const CLOCK_GLYPHS: [&str; 12] = [
    "🕐", "🕑", "🕒", "🕓", "🕔", "🕕", "🕖", "🕗", "🕘", "🕙", "🕚", "🕛",
];

/// Mean of `started_at - start` over the `sample` most recently started
/// appointments of the business on `today`.
///
/// `None` unless exactly `sample` appointments qualify: a single early start
/// of the day is noise, not a smaller-sample estimate.
pub async fn mean_delay(
    store: &dyn AlertStore,
    business_id: &str,
    sample: usize,
    today: NaiveDate,
) -> Result<Option<TimeDelta>, StoreError> {
    let delays = store.recent_delays(business_id, today, sample).await?;
    Ok(mean_of_exactly(&delays, sample))
}

/// Average of `samples` if there are exactly `n` of them
pub fn mean_of_exactly(samples: &[TimeDelta], n: usize) -> Option<TimeDelta> {
    if n == 0 || samples.len() != n {
        return None;
    }
    let total_ms: i64 = samples.iter().map(|d| d.num_milliseconds()).sum();
    Some(TimeDelta::milliseconds(total_ms / n as i64))
}

/// Whether a delay is worth telling customers about
pub fn has_delay(delay: TimeDelta, threshold: TimeDelta) -> bool {
    delay > threshold
}

/// Index into the clock glyphs: tens of minutes within the hour
pub fn clock_glyph_index(delay: TimeDelta) -> usize {
    (delay.num_seconds().rem_euclid(3600) / 600) as usize
}

pub fn clock_glyph(delay: TimeDelta) -> &'static str {
    CLOCK_GLYPHS[clock_glyph_index(delay)]
}

/// Human form of a delay, truncated to the minute
pub fn format_delay(delay: TimeDelta) -> String {
    let minutes = delay.num_minutes().max(0);
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{} min", m),
        (h, 0) => format!("{} h", h),
        (h, m) => format!("{} h {} min", h, m),
    }
}

/// Range of scheduled starts `[start, end)` notified in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Same delay as last cycle; only customers new to the window
    pub stable: bool,
}

impl NotificationWindow {
    /// Pick the window for a cycle observing `delay` against the previous state.
    pub fn select(
        state: &AlertState,
        delay: TimeDelta,
        delayed: bool,
        now: DateTime<Utc>,
        config: &AlertConfig,
    ) -> Self {
        let horizon = now + config.alert_window;

        let stable = delayed
            && state
                .last_delay
                .map(|last| (delay - last).abs() < config.stability_tolerance)
                .unwrap_or(false);

        if stable {
            let start = state
                .last_start_cutoff
                .or(state.checking_started)
                .unwrap_or(now);
            return Self {
                start,
                end: horizon,
                stable,
            };
        }

        let start = state.checking_started.unwrap_or(now);
        let end = if delayed {
            horizon
        } else {
            // Resolution notices only go to those told about the delay
            state.last_start_cutoff.unwrap_or(now)
        };
        Self { start, end, stable }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}
