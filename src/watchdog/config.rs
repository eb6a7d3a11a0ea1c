use std::fmt;
use std::sync::Arc;

use chrono::{Local, TimeZone};

use crate::utils::clock::MS_PER_MINUTE;

/// Maps an epoch-millisecond timestamp to the key of the day it falls in.
pub type DayKeyFn = Arc<dyn Fn(i64) -> String + Send + Sync>;

pub const DEFAULT_STALE_THRESHOLD_MS: i64 = 30 * MS_PER_MINUTE;
pub const DEFAULT_BACKOFF_SCHEDULE_MS: [i64; 3] =
    [30 * MS_PER_MINUTE, 60 * MS_PER_MINUTE, 120 * MS_PER_MINUTE];
pub const DEFAULT_DAILY_RELOAD_LIMIT: u32 = 6;

/// Local calendar date, `YYYY-MM-DD`.
pub fn local_day_key(now_ms: i64) -> String {
    match Local.timestamp_millis_opt(now_ms).single() {
        Some(ts) => ts.format("%Y-%m-%d").to_string(),
        None => String::from("invalid"),
    }
}

#[derive(Clone)]
pub struct WatchdogConfig {
    /// How long the fingerprint must stay unchanged before the view counts as stale.
    pub stale_threshold_ms: i64,
    /// Ascending cooldowns, indexed by consecutive reloads without a change.
    pub backoff_schedule_ms: Vec<i64>,
    pub daily_reload_limit: u32,
    pub day_key: DayKeyFn,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stale_threshold_ms: DEFAULT_STALE_THRESHOLD_MS,
            backoff_schedule_ms: DEFAULT_BACKOFF_SCHEDULE_MS.to_vec(),
            daily_reload_limit: DEFAULT_DAILY_RELOAD_LIMIT,
            day_key: Arc::new(local_day_key),
        }
    }
}

impl fmt::Debug for WatchdogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchdogConfig")
            .field("stale_threshold_ms", &self.stale_threshold_ms)
            .field("backoff_schedule_ms", &self.backoff_schedule_ms)
            .field("daily_reload_limit", &self.daily_reload_limit)
            .finish_non_exhaustive()
    }
}

impl WatchdogConfig {
    pub fn with_day_key<F>(mut self, day_key: F) -> Self
    where
        F: Fn(i64) -> String + Send + Sync + 'static,
    {
        self.day_key = Arc::new(day_key);
        self
    }

    /// Replaces unusable values instead of failing: an empty schedule or one
    /// containing a non-positive entry falls back to the default schedule.
    pub fn normalized(mut self) -> Self {
        if self.backoff_schedule_ms.is_empty() || self.backoff_schedule_ms.iter().any(|ms| *ms <= 0)
        {
            self.backoff_schedule_ms = DEFAULT_BACKOFF_SCHEDULE_MS.to_vec();
        }
        self.stale_threshold_ms = self.stale_threshold_ms.max(0);
        self
    }

    /// Cooldown after `consecutive_reloads` reloads that did not change anything.
    pub fn backoff_ms(&self, consecutive_reloads: u32) -> i64 {
        let schedule = if self.backoff_schedule_ms.is_empty() {
            &DEFAULT_BACKOFF_SCHEDULE_MS[..]
        } else {
            &self.backoff_schedule_ms[..]
        };
        let idx = (consecutive_reloads as usize).min(schedule.len() - 1);
        schedule[idx]
    }

    pub fn day_key_for(&self, now_ms: i64) -> String {
        (self.day_key)(now_ms)
    }
}
