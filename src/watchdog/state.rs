use serde::{Deserialize, Serialize};

use super::WatchdogConfig;

/// Field-bag state of one watch session. Mutated only by `HomepageWatchdog::evaluate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchdogState {
    pub last_fingerprint: Option<String>,
    pub last_fingerprint_changed_at_ms: i64,
    /// Reset to zero whenever the fingerprint changes.
    pub consecutive_reloads_without_change: u32,
    pub last_reload_at_ms: Option<i64>,
    /// A reload was deferred because the page was in the foreground.
    pub pending_reload: bool,
    pub reload_count_today: u32,
    pub reload_day_key: Option<String>,
}

/// Tagged reading of [`WatchdogState`] at a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum WatchdogPhase {
    Fresh,
    Stale {
        #[serde(rename = "sinceMs")]
        since_ms: i64,
    },
    Cooldown {
        #[serde(rename = "untilMs")]
        until_ms: i64,
    },
    QuotaExhausted {
        day: String,
    },
}

impl WatchdogState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stale_for_ms(&self, now_ms: i64) -> i64 {
        if self.last_fingerprint.is_none() {
            return 0;
        }
        (now_ms - self.last_fingerprint_changed_at_ms).max(0)
    }

    pub fn current_backoff_ms(&self, config: &WatchdogConfig) -> i64 {
        config.backoff_ms(self.consecutive_reloads_without_change)
    }

    /// Remaining cooldown after the last reload, or zero when none applies.
    pub fn cooldown_remaining_ms(&self, now_ms: i64, config: &WatchdogConfig) -> i64 {
        match self.last_reload_at_ms {
            Some(last) => (self.current_backoff_ms(config) - (now_ms - last)).max(0),
            None => 0,
        }
    }

    pub fn phase(&self, now_ms: i64, config: &WatchdogConfig) -> WatchdogPhase {
        if self.last_fingerprint.is_none() || self.stale_for_ms(now_ms) < config.stale_threshold_ms {
            return WatchdogPhase::Fresh;
        }

        let today = config.day_key_for(now_ms);
        if self.reload_day_key.as_deref() == Some(today.as_str())
            && self.reload_count_today >= config.daily_reload_limit
        {
            return WatchdogPhase::QuotaExhausted { day: today };
        }

        if let Some(last) = self.last_reload_at_ms {
            if self.cooldown_remaining_ms(now_ms, config) > 0 {
                return WatchdogPhase::Cooldown {
                    until_ms: last + self.current_backoff_ms(config),
                };
            }
        }

        WatchdogPhase::Stale {
            since_ms: self.last_fingerprint_changed_at_ms,
        }
    }
}
