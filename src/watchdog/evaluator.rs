use serde::Serialize;

use super::{WatchdogConfig, WatchdogState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogAction {
    None,
    Defer,
    Reload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogReason {
    Initialized,
    FingerprintChanged,
    NotStale,
    NotHomepage,
    Cooldown,
    DailyLimit,
    Foreground,
    Reload,
}

/// One observation of the watched surface.
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub fingerprint: &'a str,
    pub now_ms: i64,
    pub is_homepage: bool,
    pub is_foreground: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub action: WatchdogAction,
    pub reason: WatchdogReason,
    pub stale_for_ms: i64,
    /// Cooldown window that applied at this evaluation.
    pub backoff_ms: i64,
    pub cooldown_remaining_ms: i64,
    pub pending_reload: bool,
    pub consecutive_reloads_without_change: u32,
    pub reload_count_today: u32,
    /// The state moved in a way worth persisting.
    pub state_changed: bool,
}

/// Decides when a frozen meetings homepage should be force-reloaded.
///
/// The caller owns visibility tracking: when the surface leaves the
/// foreground it should call [`HomepageWatchdog::flush_pending`] so a
/// deferred reload is not lost.
#[derive(Debug)]
pub struct HomepageWatchdog {
    config: WatchdogConfig,
    state: WatchdogState,
}

impl HomepageWatchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        Self::with_state(config, WatchdogState::new())
    }

    /// Resumes from a previously persisted state.
    pub fn with_state(config: WatchdogConfig, state: WatchdogState) -> Self {
        Self {
            config: config.normalized(),
            state,
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: WatchdogConfig) {
        self.config = config.normalized();
    }

    pub fn state(&self) -> &WatchdogState {
        &self.state
    }

    pub fn has_pending_reload(&self) -> bool {
        self.state.pending_reload
    }

    pub fn evaluate(&mut self, obs: Observation<'_>) -> Evaluation {
        let now = obs.now_ms;
        let mut state_changed = self.roll_day(now);

        let backoff_ms = self.state.current_backoff_ms(&self.config);

        if self.state.last_fingerprint.is_none() {
            self.record_fingerprint(obs.fingerprint, now);
            log_debug!("watchdog.initialized", "fingerprint {}", obs.fingerprint);
            return self.result(WatchdogAction::None, WatchdogReason::Initialized, now, backoff_ms, true);
        }

        if self.state.last_fingerprint.as_deref() != Some(obs.fingerprint) {
            let was_backing_off = self.state.consecutive_reloads_without_change > 0;
            self.record_fingerprint(obs.fingerprint, now);
            self.state.consecutive_reloads_without_change = 0;
            self.state.pending_reload = false;
            log_debug!(
                "watchdog.fingerprint_changed",
                "fingerprint {} (backoff reset: {})",
                obs.fingerprint,
                was_backing_off
            );
            return self.result(
                WatchdogAction::None,
                WatchdogReason::FingerprintChanged,
                now,
                self.state.current_backoff_ms(&self.config),
                true,
            );
        }

        if self.state.stale_for_ms(now) < self.config.stale_threshold_ms {
            return self.result(WatchdogAction::None, WatchdogReason::NotStale, now, backoff_ms, state_changed);
        }

        if !obs.is_homepage {
            return self.result(WatchdogAction::None, WatchdogReason::NotHomepage, now, backoff_ms, state_changed);
        }

        if let Some(last) = self.state.last_reload_at_ms {
            if now - last < backoff_ms {
                return self.result(WatchdogAction::None, WatchdogReason::Cooldown, now, backoff_ms, state_changed);
            }
        }

        if self.state.reload_count_today >= self.config.daily_reload_limit {
            return self.result(WatchdogAction::None, WatchdogReason::DailyLimit, now, backoff_ms, state_changed);
        }

        if obs.is_foreground {
            if !self.state.pending_reload {
                self.state.pending_reload = true;
                state_changed = true;
                log_info!(
                    "watchdog.deferred",
                    "homepage stale for {}ms but in foreground; deferring reload",
                    self.state.stale_for_ms(now)
                );
            }
            return self.result(WatchdogAction::Defer, WatchdogReason::Foreground, now, backoff_ms, state_changed);
        }

        self.state.pending_reload = false;
        self.state.last_reload_at_ms = Some(now);
        self.state.reload_count_today += 1;
        self.state.consecutive_reloads_without_change += 1;
        log_info!(
            "watchdog.reload",
            "homepage stale for {}ms; reload {} today, {} without change",
            self.state.stale_for_ms(now),
            self.state.reload_count_today,
            self.state.consecutive_reloads_without_change
        );
        self.result(WatchdogAction::Reload, WatchdogReason::Reload, now, backoff_ms, true)
    }

    /// Re-evaluates as a background observation if a reload was deferred.
    pub fn flush_pending(
        &mut self,
        fingerprint: &str,
        now_ms: i64,
        is_homepage: bool,
    ) -> Option<Evaluation> {
        if !self.state.pending_reload {
            return None;
        }
        Some(self.evaluate(Observation {
            fingerprint,
            now_ms,
            is_homepage,
            is_foreground: false,
        }))
    }

    /// Swaps in the current day key before any quota check, so the first
    /// evaluation of a new day starts from a zero count.
    fn roll_day(&mut self, now_ms: i64) -> bool {
        let today = self.config.day_key_for(now_ms);
        if self.state.reload_day_key.as_deref() == Some(today.as_str()) {
            return false;
        }
        if self.state.reload_count_today > 0 {
            log_debug!(
                "watchdog.day_rollover",
                "new day {}; resetting {} reloads",
                today,
                self.state.reload_count_today
            );
        }
        self.state.reload_day_key = Some(today);
        self.state.reload_count_today = 0;
        true
    }

    fn record_fingerprint(&mut self, fingerprint: &str, now_ms: i64) {
        self.state.last_fingerprint = Some(fingerprint.to_string());
        self.state.last_fingerprint_changed_at_ms = now_ms;
    }

    fn result(
        &self,
        action: WatchdogAction,
        reason: WatchdogReason,
        now_ms: i64,
        backoff_ms: i64,
        state_changed: bool,
    ) -> Evaluation {
        let cooldown_remaining_ms = match self.state.last_reload_at_ms {
            Some(last) if reason == WatchdogReason::Cooldown => (backoff_ms - (now_ms - last)).max(0),
            _ => 0,
        };
        Evaluation {
            action,
            reason,
            stale_for_ms: self.state.stale_for_ms(now_ms),
            backoff_ms,
            cooldown_remaining_ms,
            pending_reload: self.state.pending_reload,
            consecutive_reloads_without_change: self.state.consecutive_reloads_without_change,
            reload_count_today: self.state.reload_count_today,
            state_changed,
        }
    }
}
