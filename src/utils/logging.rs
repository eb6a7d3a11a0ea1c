//! Conditional, event-tagged logging macros that check a module-level `ENABLE_LOGS` flag.
//!
//! Every line is prefixed with a stable dotted event name so logs can be
//! grepped by event regardless of the message text.
//!
//! Usage:
//! ```ignore
//! // In your module, define the flag first:
//! const ENABLE_LOGS: bool = true;
//!
//! // Then use the macros (they're exported at the crate root):
//! use crate::{log_info, log_warn, log_error};
//!
//! log_info!("trigger.scheduled", "joining {} in {}ms", MeetingLabel(&meeting), delay_ms);
//! ```
//!
//! Meeting titles, URLs and call ids go through [`super::redact`] first.
//! Debug lines for the events in [`RATE_LIMITED_EVENTS`] are throttled to one
//! per [`RATE_LIMIT_WINDOW_MS`], with the dropped count appended to the next one.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use super::clock;

/// Conditional info logging tagged with an event name.
///
/// Each module that uses this macro must define:
/// ```ignore
/// const ENABLE_LOGS: bool = true; // or false
/// ```
#[macro_export]
macro_rules! log_info {
    ($event:literal, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!("[{}] {}", $event, format_args!($($arg)*));
        }
    };
}

/// Conditional debug logging tagged with an event name.
///
/// Noisy events (see [`RATE_LIMITED_EVENTS`]) are emitted at most once per
/// [`RATE_LIMIT_WINDOW_MS`]; the next emitted line carries the number of
/// lines dropped in between.
#[macro_export]
macro_rules! log_debug {
    ($event:literal, $($arg:tt)*) => {
        if ENABLE_LOGS && log::log_enabled!(log::Level::Debug) {
            match $crate::utils::logging::admit($event) {
                Some(0) => log::debug!("[{}] {}", $event, format_args!($($arg)*)),
                Some(suppressed) => log::debug!(
                    "[{}] {} (suppressed {})",
                    $event,
                    format_args!($($arg)*),
                    suppressed
                ),
                None => {}
            }
        }
    };
}

/// Conditional warn logging tagged with an event name.
#[macro_export]
macro_rules! log_warn {
    ($event:literal, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!("[{}] {}", $event, format_args!($($arg)*));
        }
    };
}

/// Conditional error logging tagged with an event name.
///
/// Errors are the one level callers usually want even in quiet modules, but
/// the flag still applies so a module can be silenced entirely in tests.
#[macro_export]
macro_rules! log_error {
    ($event:literal, $($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!("[{}] {}", $event, format_args!($($arg)*));
        }
    };
}


pub const RATE_LIMIT_WINDOW_MS: i64 = 30_000;

/// Debug events fired on every check cycle.
pub const RATE_LIMITED_EVENTS: &[&str] = &["trigger.none", "meetings.updated", "alarm.stale"];

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    last_ms: i64,
    suppressed: u64,
}

/// Per-event throttle for debug lines.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: HashMap<&'static str, RateWindow>,
}

impl RateLimiter {
    /// `None` when the line should be dropped, otherwise the number of
    /// lines dropped since the last one that went out.
    pub fn admit(&mut self, event: &'static str, now_ms: i64) -> Option<u64> {
        if !RATE_LIMITED_EVENTS.contains(&event) {
            return Some(0);
        }

        match self.windows.get_mut(event) {
            Some(window) if now_ms - window.last_ms < RATE_LIMIT_WINDOW_MS => {
                window.suppressed += 1;
                None
            }
            Some(window) => {
                let suppressed = window.suppressed;
                *window = RateWindow {
                    last_ms: now_ms,
                    suppressed: 0,
                };
                Some(suppressed)
            }
            None => {
                self.windows.insert(
                    event,
                    RateWindow {
                        last_ms: now_ms,
                        suppressed: 0,
                    },
                );
                Some(0)
            }
        }
    }
}

/// Process-wide limiter used by [`log_debug!`](crate::log_debug).
pub fn admit(event: &'static str) -> Option<u64> {
    static LIMITER: OnceLock<Mutex<RateLimiter>> = OnceLock::new();
    let mut limiter = LIMITER
        .get_or_init(|| Mutex::new(RateLimiter::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    limiter.admit(event, clock::now_ms())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_events_always_pass() {
        let mut limiter = RateLimiter::default();
        for t in 0..5 {
            assert_eq!(limiter.admit("trigger.scheduled", t), Some(0));
        }
    }

    #[test]
    fn noisy_event_is_throttled_and_reports_dropped_lines() {
        let mut limiter = RateLimiter::default();
        assert_eq!(limiter.admit("trigger.none", 1_000), Some(0));
        assert_eq!(limiter.admit("trigger.none", 2_000), None);
        assert_eq!(limiter.admit("trigger.none", 30_999), None);
        // Other noisy events keep their own window.
        assert_eq!(limiter.admit("meetings.updated", 2_000), Some(0));

        assert_eq!(limiter.admit("trigger.none", 31_000), Some(2));
        assert_eq!(limiter.admit("trigger.none", 31_001), None);
        assert_eq!(limiter.admit("trigger.none", 61_000), Some(1));
    }
}
