//! The two "is this meeting joinable" decisions.
//!
//! [`Scheduler::check`] answers "should a join fire right now": it ignores
//! suppression entirely and skips every already-joined meeting.
//! [`get_next_joinable_meeting`] answers "what should the user see as next":
//! it honours suppression once the trigger time is reached, and keeps a
//! joined meeting as a candidate until its start time has passed.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::meetings::Meeting;

use super::{SchedulerConfig, SchedulerConfigPatch};

/// Outcome of one [`Scheduler::check`] evaluation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SchedulerEvent {
    Join {
        meeting: Meeting,
    },
    Upcoming {
        meeting: Meeting,
        #[serde(rename = "minutesUntil")]
        minutes_until: i64,
    },
    None,
}

impl SchedulerEvent {
    pub fn meeting(&self) -> Option<&Meeting> {
        match self {
            SchedulerEvent::Join { meeting } | SchedulerEvent::Upcoming { meeting, .. } => {
                Some(meeting)
            }
            SchedulerEvent::None => None,
        }
    }
}

/// Pure join decision over a meeting snapshot.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> SchedulerConfig {
        self.config.clone()
    }

    pub fn update_config(&mut self, patch: SchedulerConfigPatch) {
        self.config.apply(patch);
    }

    /// Classifies `meetings` (expected sorted by start time) relative to `now`.
    ///
    /// Returns `Join` for the first eligible meeting in iteration order,
    /// otherwise `Upcoming` for the soonest meeting that has not started yet,
    /// otherwise `None`.
    ///
    /// `suppressed` is accepted for parity with [`get_next_joinable_meeting`]
    /// but never consulted: a closed meeting only stops triggering once the
    /// caller adds it to `already_joined`.
    pub fn check(
        &self,
        meetings: &[Meeting],
        already_joined: &HashSet<String>,
        _suppressed: &HashMap<String, i64>,
        now: DateTime<Utc>,
    ) -> SchedulerEvent {
        let join_before_ms = self.config.join_before_ms();
        let max_after_start_ms = self.config.max_after_start_ms();

        let mut soonest: Option<(&Meeting, i64)> = None;

        for meeting in meetings {
            if already_joined.contains(&meeting.call_id) {
                continue;
            }
            if meeting.title_matches_any(&self.config.title_exclude_filters) {
                continue;
            }

            let time_until_start = meeting.ms_until_start(now);
            if time_until_start <= join_before_ms && time_until_start > -max_after_start_ms {
                return SchedulerEvent::Join {
                    meeting: meeting.clone(),
                };
            }

            if time_until_start > 0 && soonest.map_or(true, |(_, best)| time_until_start < best) {
                soonest = Some((meeting, time_until_start));
            }
        }

        match soonest {
            Some((meeting, ms)) => SchedulerEvent::Upcoming {
                meeting: meeting.clone(),
                minutes_until: (ms as f64 / 60_000.0).round() as i64,
            },
            None => SchedulerEvent::None,
        }
    }
}

/// The meeting a UI should present as "next".
///
/// `suppressed` maps call ids to the time the user closed them; a suppressed
/// meeting is skipped once `now` reaches its trigger time. A joined meeting is
/// skipped only after its start time, so a meeting joined early still shows
/// as next until it begins.
pub fn get_next_joinable_meeting(
    meetings: &[Meeting],
    already_joined: &HashSet<String>,
    suppressed: &HashMap<String, i64>,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> Option<Meeting> {
    let max_after_start_ms = config.max_after_start_ms();

    meetings
        .iter()
        .filter(|m| !m.title_matches_any(&config.title_exclude_filters))
        .filter(|m| {
            !(suppressed.contains_key(&m.call_id)
                && now >= m.trigger_time(config.join_before_minutes))
        })
        .filter(|m| !(already_joined.contains(&m.call_id) && now >= m.begin_time))
        .filter(|m| m.ms_until_start(now) > -max_after_start_ms)
        .min_by_key(|m| m.begin_time)
        .cloned()
}
