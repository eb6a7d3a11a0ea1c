use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::meetings::Meeting;
use crate::scheduler::SchedulerConfig;

/// The meeting the coordinator should open next, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextJoinTrigger {
    pub meeting: Meeting,
    /// `begin_time - join_before`; may lie in the past for catch-up candidates.
    pub trigger_time: DateTime<Utc>,
    /// When the join should actually happen: `trigger_time`, or `now` for catch-up.
    pub fire_at: DateTime<Utc>,
    pub catch_up: bool,
}

impl NextJoinTrigger {
    pub fn delay_ms(&self, now: DateTime<Utc>) -> i64 {
        (self.fire_at - now).num_milliseconds().max(0)
    }
}

/// Picks the candidate with the smallest trigger time.
///
/// Future candidates and catch-up candidates (trigger time passed, still
/// inside the post-start window) share one axis, so a missed meeting whose
/// trigger lies further in the past outranks a meeting about to trigger.
/// Ties go to the earlier entry in `meetings`.
pub fn calculate_next_trigger(
    meetings: &[Meeting],
    joined: &HashSet<String>,
    skip: &HashSet<String>,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> Option<NextJoinTrigger> {
    let max_after_start_ms = config.max_after_start_ms();

    meetings
        .iter()
        .filter(|m| !joined.contains(&m.call_id) && !skip.contains(&m.call_id))
        .filter(|m| !m.title_matches_any(&config.title_exclude_filters))
        .filter_map(|m| {
            let trigger_time = m.trigger_time(config.join_before_minutes);
            if trigger_time > now {
                Some(NextJoinTrigger {
                    meeting: m.clone(),
                    trigger_time,
                    fire_at: trigger_time,
                    catch_up: false,
                })
            } else if (now - m.begin_time).num_milliseconds() < max_after_start_ms {
                Some(NextJoinTrigger {
                    meeting: m.clone(),
                    trigger_time,
                    fire_at: now,
                    catch_up: true,
                })
            } else {
                None
            }
        })
        .min_by_key(|t| t.trigger_time)
}
