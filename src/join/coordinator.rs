use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::meetings::Meeting;
use crate::scheduler::SchedulerConfig;
use crate::utils::redact::{mask_id, MeetingLabel};

use super::collaborators::{AlarmScheduler, MeetingOpener};
use super::state::{JoinTriggerState, ScheduledJoin};
use super::trigger::calculate_next_trigger;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Candidates whose trigger is at most this far away are fired on the spot
/// instead of being handed to the alarm.
const IMMEDIATE_FIRE_EPSILON_MS: i64 = 1_000;

/// What one scheduling pass did.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleReport {
    /// Call ids opened during this pass.
    pub opened: Vec<String>,
    /// Call ids whose open failed; left unjoined for the next cycle.
    pub failed: Vec<String>,
    /// The alarm left pending after the pass, if any.
    pub scheduled: Option<ScheduledJoin>,
}

impl ScheduleReport {
    fn absorb(&mut self, other: ScheduleReport) {
        self.opened.extend(other.opened);
        self.failed.extend(other.failed);
        self.scheduled = other.scheduled;
    }
}

/// Keeps at most one join alarm pending, always pointing at the next meeting to open.
///
/// Not reentrant: callers serialize `schedule_next` and `on_alarm` per instance.
pub struct JoinTriggerCoordinator<A, O> {
    state: JoinTriggerState,
    alarm: A,
    opener: O,
}

impl<A: AlarmScheduler, O: MeetingOpener> JoinTriggerCoordinator<A, O> {
    pub fn new(alarm: A, opener: O) -> Self {
        Self {
            state: JoinTriggerState::new(),
            alarm,
            opener,
        }
    }

    pub fn state(&self) -> &JoinTriggerState {
        &self.state
    }

    pub fn scheduled_meeting(&self) -> Option<&Meeting> {
        self.state.scheduled_meeting()
    }

    pub fn alarm(&self) -> &A {
        &self.alarm
    }

    pub fn opener(&self) -> &O {
        &self.opener
    }

    /// Rebuilds scheduling from scratch: clears the pending alarm, then fires
    /// or schedules the next candidate. Safe to call repeatedly.
    ///
    /// Successful opens are recorded in `joined`.
    pub fn schedule_next(
        &mut self,
        meetings: &[Meeting],
        joined: &mut HashSet<String>,
        config: &SchedulerConfig,
        now: DateTime<Utc>,
    ) -> ScheduleReport {
        self.schedule_pass(meetings, joined, config, now, HashSet::new())
    }

    /// One scheduling pass. Meetings in `failed_this_pass` are not opened
    /// again until the next pass.
    fn schedule_pass(
        &mut self,
        meetings: &[Meeting],
        joined: &mut HashSet<String>,
        config: &SchedulerConfig,
        now: DateTime<Utc>,
        mut failed_this_pass: HashSet<String>,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();

        loop {
            self.cancel_pending();

            let Some(trigger) =
                calculate_next_trigger(meetings, joined, &failed_this_pass, config, now)
            else {
                log_debug!(
                    "trigger.none",
                    "no meeting to schedule ({} meetings, {} joined)",
                    meetings.len(),
                    joined.len()
                );
                return report;
            };

            let delay_ms = trigger.delay_ms(now);
            if delay_ms <= IMMEDIATE_FIRE_EPSILON_MS {
                log_info!(
                    "trigger.immediate",
                    "joining {} now (catch_up={})",
                    MeetingLabel(&trigger.meeting),
                    trigger.catch_up
                );
                let call_id = trigger.meeting.call_id.clone();
                if self.fire(&trigger.meeting, joined, now) {
                    report.opened.push(call_id);
                } else {
                    failed_this_pass.insert(call_id.clone());
                    report.failed.push(call_id);
                }
                continue;
            }

            log_info!(
                "trigger.scheduled",
                "scheduling join for {} in {}ms ({:.1} minutes)",
                MeetingLabel(&trigger.meeting),
                delay_ms,
                delay_ms as f64 / 60_000.0
            );
            self.alarm.schedule(trigger.trigger_time);
            self.state.schedule(trigger.meeting, trigger.trigger_time, now);
            report.scheduled = self.state.scheduled.clone();
            return report;
        }
    }

    /// Handles the pending alarm firing: opens the scheduled meeting unless it
    /// was joined through another path meanwhile, then schedules the next one.
    ///
    /// A fire that arrives while the scheduled trigger is still more than the
    /// immediate-fire window away belongs to a replaced registration and only
    /// reschedules.
    pub fn on_alarm(
        &mut self,
        meetings: &[Meeting],
        joined: &mut HashSet<String>,
        config: &SchedulerConfig,
        now: DateTime<Utc>,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();
        let mut failed_this_pass = HashSet::new();

        match self.state.take_scheduled() {
            None => {
                log_debug!("trigger.stale", "alarm fired with nothing scheduled");
            }
            Some(scheduled) if joined.contains(&scheduled.meeting.call_id) => {
                log_info!(
                    "trigger.stale",
                    "skipping {}: already joined",
                    mask_id(&scheduled.meeting.call_id)
                );
            }
            Some(scheduled)
                if (scheduled.trigger_at - now).num_milliseconds() > IMMEDIATE_FIRE_EPSILON_MS =>
            {
                log_info!(
                    "trigger.stale",
                    "alarm for {} fired {}ms early; rescheduling",
                    MeetingLabel(&scheduled.meeting),
                    (scheduled.trigger_at - now).num_milliseconds()
                );
            }
            Some(scheduled) => {
                log_info!(
                    "trigger.fired",
                    "triggering join for {}",
                    MeetingLabel(&scheduled.meeting)
                );
                let call_id = scheduled.meeting.call_id.clone();
                if self.fire(&scheduled.meeting, joined, now) {
                    report.opened.push(call_id);
                } else {
                    failed_this_pass.insert(call_id.clone());
                    report.failed.push(call_id);
                }
            }
        }

        report.absorb(self.schedule_pass(meetings, joined, config, now, failed_this_pass));
        report
    }

    /// Drops any pending alarm without scheduling a replacement.
    pub fn clear(&mut self) {
        if self.state.scheduled.is_some() {
            log_debug!("trigger.cancelled", "cancelled pending join trigger");
        }
        self.cancel_pending();
    }

    fn cancel_pending(&mut self) {
        self.alarm.clear();
        self.state.clear();
    }

    fn fire(&mut self, meeting: &Meeting, joined: &mut HashSet<String>, now: DateTime<Utc>) -> bool {
        self.state.record_fire(now);
        match self.opener.open(meeting) {
            Ok(()) => {
                joined.insert(meeting.call_id.clone());
                log_debug!("meeting.marked_joined", "{}", mask_id(&meeting.call_id));
                true
            }
            Err(err) => {
                log_error!(
                    "trigger.open_failed",
                    "failed to open {}: {err:#}",
                    MeetingLabel(meeting)
                );
                false
            }
        }
    }
}
