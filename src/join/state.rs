use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meetings::Meeting;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TriggerStatus {
    #[default]
    Idle,
    Scheduled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJoin {
    pub meeting: Meeting,
    pub trigger_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
}

/// Bookkeeping for the single pending join alarm.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTriggerState {
    pub status: TriggerStatus,
    pub scheduled: Option<ScheduledJoin>,
    pub fired_count: u64,
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl JoinTriggerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduled_meeting(&self) -> Option<&Meeting> {
        self.scheduled.as_ref().map(|s| &s.meeting)
    }

    /// Milliseconds until the pending alarm fires, or `None` when idle.
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.scheduled
            .as_ref()
            .map(|s| (s.trigger_at - now).num_milliseconds().max(0))
    }

    pub fn schedule(&mut self, meeting: Meeting, trigger_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = TriggerStatus::Scheduled;
        self.scheduled = Some(ScheduledJoin {
            meeting,
            trigger_at,
            scheduled_at: now,
        });
    }

    /// Removes and returns the pending join, leaving the state idle.
    pub fn take_scheduled(&mut self) -> Option<ScheduledJoin> {
        self.status = TriggerStatus::Idle;
        self.scheduled.take()
    }

    pub fn record_fire(&mut self, now: DateTime<Utc>) {
        self.fired_count += 1;
        self.last_fired_at = Some(now);
    }

    pub fn clear(&mut self) {
        self.status = TriggerStatus::Idle;
        self.scheduled = None;
    }
}
