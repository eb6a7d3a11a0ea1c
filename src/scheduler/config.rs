use serde::{Deserialize, Serialize};

use crate::utils::clock::minutes_to_ms;

/// Join window and title filtering applied by the scheduler and the join coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Minutes before start at which a meeting becomes joinable.
    pub join_before_minutes: u32,

    /// Latest point after start, in minutes, at which a meeting is still joinable.
    pub max_minutes_after_start: u32,

    /// Case-sensitive substrings; a title containing any of them is never joined.
    pub title_exclude_filters: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            join_before_minutes: 1,
            max_minutes_after_start: 10,
            title_exclude_filters: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    pub fn join_before_ms(&self) -> i64 {
        minutes_to_ms(self.join_before_minutes)
    }

    pub fn max_after_start_ms(&self) -> i64 {
        minutes_to_ms(self.max_minutes_after_start)
    }

    /// Merges the fields present in `patch`, leaving the rest untouched.
    pub fn apply(&mut self, patch: SchedulerConfigPatch) {
        if let Some(minutes) = patch.join_before_minutes {
            self.join_before_minutes = minutes;
        }
        if let Some(minutes) = patch.max_minutes_after_start {
            self.max_minutes_after_start = minutes;
        }
        if let Some(filters) = patch.title_exclude_filters {
            self.title_exclude_filters = filters;
        }
    }
}

/// Partial update for [`SchedulerConfig`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfigPatch {
    #[serde(default)]
    pub join_before_minutes: Option<u32>,
    #[serde(default)]
    pub max_minutes_after_start: Option<u32>,
    #[serde(default)]
    pub title_exclude_filters: Option<Vec<String>>,
}
