use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One occurrence of a scheduled call, as extracted from the meetings page.
///
/// Two values describe the same occurrence iff their `call_id` matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub call_id: String,
    pub url: String,
    pub title: String,
    /// Presentation only; never read by scheduling logic.
    pub display_time: String,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub event_id: Option<String>,
    /// Relative to whenever the snapshot was taken. Recomputed on every
    /// evaluation with [`Meeting::starts_in_minutes_at`].
    #[serde(default)]
    pub starts_in_minutes: i64,
}

impl Meeting {
    /// The instant at which joining should start for this occurrence.
    pub fn trigger_time(&self, join_before_minutes: u32) -> DateTime<Utc> {
        self.begin_time - Duration::minutes(i64::from(join_before_minutes))
    }

    /// Milliseconds from `now` until the meeting begins; negative once it started.
    pub fn ms_until_start(&self, now: DateTime<Utc>) -> i64 {
        (self.begin_time - now).num_milliseconds()
    }

    pub fn starts_in_minutes_at(&self, now: DateTime<Utc>) -> i64 {
        (self.ms_until_start(now) as f64 / 60_000.0).round() as i64
    }

    pub fn title_matches_any(&self, filters: &[String]) -> bool {
        filters
            .iter()
            .any(|filter| !filter.is_empty() && self.title.contains(filter.as_str()))
    }
}
