use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::meetings::Meeting;

/// Platform one-shot timer.
///
/// `schedule` registers a single alarm for an absolute instant; when it
/// fires, the host delivers it back to the owning coordinator through
/// `JoinTriggerCoordinator::on_alarm`. Registering again replaces any
/// earlier registration, and `clear` must be safe to call when nothing is
/// pending.
pub trait AlarmScheduler {
    fn schedule(&mut self, fire_at: DateTime<Utc>);
    fn clear(&mut self);
}

/// Opens a meeting in a tab or window. How the join itself is performed is
/// the implementor's business.
pub trait MeetingOpener {
    fn open(&mut self, meeting: &Meeting) -> Result<()>;
}

impl<T: AlarmScheduler + ?Sized> AlarmScheduler for Box<T> {
    fn schedule(&mut self, fire_at: DateTime<Utc>) {
        (**self).schedule(fire_at)
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

impl<T: MeetingOpener + ?Sized> MeetingOpener for Box<T> {
    fn open(&mut self, meeting: &Meeting) -> Result<()> {
        (**self).open(meeting)
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use anyhow::anyhow;
    use std::collections::HashSet;

    /// Records every registration; `pending` mirrors what a real timer would hold.
    #[derive(Debug, Default)]
    pub struct RecordingAlarm {
        pub pending: Option<DateTime<Utc>>,
        pub scheduled: Vec<DateTime<Utc>>,
        pub clears: usize,
    }

    impl AlarmScheduler for RecordingAlarm {
        fn schedule(&mut self, fire_at: DateTime<Utc>) {
            assert!(
                self.pending.is_none(),
                "alarm registered while another is pending"
            );
            self.pending = Some(fire_at);
            self.scheduled.push(fire_at);
        }

        fn clear(&mut self) {
            self.pending = None;
            self.clears += 1;
        }
    }

    /// Opener that fails for the call ids listed in `failing`.
    #[derive(Debug, Default)]
    pub struct ScriptedOpener {
        pub opened: Vec<String>,
        pub attempts: Vec<String>,
        pub failing: HashSet<String>,
    }

    impl ScriptedOpener {
        pub fn failing_for(call_id: &str) -> Self {
            Self {
                failing: [call_id.to_string()].into_iter().collect(),
                ..Self::default()
            }
        }
    }

    impl MeetingOpener for ScriptedOpener {
        fn open(&mut self, meeting: &Meeting) -> Result<()> {
            self.attempts.push(meeting.call_id.clone());
            if self.failing.contains(&meeting.call_id) {
                return Err(anyhow!("window not available"));
            }
            self.opened.push(meeting.call_id.clone());
            Ok(())
        }
    }
}
