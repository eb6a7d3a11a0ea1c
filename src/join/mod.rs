pub mod collaborators;
pub mod coordinator;
pub mod state;
pub mod trigger;

pub use collaborators::{AlarmScheduler, MeetingOpener};
pub use coordinator::{JoinTriggerCoordinator, ScheduleReport};
pub use state::{JoinTriggerState, ScheduledJoin, TriggerStatus};
pub use trigger::{calculate_next_trigger, NextJoinTrigger};
