pub mod config;
pub mod decision;

pub use config::{SchedulerConfig, SchedulerConfigPatch};
pub use decision::{get_next_joinable_meeting, Scheduler, SchedulerEvent};
