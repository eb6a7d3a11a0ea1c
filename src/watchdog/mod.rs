pub mod config;
pub mod evaluator;
pub mod state;

pub use config::{local_day_key, DayKeyFn, WatchdogConfig};
pub use evaluator::{Evaluation, HomepageWatchdog, Observation, WatchdogAction, WatchdogReason};
pub use state::{WatchdogPhase, WatchdogState};
