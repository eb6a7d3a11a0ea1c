pub mod join;
pub mod meetings;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod surface;
pub mod utils;
pub mod watchdog;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::info;
use tokio::sync::Mutex;

use utils::clock::now_ms;
use utils::redact::{mask_url, MeetingLabel};

pub use join::{AlarmScheduler, JoinTriggerCoordinator, MeetingOpener, ScheduleReport};
pub use meetings::{fingerprint, Meeting};
pub use runtime::{AlarmGeneration, AlarmReceiver, SessionDriver, TokioAlarm};
pub use scheduler::{get_next_joinable_meeting, Scheduler, SchedulerConfig, SchedulerEvent};
pub use session::{PageReloader, SessionStatus, WatchSession};
pub use settings::{Settings, SettingsPatch, SettingsStore};
pub use watchdog::{Evaluation, HomepageWatchdog, Observation, WatchdogAction, WatchdogConfig};

/// Headless meeting watcher: schedules auto-joins for a meetings snapshot and
/// guards the homepage against going stale.
#[derive(Parser, Debug)]
#[command(name = "meetwatch", version, about)]
struct Args {
    /// JSON array of meetings, as scraped from the homepage.
    meetings: PathBuf,

    /// Settings file; created on first change, defaults when missing.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Keep running: re-read the snapshot every check interval and log joins.
    #[arg(long)]
    watch: bool,

    /// URL of the watched page, used to decide whether the watchdog may reload it.
    #[arg(long, default_value = surface::MEET_HOME_URL)]
    page_url: String,
}

/// Prints the URL it would open; the browser side performs the join.
struct StdoutOpener;

impl MeetingOpener for StdoutOpener {
    fn open(&mut self, meeting: &Meeting) -> Result<()> {
        info!("Opening {} ({})", MeetingLabel(meeting), mask_url(&meeting.url));
        println!("JOIN {} {}", meeting.call_id, meeting.url);
        Ok(())
    }
}

struct StdoutReloader {
    page_url: String,
}

impl PageReloader for StdoutReloader {
    fn reload(&mut self) -> Result<()> {
        println!("RELOAD {}", self.page_url);
        Ok(())
    }
}

fn read_meetings(path: &Path) -> Result<Vec<Meeting>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read meetings from {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse meetings in {}", path.display()))
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    info!("meetwatch starting up...");

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(run_async(args))
}

async fn run_async(args: Args) -> Result<()> {
    let settings = match &args.settings {
        Some(path) => SettingsStore::new(path.clone())?.get(),
        None => Settings::default(),
    };
    let meetings = read_meetings(&args.meetings)?;
    let is_homepage = surface::is_homepage(&args.page_url);

    let (alarm, alarms) = TokioAlarm::channel();
    let reloader = StdoutReloader {
        page_url: args.page_url.clone(),
    };
    let mut session = WatchSession::new(settings, alarm, StdoutOpener, reloader);
    session.meetings_updated(meetings, Utc::now());

    if !args.watch {
        let status = session.status(Utc::now());
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    session.start(Utc::now());
    session.observe_homepage(is_homepage, false, now_ms());
    let interval_secs = session.settings().check_interval_secs();

    let session = Arc::new(Mutex::new(session));
    let mut driver = SessionDriver::new();
    driver.start(session.clone(), alarms)?;

    let mut last_fingerprint = fingerprint(session.lock().await.meetings());
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down...");
                break;
            }
            _ = ticker.tick() => {
                let mut session = session.lock().await;
                match read_meetings(&args.meetings) {
                    Ok(meetings) => {
                        let next = fingerprint(&meetings);
                        if next != last_fingerprint {
                            last_fingerprint = next;
                            session.meetings_updated(meetings, Utc::now());
                        }
                    }
                    Err(err) => log::warn!("Keeping previous snapshot: {err:#}"),
                }
                session.observe_homepage(is_homepage, false, now_ms());
            }
        }
    }

    driver.stop().await?;
    session.lock().await.stop();
    Ok(())
}
