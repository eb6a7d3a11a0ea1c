use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::join::{AlarmScheduler, JoinTriggerCoordinator, MeetingOpener, ScheduleReport, ScheduledJoin};
use crate::meetings::{fingerprint, Meeting};
use crate::scheduler::{get_next_joinable_meeting, Scheduler, SchedulerConfigPatch, SchedulerEvent};
use crate::settings::{changed_keys, Settings};
use crate::utils::clock::utc_from_ms;
use crate::utils::redact::mask_id;
use crate::watchdog::{
    Evaluation, HomepageWatchdog, Observation, WatchdogAction, WatchdogConfig, WatchdogPhase,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// Force-reloads the watched homepage.
pub trait PageReloader {
    fn reload(&mut self) -> Result<()>;
}

impl<T: PageReloader + ?Sized> PageReloader for Box<T> {
    fn reload(&mut self) -> Result<()> {
        (**self).reload()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub enabled: bool,
    pub next_meeting: Option<Meeting>,
    pub event: SchedulerEvent,
    pub scheduled: Option<ScheduledJoin>,
    pub watchdog: WatchdogPhase,
    pub meetings: Vec<Meeting>,
}

/// Everything one watched meetings tab needs: the latest snapshot, the join
/// bookkeeping, the alarm coordinator and the homepage watchdog.
///
/// Sessions are independent; a host runs one per tab.
pub struct WatchSession<A, O, R> {
    id: Uuid,
    enabled: bool,
    settings: Settings,
    scheduler: Scheduler,
    coordinator: JoinTriggerCoordinator<A, O>,
    watchdog: HomepageWatchdog,
    reloader: R,
    meetings: Vec<Meeting>,
    joined: HashSet<String>,
    /// call id -> epoch ms at which the user closed the meeting.
    suppressed: HashMap<String, i64>,
}

impl<A: AlarmScheduler, O: MeetingOpener, R: PageReloader> WatchSession<A, O, R> {
    /// Builds a stopped session; call [`WatchSession::start`] to arm it.
    pub fn new(settings: Settings, alarm: A, opener: O, reloader: R) -> Self {
        Self::with_watchdog_config(settings.watchdog_config(), settings, alarm, opener, reloader)
    }

    /// Like [`WatchSession::new`] but with an explicit watchdog config, e.g. a
    /// custom day key.
    pub fn with_watchdog_config(
        watchdog_config: WatchdogConfig,
        settings: Settings,
        alarm: A,
        opener: O,
        reloader: R,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            enabled: false,
            scheduler: Scheduler::new(settings.scheduler_config()),
            settings,
            coordinator: JoinTriggerCoordinator::new(alarm, opener),
            watchdog: HomepageWatchdog::new(watchdog_config),
            reloader,
            meetings: Vec::new(),
            joined: HashSet::new(),
            suppressed: HashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.enabled
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn meetings(&self) -> &[Meeting] {
        &self.meetings
    }

    pub fn joined(&self) -> &HashSet<String> {
        &self.joined
    }

    pub fn suppressed(&self) -> &HashMap<String, i64> {
        &self.suppressed
    }

    pub fn coordinator(&self) -> &JoinTriggerCoordinator<A, O> {
        &self.coordinator
    }

    pub fn watchdog(&self) -> &HomepageWatchdog {
        &self.watchdog
    }

    pub fn reloader(&self) -> &R {
        &self.reloader
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> ScheduleReport {
        if !self.enabled {
            log_info!("session.started", "session {} started", self.id);
            self.enabled = true;
        }
        self.reschedule(now)
    }

    /// Stops joining; snapshots keep being stored but no alarm stays pending.
    pub fn stop(&mut self) {
        if self.enabled {
            log_info!("session.stopped", "session {} stopped", self.id);
        }
        self.enabled = false;
        self.coordinator.clear();
    }

    /// Replaces the meeting snapshot and reschedules.
    pub fn meetings_updated(&mut self, mut meetings: Vec<Meeting>, now: DateTime<Utc>) -> ScheduleReport {
        meetings.sort_by_key(|m| m.begin_time);
        log_debug!(
            "meetings.updated",
            "received {} meetings ({})",
            meetings.len(),
            fingerprint(&meetings)
        );
        self.meetings = meetings;
        self.reschedule(now)
    }

    /// Records a meeting joined through another path (e.g. the user clicked it).
    pub fn meeting_joined(&mut self, call_id: &str, now: DateTime<Utc>) -> ScheduleReport {
        log_info!("meeting.joined", "{} joined externally", mask_id(call_id));
        self.joined.insert(call_id.to_string());
        self.reschedule(now)
    }

    /// Suppresses auto-join for a meeting the user closed at or after its
    /// trigger time. Returns whether it was suppressed.
    pub fn meeting_closed(&mut self, call_id: &str, closed_at_ms: i64, now: DateTime<Utc>) -> bool {
        let join_before = self.settings.join_before_minutes;
        let Some(meeting) = self.meetings.iter().find(|m| m.call_id == call_id) else {
            log_debug!("meeting.closed", "{} closed but not in snapshot", mask_id(call_id));
            return false;
        };

        let trigger_at = meeting.trigger_time(join_before);
        if utc_from_ms(closed_at_ms) < trigger_at {
            log_debug!(
                "meeting.closed",
                "{} closed before its trigger at {trigger_at}; not suppressing",
                mask_id(call_id)
            );
            return false;
        }

        log_info!(
            "meeting.suppressed",
            "{} closed by user; auto-join suppressed",
            mask_id(call_id)
        );
        self.suppressed.insert(call_id.to_string(), closed_at_ms);
        self.reschedule(now);
        true
    }

    pub fn clear_joined(&mut self, now: DateTime<Utc>) -> ScheduleReport {
        log_info!(
            "meeting.cleared",
            "forgetting {} joined and {} suppressed meetings",
            self.joined.len(),
            self.suppressed.len()
        );
        self.joined.clear();
        self.suppressed.clear();
        self.reschedule(now)
    }

    /// Delivers a fired alarm to the coordinator.
    pub fn alarm_fired(&mut self, now: DateTime<Utc>) -> ScheduleReport {
        if !self.enabled {
            log_debug!("trigger.stale", "alarm fired while stopped");
            return ScheduleReport::default();
        }
        let mut handled = self.handled();
        let report = self
            .coordinator
            .on_alarm(&self.meetings, &mut handled, &self.scheduler.config(), now);
        self.absorb_opened(&report);
        report
    }

    /// Periodic re-check; same as any other reschedule.
    pub fn recheck(&mut self, now: DateTime<Utc>) -> ScheduleReport {
        self.reschedule(now)
    }

    /// Applies new settings, logs what changed and reschedules. Returns the
    /// changed keys.
    pub fn update_settings(&mut self, settings: Settings, now: DateTime<Utc>) -> Vec<&'static str> {
        let keys = changed_keys(&self.settings, &settings);
        if keys.is_empty() {
            return keys;
        }
        log_info!("settings.changed", "{}", keys.join(", "));

        self.scheduler.update_config(SchedulerConfigPatch {
            join_before_minutes: Some(settings.join_before_minutes),
            max_minutes_after_start: Some(settings.max_minutes_after_start),
            title_exclude_filters: Some(settings.title_exclude_filters.clone()),
        });
        let day_key = self.watchdog.config().day_key.clone();
        self.watchdog.set_config(WatchdogConfig {
            day_key,
            ..settings.watchdog_config()
        });
        self.settings = settings;
        self.reschedule(now);
        keys
    }

    /// Snapshot for a tray or UI.
    ///
    /// `event` comes from [`Scheduler::check`], which never consults
    /// suppression; suppressed meetings are folded into its joined set here so
    /// it agrees with what the coordinator will actually open. `next_meeting`
    /// uses [`get_next_joinable_meeting`] with the separate sets.
    pub fn status(&self, now: DateTime<Utc>) -> SessionStatus {
        let config = self.scheduler.config();
        SessionStatus {
            session_id: self.id,
            enabled: self.enabled,
            next_meeting: get_next_joinable_meeting(
                &self.meetings,
                &self.joined,
                &self.suppressed,
                &config,
                now,
            ),
            event: self.scheduler.check(&self.meetings, &self.handled(), &self.suppressed, now),
            scheduled: self.coordinator.state().scheduled.clone(),
            watchdog: self
                .watchdog
                .state()
                .phase(now.timestamp_millis(), self.watchdog.config()),
            meetings: self.meetings.clone(),
        }
    }

    /// Feeds one homepage observation to the watchdog, reloading when told to.
    pub fn observe_homepage(&mut self, is_homepage: bool, is_foreground: bool, now_ms: i64) -> Evaluation {
        let fp = fingerprint(&self.meetings);
        let evaluation = self.watchdog.evaluate(Observation {
            fingerprint: &fp,
            now_ms,
            is_homepage,
            is_foreground,
        });
        self.perform(&evaluation);
        evaluation
    }

    /// Call when the tab leaves the foreground so a deferred reload runs.
    pub fn flush_pending_reload(&mut self, is_homepage: bool, now_ms: i64) -> Option<Evaluation> {
        let fp = fingerprint(&self.meetings);
        let evaluation = self.watchdog.flush_pending(&fp, now_ms, is_homepage)?;
        self.perform(&evaluation);
        Some(evaluation)
    }

    fn perform(&mut self, evaluation: &Evaluation) {
        if evaluation.action != WatchdogAction::Reload {
            return;
        }
        if let Err(err) = self.reloader.reload() {
            log_error!("watchdog.reload_failed", "homepage reload failed: {err:#}");
        }
    }

    fn reschedule(&mut self, now: DateTime<Utc>) -> ScheduleReport {
        if !self.enabled {
            return ScheduleReport::default();
        }
        let mut handled = self.handled();
        let report = self
            .coordinator
            .schedule_next(&self.meetings, &mut handled, &self.scheduler.config(), now);
        self.absorb_opened(&report);
        report
    }

    /// Joined plus suppressed: the ids the coordinator must not open.
    fn handled(&self) -> HashSet<String> {
        self.joined
            .iter()
            .chain(self.suppressed.keys())
            .cloned()
            .collect()
    }

    fn absorb_opened(&mut self, report: &ScheduleReport) {
        self.joined.extend(report.opened.iter().cloned());
    }
}
