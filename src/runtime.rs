use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::join::{AlarmScheduler, MeetingOpener};
use crate::session::{PageReloader, WatchSession};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Delivered when a [`TokioAlarm`] registration elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmFired {
    pub generation: u64,
}

/// [`AlarmScheduler`] backed by one sleeping tokio task.
///
/// Every `schedule`/`clear` bumps the generation and aborts the previous
/// task, so at most one registration is live and a fire that was already
/// queued when it got replaced is recognised as stale by [`AlarmReceiver`].
pub struct TokioAlarm {
    runtime: Handle,
    task: Option<JoinHandle<()>>,
    generation: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<AlarmFired>,
}

/// Receiving half of a [`TokioAlarm`]; yields only current fires.
pub struct AlarmReceiver {
    rx: mpsc::UnboundedReceiver<AlarmFired>,
    generation: AlarmGeneration,
}

/// Shared view of the live registration's generation.
#[derive(Debug, Clone)]
pub struct AlarmGeneration(Arc<AtomicU64>);

impl AlarmGeneration {
    /// False once the registration that produced `fired` was replaced or cleared.
    pub fn is_current(&self, fired: AlarmFired) -> bool {
        fired.generation == self.0.load(Ordering::SeqCst)
    }
}

impl TokioAlarm {
    /// Must be called from within a tokio runtime.
    pub fn channel() -> (Self, AlarmReceiver) {
        Self::channel_on(Handle::current())
    }

    pub fn channel_on(runtime: Handle) -> (Self, AlarmReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        (
            Self {
                runtime,
                task: None,
                generation: generation.clone(),
                tx,
            },
            AlarmReceiver {
                rx,
                generation: AlarmGeneration(generation),
            },
        )
    }

    pub fn is_pending(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn abort_pending(&mut self) -> u64 {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl AlarmScheduler for TokioAlarm {
    fn schedule(&mut self, fire_at: DateTime<Utc>) {
        let generation = self.abort_pending();
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let tx = self.tx.clone();

        log_debug!("alarm.armed", "generation {generation} fires in {delay:?}");
        self.task = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(AlarmFired { generation });
        }));
    }

    fn clear(&mut self) {
        self.abort_pending();
    }
}

impl Drop for TokioAlarm {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl AlarmReceiver {
    /// Waits for the next fire of the current registration. Returns `None`
    /// once the alarm is dropped.
    pub async fn recv(&mut self) -> Option<AlarmFired> {
        while let Some(fired) = self.rx.recv().await {
            if self.generation.is_current(fired) {
                return Some(fired);
            }
            log_debug!("alarm.stale", "dropping superseded generation {}", fired.generation);
        }
        None
    }

    pub fn generation(&self) -> AlarmGeneration {
        self.generation.clone()
    }
}

pub type SharedSession<A, O, R> = Arc<Mutex<WatchSession<A, O, R>>>;

/// Background loops for one session: alarm delivery and the periodic re-check.
pub struct SessionDriver {
    handles: Vec<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SessionDriver {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.is_some()
    }

    pub fn start<A, O, R>(&mut self, session: SharedSession<A, O, R>, alarms: AlarmReceiver) -> Result<()>
    where
        A: AlarmScheduler + Send + 'static,
        O: MeetingOpener + Send + 'static,
        R: PageReloader + Send + 'static,
    {
        if self.cancel_token.is_some() {
            bail!("driver already running");
        }

        let cancel_token = CancellationToken::new();
        self.handles.push(tokio::spawn(alarm_loop(
            session.clone(),
            alarms,
            cancel_token.clone(),
        )));
        self.handles
            .push(tokio::spawn(recheck_loop(session, cancel_token.clone())));
        self.cancel_token = Some(cancel_token);

        log_info!("driver.started", "session loops running");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        for handle in self.handles.drain(..) {
            handle.await.context("session loop task failed to join")?;
        }
        log_info!("driver.stopped", "session loops stopped");
        Ok(())
    }
}

impl Default for SessionDriver {
    fn default() -> Self {
        Self::new()
    }
}

async fn alarm_loop<A, O, R>(
    session: SharedSession<A, O, R>,
    mut alarms: AlarmReceiver,
    cancel_token: CancellationToken,
) where
    A: AlarmScheduler,
    O: MeetingOpener,
    R: PageReloader,
{
    let generation = alarms.generation();
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            fired = alarms.recv() => {
                let Some(fired) = fired else { break };
                let mut session = session.lock().await;
                // The session may have rescheduled while we waited for the lock.
                if !generation.is_current(fired) {
                    log_debug!("alarm.stale", "generation {} replaced before delivery", fired.generation);
                    continue;
                }
                log_debug!("alarm.fired", "generation {}", fired.generation);
                session.alarm_fired(Utc::now());
            }
        }
    }
}

async fn recheck_loop<A, O, R>(session: SharedSession<A, O, R>, cancel_token: CancellationToken)
where
    A: AlarmScheduler,
    O: MeetingOpener,
    R: PageReloader,
{
    loop {
        let interval_secs = session.lock().await.settings().check_interval_secs();
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {
                session.lock().await.recheck(Utc::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::collaborators::fakes::ScriptedOpener;
    use crate::meetings::Meeting;
    use crate::session::fakes::ScriptedReloader;
    use crate::settings::Settings;
    use chrono::Duration as ChronoDuration;

    fn meeting_starting_in(call_id: &str, offset: ChronoDuration) -> Meeting {
        let begin_time = Utc::now() + offset;
        Meeting {
            call_id: call_id.to_string(),
            url: format!("https://meet.google.com/{call_id}"),
            title: call_id.to_string(),
            display_time: String::new(),
            begin_time,
            end_time: begin_time + ChronoDuration::minutes(30),
            event_id: None,
            starts_in_minutes: 0,
        }
    }

    #[tokio::test]
    async fn alarm_delivers_current_generation() {
        let (mut alarm, mut rx) = TokioAlarm::channel();
        alarm.schedule(Utc::now() + ChronoDuration::milliseconds(20));
        assert!(alarm.is_pending());

        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fired.generation, 1);
    }

    #[tokio::test]
    async fn replaced_and_cleared_alarms_never_fire() {
        let (mut alarm, mut rx) = TokioAlarm::channel();
        alarm.schedule(Utc::now() + ChronoDuration::milliseconds(10));
        alarm.schedule(Utc::now() + ChronoDuration::milliseconds(30));
        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fired.generation, 2);

        alarm.schedule(Utc::now() + ChronoDuration::milliseconds(10));
        alarm.clear();
        assert!(!alarm.is_pending());
        let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn queued_fire_is_dropped_after_reschedule() {
        let (mut alarm, mut rx) = TokioAlarm::channel();
        alarm.schedule(Utc::now());
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The first fire is already in the channel; replacing it must hide it.
        alarm.schedule(Utc::now() + ChronoDuration::hours(1));
        let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn driver_joins_when_alarm_fires() {
        let (alarm, alarms) = TokioAlarm::channel();
        let settings = Settings {
            join_before_minutes: 0,
            ..Settings::default()
        };
        let session = Arc::new(Mutex::new(WatchSession::new(
            settings,
            alarm,
            ScriptedOpener::default(),
            ScriptedReloader::default(),
        )));

        {
            let mut s = session.lock().await;
            s.start(Utc::now());
            s.meetings_updated(
                vec![meeting_starting_in("soon", ChronoDuration::milliseconds(2_000))],
                Utc::now(),
            );
            assert!(s.joined().is_empty());
        }

        let mut driver = SessionDriver::new();
        driver.start(session.clone(), alarms).unwrap();
        assert!(driver.start(session.clone(), TokioAlarm::channel().1).is_err());

        let mut joined = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if session.lock().await.joined().contains("soon") {
                joined = true;
                break;
            }
        }
        assert!(joined);

        driver.stop().await.unwrap();
        assert!(!driver.is_running());
        assert_eq!(session.lock().await.coordinator().opener().attempts.len(), 1);
    }

    #[tokio::test]
    async fn fire_replaced_while_session_locked_is_not_delivered() {
        let (alarm, alarms) = TokioAlarm::channel();
        let settings = Settings {
            join_before_minutes: 0,
            ..Settings::default()
        };
        let session = Arc::new(Mutex::new(WatchSession::new(
            settings,
            alarm,
            ScriptedOpener::default(),
            ScriptedReloader::default(),
        )));
        {
            let mut s = session.lock().await;
            s.start(Utc::now());
            s.meetings_updated(
                vec![meeting_starting_in("early", ChronoDuration::milliseconds(1_500))],
                Utc::now(),
            );
        }

        let mut driver = SessionDriver::new();
        driver.start(session.clone(), alarms).unwrap();

        {
            // Hold the session across the fire, then swap in a later meeting.
            let mut s = session.lock().await;
            tokio::time::sleep(Duration::from_millis(2_000)).await;
            s.meetings_updated(
                vec![meeting_starting_in("later", ChronoDuration::minutes(10))],
                Utc::now(),
            );
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        {
            let s = session.lock().await;
            assert!(s.coordinator().opener().attempts.is_empty());
            assert_eq!(
                s.coordinator().scheduled_meeting().map(|m| m.call_id.as_str()),
                Some("later")
            );
        }
        driver.stop().await.unwrap();
    }

    #[test]
    fn generation_view_tracks_replacement() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (mut alarm, rx) = TokioAlarm::channel_on(runtime.handle().clone());
        alarm.schedule(Utc::now() + ChronoDuration::hours(1));
        let view = rx.generation();
        assert!(view.is_current(AlarmFired { generation: 1 }));

        alarm.clear();
        assert!(!view.is_current(AlarmFired { generation: 1 }));
    }
}
