use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::scheduler::SchedulerConfig;
use crate::watchdog::{
    config::{DEFAULT_BACKOFF_SCHEDULE_MS, DEFAULT_DAILY_RELOAD_LIMIT, DEFAULT_STALE_THRESHOLD_MS},
    WatchdogConfig,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const DEFAULT_CHECK_INTERVAL_SECONDS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchdogSettings {
    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: i64,

    #[serde(default = "default_backoff_schedule_ms")]
    pub backoff_schedule_ms: Vec<i64>,

    #[serde(default = "default_daily_reload_limit")]
    pub daily_reload_limit: u32,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            stale_threshold_ms: default_stale_threshold_ms(),
            backoff_schedule_ms: default_backoff_schedule_ms(),
            daily_reload_limit: default_daily_reload_limit(),
        }
    }
}

/// Persisted user settings. Every field falls back to its default when
/// missing, so older files keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u32,

    #[serde(default = "default_join_before")]
    pub join_before_minutes: u32,

    #[serde(default = "default_max_minutes_after_start")]
    pub max_minutes_after_start: u32,

    #[serde(default)]
    pub title_exclude_filters: Vec<String>,

    #[serde(default)]
    pub homepage_watchdog: WatchdogSettings,
}

fn default_check_interval() -> u32 {
    DEFAULT_CHECK_INTERVAL_SECONDS
}

fn default_join_before() -> u32 {
    SchedulerConfig::default().join_before_minutes
}

fn default_max_minutes_after_start() -> u32 {
    SchedulerConfig::default().max_minutes_after_start
}

fn default_stale_threshold_ms() -> i64 {
    DEFAULT_STALE_THRESHOLD_MS
}

fn default_backoff_schedule_ms() -> Vec<i64> {
    DEFAULT_BACKOFF_SCHEDULE_MS.to_vec()
}

fn default_daily_reload_limit() -> u32 {
    DEFAULT_DAILY_RELOAD_LIMIT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            join_before_minutes: default_join_before(),
            max_minutes_after_start: default_max_minutes_after_start(),
            title_exclude_filters: Vec::new(),
            homepage_watchdog: WatchdogSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchdogSettingsPatch {
    #[serde(default)]
    pub stale_threshold_ms: Option<i64>,
    #[serde(default)]
    pub backoff_schedule_ms: Option<Vec<i64>>,
    #[serde(default)]
    pub daily_reload_limit: Option<u32>,
}

/// Partial settings update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default)]
    pub check_interval_seconds: Option<u32>,
    #[serde(default)]
    pub join_before_minutes: Option<u32>,
    #[serde(default)]
    pub max_minutes_after_start: Option<u32>,
    #[serde(default)]
    pub title_exclude_filters: Option<Vec<String>>,
    #[serde(default)]
    pub homepage_watchdog: Option<WatchdogSettingsPatch>,
}

impl Settings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(v) = patch.check_interval_seconds {
            self.check_interval_seconds = v;
        }
        if let Some(v) = patch.join_before_minutes {
            self.join_before_minutes = v;
        }
        if let Some(v) = patch.max_minutes_after_start {
            self.max_minutes_after_start = v;
        }
        if let Some(v) = patch.title_exclude_filters {
            self.title_exclude_filters = v;
        }
        if let Some(wd) = patch.homepage_watchdog {
            if let Some(v) = wd.stale_threshold_ms {
                self.homepage_watchdog.stale_threshold_ms = v;
            }
            if let Some(v) = wd.backoff_schedule_ms {
                self.homepage_watchdog.backoff_schedule_ms = v;
            }
            if let Some(v) = wd.daily_reload_limit {
                self.homepage_watchdog.daily_reload_limit = v;
            }
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            join_before_minutes: self.join_before_minutes,
            max_minutes_after_start: self.max_minutes_after_start,
            title_exclude_filters: self.title_exclude_filters.clone(),
        }
    }

    /// Watchdog tunables with the default local-date day key.
    pub fn watchdog_config(&self) -> WatchdogConfig {
        WatchdogConfig {
            stale_threshold_ms: self.homepage_watchdog.stale_threshold_ms,
            backoff_schedule_ms: self.homepage_watchdog.backoff_schedule_ms.clone(),
            daily_reload_limit: self.homepage_watchdog.daily_reload_limit,
            ..WatchdogConfig::default()
        }
        .normalized()
    }

    /// Check interval for the periodic re-check, never below one second.
    pub fn check_interval_secs(&self) -> u64 {
        u64::from(self.check_interval_seconds.max(1))
    }
}

/// Names of the settings that differ between `before` and `after`.
pub fn changed_keys(before: &Settings, after: &Settings) -> Vec<&'static str> {
    let mut keys = Vec::new();
    if before.check_interval_seconds != after.check_interval_seconds {
        keys.push("checkIntervalSeconds");
    }
    if before.join_before_minutes != after.join_before_minutes {
        keys.push("joinBeforeMinutes");
    }
    if before.max_minutes_after_start != after.max_minutes_after_start {
        keys.push("maxMinutesAfterStart");
    }
    if before.title_exclude_filters != after.title_exclude_filters {
        keys.push("titleExcludeFilters");
    }
    let (wb, wa) = (&before.homepage_watchdog, &after.homepage_watchdog);
    if wb.stale_threshold_ms != wa.stale_threshold_ms {
        keys.push("homepageWatchdog.staleThresholdMs");
    }
    if wb.backoff_schedule_ms != wa.backoff_schedule_ms {
        keys.push("homepageWatchdog.backoffScheduleMs");
    }
    if wb.daily_reload_limit != wa.daily_reload_limit {
        keys.push("homepageWatchdog.dailyReloadLimit");
    }
    keys
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!(
                    "settings.parse_failed",
                    "ignoring unreadable settings at {}: {err}",
                    path.display()
                );
                Settings::default()
            })
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Settings {
        self.read().clone()
    }

    /// Merges `patch`, persists, and returns the keys that actually changed.
    pub fn update(&self, patch: SettingsPatch) -> Result<Vec<&'static str>> {
        let mut guard = self.write();
        let before = guard.clone();
        let mut after = before.clone();
        after.apply(patch);

        let keys = changed_keys(&before, &after);
        if keys.is_empty() {
            return Ok(keys);
        }

        self.persist(&after)?;
        *guard = after;
        log_info!("settings.saved", "changed keys: {:?}", keys);
        Ok(keys)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings at {}", self.path.display()))?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    // A panic while holding the lock cannot leave `Settings` half-written:
    // every writer swaps in a fully built value.
    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.check_interval_seconds, 30);
        assert_eq!(settings.join_before_minutes, 1);
        assert_eq!(settings.max_minutes_after_start, 10);
        assert!(settings.title_exclude_filters.is_empty());
        assert_eq!(settings.homepage_watchdog.daily_reload_limit, 6);
        assert_eq!(
            settings.homepage_watchdog.backoff_schedule_ms,
            vec![1_800_000, 3_600_000, 7_200_000]
        );
    }

    #[test]
    fn partial_deserialize_fills_defaults() {
        let json = r#"{"joinBeforeMinutes": 5, "homepageWatchdog": {"dailyReloadLimit": 2}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.join_before_minutes, 5);
        assert_eq!(settings.check_interval_seconds, 30);
        assert_eq!(settings.max_minutes_after_start, 10);
        assert_eq!(settings.homepage_watchdog.daily_reload_limit, 2);
        assert_eq!(settings.homepage_watchdog.stale_threshold_ms, 1_800_000);
    }

    #[test]
    fn camel_case_on_disk() {
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert!(json.contains("checkIntervalSeconds"));
        assert!(json.contains("titleExcludeFilters"));
        assert!(json.contains("staleThresholdMs"));
        assert!(!json.contains("join_before_minutes"));
    }

    #[test]
    fn projections_feed_core_configs() {
        let mut settings = Settings::default();
        settings.title_exclude_filters = vec!["1:1".to_string()];
        settings.homepage_watchdog.backoff_schedule_ms = Vec::new();

        let scheduler = settings.scheduler_config();
        assert_eq!(scheduler.join_before_minutes, 1);
        assert_eq!(scheduler.title_exclude_filters, vec!["1:1".to_string()]);

        let watchdog = settings.watchdog_config();
        assert_eq!(watchdog.backoff_schedule_ms, DEFAULT_BACKOFF_SCHEDULE_MS.to_vec());

        settings.check_interval_seconds = 0;
        assert_eq!(settings.check_interval_secs(), 1);
    }

    #[test]
    fn changed_keys_lists_only_differences() {
        let before = Settings::default();
        let mut after = before.clone();
        after.apply(SettingsPatch {
            join_before_minutes: Some(3),
            title_exclude_filters: Some(vec!["Optional".to_string()]),
            homepage_watchdog: Some(WatchdogSettingsPatch {
                daily_reload_limit: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert_eq!(
            changed_keys(&before, &after),
            vec![
                "joinBeforeMinutes",
                "titleExcludeFilters",
                "homepageWatchdog.dailyReloadLimit"
            ]
        );
        assert!(changed_keys(&before, &before).is_empty());
    }

    #[test]
    fn store_persists_updates_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.get(), Settings::default());
        assert!(!path.exists());

        let keys = store
            .update(SettingsPatch {
                max_minutes_after_start: Some(20),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(keys, vec!["maxMinutesAfterStart"]);
        assert!(path.exists());

        let reopened = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reopened.get().max_minutes_after_start, 20);

        fs::write(&path, r#"{"joinBeforeMinutes": 4}"#).unwrap();
        reopened.reload().unwrap();
        assert_eq!(reopened.get().join_before_minutes, 4);
        assert_eq!(reopened.get().max_minutes_after_start, 10);
    }

    #[test]
    fn no_op_update_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let keys = store.update(SettingsPatch::default()).unwrap();
        assert!(keys.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.get(), Settings::default());
        assert!(store.reload().is_err());
    }
}
