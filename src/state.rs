// Persisted usage state
//
// One JSON record per state file. Loading never fails: a missing file yields
// defaults, a corrupt file is backed up and replaced by defaults, and any key
// missing from an older file is back-filled. Saving is atomic (temp + rename).

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::common;
use crate::config::Config;
use crate::counters::InterfaceSelector;
use crate::error::{QuotaError, Result};
use crate::retry::{retry_if_retryable, RetryConfig};

/// Default monthly quota in gigabytes.
pub const DEFAULT_QUOTA_GB: f64 = 50.0;

/// Default reset day of month.
pub const DEFAULT_RESET_DAY: u32 = 1;

/// Durable usage record.
///
/// Field names are the on-disk schema. `#[serde(default)]` back-fills any key
/// absent from an older file without touching the keys that are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UsageState {
    /// Monthly quota in gigabytes
    pub total_limit_gb: f64,

    /// Day of month the cycle nominally resets (1-31)
    pub reset_day: u32,

    /// Bytes already folded into durable storage this cycle
    pub current_cycle_usage: f64,

    /// Epoch seconds of the last save (informational)
    pub last_save_time: f64,

    /// Manual correction in gigabytes, added on top of committed usage
    pub offset_usage: f64,

    /// Month (1-12) the cycle was last considered current
    pub cycle_month: u32,

    /// Measured interface; `null` means all interfaces
    pub selected_interface: Option<String>,

    /// First day of the current cycle (YYYY-MM-DD), written once a cycle boundary is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_start: Option<String>,

    /// Keys written by other versions, carried through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for UsageState {
    fn default() -> Self {
        UsageState {
            total_limit_gb: DEFAULT_QUOTA_GB,
            reset_day: DEFAULT_RESET_DAY,
            current_cycle_usage: 0.0,
            last_save_time: common::epoch_seconds(),
            offset_usage: 0.0,
            cycle_month: common::current_month(),
            selected_interface: None,
            cycle_start: None,
            extra: Map::new(),
        }
    }
}

impl UsageState {
    /// Committed usage in bytes (negative or non-finite values read as zero).
    pub fn committed_bytes(&self) -> u64 {
        if self.current_cycle_usage.is_finite() && self.current_cycle_usage > 0.0 {
            self.current_cycle_usage as u64
        } else {
            0
        }
    }

    pub fn set_committed_bytes(&mut self, bytes: u64) {
        self.current_cycle_usage = bytes as f64;
    }

    /// Manual offset in bytes.
    pub fn offset_bytes(&self) -> u64 {
        common::gb_to_bytes(self.offset_usage)
    }

    /// Quota in bytes.
    pub fn quota_bytes(&self) -> u64 {
        common::gb_to_bytes(self.total_limit_gb)
    }

    pub fn selector(&self) -> InterfaceSelector {
        InterfaceSelector::from_option(self.selected_interface.as_deref())
    }

    pub fn set_selector(&mut self, selector: &InterfaceSelector) {
        self.selected_interface = selector.as_option();
    }
}

/// Sibling path with `suffix` appended to the file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// File-backed store for [`UsageState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    retry: RetryConfig,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StateStore {
            path: path.into(),
            retry: RetryConfig::default(),
        }
    }

    /// Store at the configured location with the configured save retries.
    pub fn from_config(config: &Config) -> Result<Self> {
        let path = common::resolve_state_path(&config.tracking.state_file)?;
        Ok(StateStore::new(path).with_retry(RetryConfig::from(&config.retry.file_ops)))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        sibling(&self.path, ".backup")
    }

    /// Load the state, falling back to defaults on any problem.
    pub fn load(&self) -> UsageState {
        if !self.path.exists() {
            log::debug!("No state file at {}, using defaults", self.path.display());
            return UsageState::default();
        }

        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Cannot read state file {}: {}", self.path.display(), e);
                return UsageState::default();
            }
        };

        match serde_json::from_str::<UsageState>(&contents) {
            Ok(state) => state,
            Err(e) => {
                log::warn!("Corrupted state file, using defaults: {}", e);
                let backup = self.backup_path();
                match fs::copy(&self.path, &backup) {
                    Ok(_) => log::warn!("Backed up corrupted state to {}", backup.display()),
                    Err(e) => log::warn!("Failed to back up corrupted state: {}", e),
                }
                UsageState::default()
            }
        }
    }

    /// Persist the state, retrying transient I/O failures.
    pub fn save(&self, state: &UsageState) -> Result<()> {
        retry_if_retryable(&self.retry, || self.write_atomic(state))
    }

    fn write_atomic(&self, state: &UsageState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;

        let temp_path = sibling(&self.path, ".tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;

        log::debug!(
            "Saved state: committed={} bytes, offset={} GB",
            state.committed_bytes(),
            state.offset_usage
        );
        Ok(())
    }

    /// Take exclusive ownership of the state file.
    ///
    /// Only one engine may write a given state file; a second owner fails with
    /// [`QuotaError::LockFailed`] instead of blocking. The lock is released when
    /// the returned guard is dropped.
    pub fn lock(&self) -> Result<StateLock> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = sibling(&self.path, ".lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        file.try_lock_exclusive().map_err(|e| {
            QuotaError::lock(format!(
                "{} is in use by another netquota process ({})",
                self.path.display(),
                e
            ))
        })?;

        Ok(StateLock { _file: file })
    }
}

/// Guard holding the exclusive state-file lock.
#[derive(Debug)]
pub struct StateLock {
    _file: File,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> StateStore {
        StateStore::new(dir.path().join("data_usage.json"))
    }

    #[test]
    fn test_defaults() {
        let state = UsageState::default();
        assert_eq!(state.total_limit_gb, 50.0);
        assert_eq!(state.reset_day, 1);
        assert_eq!(state.current_cycle_usage, 0.0);
        assert_eq!(state.offset_usage, 0.0);
        assert!(state.selected_interface.is_none());
        assert!((1..=12).contains(&state.cycle_month));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let state = store_in(&dir).load();
        assert_eq!(state.total_limit_gb, DEFAULT_QUOTA_GB);
        assert!(!dir.path().join("data_usage.json").exists());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut state = UsageState::default();
        state.total_limit_gb = 120.0;
        state.set_committed_bytes(987_654_321);
        state.selected_interface = Some("wlan0".to_string());
        store.save(&state).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.total_limit_gb, 120.0);
        assert_eq!(loaded.committed_bytes(), 987_654_321);
        assert_eq!(loaded.selected_interface.as_deref(), Some("wlan0"));
        assert!(!dir.path().join("data_usage.json.tmp").exists());
    }

    #[test]
    fn test_backfill_preserves_present_keys() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            store.path(),
            r#"{"total_limit_gb": 20.0, "reset_day": 15, "current_cycle_usage": 1234.0}"#,
        )
        .unwrap();

        let state = store.load();
        assert_eq!(state.total_limit_gb, 20.0);
        assert_eq!(state.reset_day, 15);
        assert_eq!(state.committed_bytes(), 1234);
        assert_eq!(state.offset_usage, 0.0);
        assert!(state.selected_interface.is_none());
    }

    #[test]
    fn test_unknown_keys_survive_save() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), r#"{"reset_day": 3, "theme": "dark"}"#).unwrap();

        let state = store.load();
        assert_eq!(state.extra.get("theme"), Some(&Value::from("dark")));
        store.save(&state).unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["reset_day"], 3);
        assert!(raw.get("selected_interface").is_some());
    }

    #[test]
    fn test_corrupted_file_backed_up() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "not valid json {").unwrap();

        let state = store.load();
        assert_eq!(state.total_limit_gb, DEFAULT_QUOTA_GB);

        let backup = fs::read_to_string(store.backup_path()).unwrap();
        assert_eq!(backup, "not valid json {");
    }

    #[test]
    fn test_negative_usage_reads_as_zero() {
        let mut state = UsageState::default();
        state.current_cycle_usage = -50.0;
        assert_eq!(state.committed_bytes(), 0);
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let guard = store.lock().unwrap();
        let second = store.lock();
        assert!(matches!(second, Err(QuotaError::LockFailed(_))));

        drop(guard);
        assert!(store.lock().is_ok());
    }
}
