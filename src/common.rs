//! Common utilities shared across modules.
//!
//! Directory resolution, byte-unit constants and clock helpers live here so
//! every module agrees on where the state file is and what a gigabyte means.

use chrono::{Datelike, Local, NaiveDate};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{QuotaError, Result};

/// Application directory name under the XDG data/config roots.
pub const APP_DIR: &str = "netquota";

/// Default state file name.
pub const STATE_FILE_NAME: &str = "data_usage.json";

/// Quota and offset values are expressed in binary gigabytes.
pub const BYTES_PER_GB: u64 = 1 << 30;

/// Gets the application data directory using XDG Base Directory specification.
///
/// Returns `$XDG_DATA_HOME/netquota/` when set, otherwise the platform data
/// directory (`~/.local/share/netquota/` on Linux).
///
/// # Example
///
/// ```rust,no_run
/// use netquota::common::get_data_dir;
///
/// let state_file = get_data_dir().join("data_usage.json");
/// ```
pub fn get_data_dir() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join(APP_DIR);
        }
    }

    let base_dir = dirs::data_dir().unwrap_or_else(|| {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".local").join("share")
    });

    base_dir.join(APP_DIR)
}

/// Gets the application config directory (`$XDG_CONFIG_HOME/netquota/`).
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg).join(APP_DIR));
        }
    }
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

/// Resolves the state file location.
///
/// Priority: explicit configured path, `NETQUOTA_STATE_FILE`, data directory.
pub fn resolve_state_path(configured: &str) -> Result<PathBuf> {
    if !configured.is_empty() {
        return validate_state_path(configured);
    }
    if let Ok(path) = env::var("NETQUOTA_STATE_FILE") {
        if !path.is_empty() {
            return validate_state_path(&path);
        }
    }
    Ok(get_data_dir().join(STATE_FILE_NAME))
}

/// Rejects state paths that cannot name a regular file.
///
/// The file itself may not exist yet (first run), so only the shape of the
/// path is checked here.
pub fn validate_state_path(path: &str) -> Result<PathBuf> {
    if path.contains('\0') {
        return Err(QuotaError::invalid_path("Path contains null bytes"));
    }

    let path = Path::new(path);
    if path.file_name().is_none() {
        return Err(QuotaError::invalid_path(format!(
            "State path has no file name: {}",
            path.display()
        )));
    }

    Ok(path.to_path_buf())
}

/// Seconds since the Unix epoch, with sub-second precision.
pub fn epoch_seconds() -> f64 {
    let now = Local::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_millis()) / 1000.0
}

/// Today's date in local time.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Current month number (1-12) in local time.
pub fn current_month() -> u32 {
    Local::now().month()
}

/// Converts gigabytes to bytes, saturating at zero for negative input.
pub fn gb_to_bytes(gb: f64) -> u64 {
    if gb.is_finite() && gb > 0.0 {
        (gb * BYTES_PER_GB as f64) as u64
    } else {
        0
    }
}
