use crate::common;
use crate::error::{QuotaError, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Application configuration (TOML).
///
/// This is tool behaviour only. The quota, reset day, offset and selected
/// interface live in the state file and change through `netquota set`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Polling and persistence
    pub tracking: TrackingConfig,

    /// Terminal output
    pub display: DisplayConfig,

    /// Retry configuration
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackingConfig {
    /// Seconds between commits in `watch` mode
    pub poll_interval_secs: u64,

    /// State file path; empty means `$XDG_DATA_HOME/netquota/data_usage.json`
    pub state_file: String,

    /// Reset usage automatically when the reset day passes
    pub auto_reset: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Progress bar width in characters
    pub progress_bar_width: usize,

    /// Quota percentage shown in yellow above this
    pub warning_threshold: f64,

    /// Quota percentage shown in red above this
    pub critical_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// State file save retries
    pub file_ops: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            poll_interval_secs: 5,
            state_file: String::new(),
            auto_reset: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            progress_bar_width: 20,
            warning_threshold: 75.0,
            critical_threshold: 90.0,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2000,
            backoff_factor: 2.0,
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, or defaults
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Config::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| QuotaError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| QuotaError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tracking.poll_interval_secs == 0 {
            return Err(QuotaError::Config(
                "tracking.poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.display.warning_threshold > self.display.critical_threshold {
            return Err(QuotaError::Config(
                "display.warning_threshold must not exceed display.critical_threshold".into(),
            ));
        }
        Ok(())
    }

    /// Find config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        // 1. Explicit override
        if let Ok(path) = env::var("NETQUOTA_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. XDG config directory
        if let Some(config_dir) = common::get_config_dir() {
            let path = config_dir.join("config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Home directory
        if let Some(home_dir) = dirs::home_dir() {
            let path = home_dir.join(".netquota.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Get default config file path (for creating new config)
    pub fn default_config_path() -> Result<PathBuf> {
        common::get_config_dir()
            .map(|dir| dir.join("config.toml"))
            .ok_or_else(|| QuotaError::Config("Could not determine config directory".into()))
    }

    /// Generate example config file content
    pub fn example_toml() -> &'static str {
        r#"# netquota configuration file
#
# All values shown are the defaults. The quota itself is not set here:
# use `netquota set --quota-gb <GB> --reset-day <DAY>`.

[tracking]
# Seconds between commits while `netquota watch` runs.
# At most one interval of usage is lost if the process is killed.
poll_interval_secs = 5

# Where usage is persisted (empty = ~/.local/share/netquota/data_usage.json)
state_file = ""

# Zero the usage automatically once the reset day has passed
auto_reset = false

[display]
progress_bar_width = 20
warning_threshold = 75.0     # Yellow above this percentage of the quota
critical_threshold = 90.0    # Red above this percentage of the quota

[retry.file_ops]
# State file save retries
max_attempts = 3
initial_delay_ms = 100
max_delay_ms = 2000
backoff_factor = 2.0
"#
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration instance
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Config::default()
        })
    })
}
