//! Test environment isolation support
//!
//! Keeps integration tests away from the host's real state and config:
//! `HOME` and the `XDG_*` roots point into one temp directory for the whole
//! test binary, and every `NETQUOTA_*` variable from the host shell is cleared.
//!
//! # Usage
//!
//! ```ignore
//! mod test_support;
//!
//! #[test]
//! fn my_test() {
//!     let _guard = test_support::init();
//!     let (_dir, store) = test_support::temp_store();
//! }
//! ```

use netquota::StateStore;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use tempfile::TempDir;

static TEMP_BASE: OnceLock<TempDir> = OnceLock::new();

/// Guard that keeps the isolated environment alive.
pub struct TestEnvGuard {
    _private: (),
}

/// Initialize test environment isolation. Safe to call from every test.
pub fn init() -> TestEnvGuard {
    TEMP_BASE.get_or_init(|| {
        let temp = TempDir::new().expect("Failed to create temp directory for test isolation");
        let base = temp.path().to_path_buf();

        let home = base.join("home");
        let config = base.join("config");
        let data = base.join("data");
        for dir in [&home, &config, &data] {
            std::fs::create_dir_all(dir).expect("Failed to create isolated test dir");
        }

        let vars_to_clear: Vec<String> = env::vars()
            .map(|(k, _)| k)
            .filter(|k| k.starts_with("NETQUOTA_"))
            .collect();
        for var in vars_to_clear {
            env::remove_var(&var);
        }

        env::set_var("HOME", &home);
        env::set_var("XDG_CONFIG_HOME", &config);
        env::set_var("XDG_DATA_HOME", &data);
        env::set_var("NO_COLOR", "1");

        temp
    });

    TestEnvGuard { _private: () }
}

/// Isolated data directory (where the default state file lives)
#[allow(dead_code)]
pub fn get_test_data_dir() -> PathBuf {
    TEMP_BASE
        .get()
        .expect("init() must be called before get_test_data_dir()")
        .path()
        .join("data")
}

/// A state store in its own temp directory. Keep the `TempDir` alive.
#[allow(dead_code)]
pub fn temp_store() -> (TempDir, StateStore) {
    let dir = TempDir::new().expect("Failed to create temp dir for state");
    let store = StateStore::new(dir.path().join("data_usage.json"));
    (dir, store)
}
