//! # netquota
//!
//! Tracks cumulative network data usage against a monthly quota, surviving
//! restarts and interface instability.
//!
//! ## Features
//!
//! - **Usage accounting**: OS byte counters become a durable, monotonic
//!   "usage so far this cycle" figure
//! - **Discontinuity handling**: counter resets, interfaces vanishing and
//!   reappearing, manual corrections
//! - **Crash-safe persistence**: atomic JSON state file with forward-compatible schema
//! - **Configuration**: TOML-based tool configuration with sensible defaults
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netquota::{ConfigUpdate, StateStore, SystemCounters, UsageEngine};
//!
//! let store = StateStore::new("/tmp/data_usage.json");
//! let mut engine = UsageEngine::open(store, SystemCounters::new());
//!
//! engine.set_config(ConfigUpdate::new(50.0, 1))?;
//! // ... later, from a timer:
//! engine.commit()?;
//! println!("{} bytes used", engine.current_usage());
//! # Ok::<(), netquota::QuotaError>(())
//! ```

pub mod common;
/// Configuration management module for loading and saving settings
pub mod config;
pub mod counters;
/// Billing cycle calendar
pub mod cycle;
pub mod display;
pub mod engine;
pub mod error;
/// Retry logic with exponential backoff for transient failures
pub mod retry;
pub mod state;
pub mod version;

pub use config::Config;
pub use counters::{CounterSnapshot, CounterSource, InterfaceSelector, ManualCounters, SystemCounters};
pub use display::{format_bytes, format_report, UsageReport};
pub use engine::{ConfigUpdate, UsageEngine};
pub use error::{QuotaError, Result};
pub use state::{StateStore, UsageState};
pub use version::{short_version, version_string};
