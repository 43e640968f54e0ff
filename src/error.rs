//! Error handling module for netquota.
//!
//! All fallible operations in the crate return [`QuotaError`] through the
//! [`Result`] alias. Load-time problems with the state file never reach this
//! type: they are recovered inside [`crate::state::StateStore::load`].

use std::io;
use thiserror::Error;

/// Unified error type for netquota.
#[derive(Error, Debug)]
pub enum QuotaError {
    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Rejected quota / reset day / offset / interface input
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Application config file errors (TOML)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another process owns the state file
    #[error("Failed to acquire lock: {0}")]
    LockFailed(String),

    /// File validation errors
    #[error("Invalid file path: {0}")]
    InvalidPath(String),
}

/// Result type alias for netquota operations
pub type Result<T> = std::result::Result<T, QuotaError>;

impl QuotaError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        QuotaError::InvalidConfiguration(msg.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        QuotaError::InvalidPath(msg.into())
    }

    /// Create a lock failure error
    pub fn lock(msg: impl Into<String>) -> Self {
        QuotaError::LockFailed(msg.into())
    }
}
