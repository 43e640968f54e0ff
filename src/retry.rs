//! Retry logic module.
//!
//! State saves go through [`retry_if_retryable`] so a transient I/O hiccup
//! (antivirus scanner holding the file, NFS blip) does not fail a commit.

use crate::config;
use crate::error::{QuotaError, Result};
use log::debug;
use std::io;
use std::thread;
use std::time::Duration;

/// Exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the second attempt in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_factor: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2000,
            backoff_factor: 2.0,
        }
    }
}

impl From<&config::RetrySettings> for RetryConfig {
    fn from(settings: &config::RetrySettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_attempts.max(1),
            initial_delay_ms: settings.initial_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            backoff_factor: settings.backoff_factor,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no sleeping.
    pub fn none() -> Self {
        RetryConfig {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_factor: 1.0,
        }
    }

    fn next_delay(&self, current: u64) -> u64 {
        ((current as f32 * self.backoff_factor) as u64).min(self.max_delay_ms)
    }
}

/// Whether an error is worth another attempt.
///
/// Only I/O errors that can clear up on their own qualify; a missing
/// directory or a serialization failure will fail the same way again.
pub fn is_retryable_error(error: &QuotaError) -> bool {
    match error {
        QuotaError::Io(e) => matches!(
            e.kind(),
            io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::TimedOut
                | io::ErrorKind::PermissionDenied
                | io::ErrorKind::Other
        ),
        QuotaError::LockFailed(_) => true,
        _ => false,
    }
}

/// Retry `operation` with exponential backoff while it fails with a retryable error.
pub fn retry_if_retryable<F, T>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut current_delay = config.initial_delay_ms;
    let mut attempt = 1;

    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(e) if !is_retryable_error(&e) || attempt >= config.max_attempts => {
                return Err(e)
            }
            Err(e) => {
                debug!(
                    "Attempt {}/{} failed ({}), retrying in {}ms...",
                    attempt, config.max_attempts, e, current_delay
                );
                thread::sleep(Duration::from_millis(current_delay));
                current_delay = config.next_delay(current_delay);
                attempt += 1;
            }
        }
    }
}
