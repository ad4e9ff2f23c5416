//! Runtime configuration.
//!
//! Resolved once at startup from command-line arguments (with environment
//! fallbacks handled by the binary) and then passed into the services.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{Error, Result};

/// Default number of attempts the booking coordinator makes per request
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default backoff unit between conflicting attempts
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Bounded retry policy for operations that hit a transaction conflict.
///
/// Attempt `n` (1-based) that conflicts waits `n * backoff` before the next
/// one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::Validation("max_attempts must be at least 1".into()));
        }
        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// Configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct Config {
    data_path: Option<PathBuf>,
    retry: RetryPolicy,
}

impl Config {
    /// `data_path` selects the on-disk log; `None` keeps everything in memory.
    pub fn new(data_path: Option<PathBuf>, retry: RetryPolicy) -> Result<Self> {
        if let Some(path) = &data_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Validation("data path cannot be empty".into()));
            }
            if path.is_dir() {
                return Err(Error::Validation(format!(
                    "data path {} is a directory",
                    path.display()
                )));
            }
        }
        Ok(Self { data_path, retry })
    }

    pub fn data_path(&self) -> Option<&Path> {
        self.data_path.as_deref()
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }
}
