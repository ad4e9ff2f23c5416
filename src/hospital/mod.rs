//! Hospital scheduling domain.
//!
//! - `model`: records, appointment statuses and input parsing
//! - `tables`: the relational schema and row lookups
//! - `admin`: registration of departments, doctors, patients and slots
//! - `booking`: the booking coordinator
//! - `lifecycle`: moving elapsed appointments to PAST
//! - `reports`: read-only listings

use std::thread;

use crate::{config::RetryPolicy, error::Result, sql::engine::Engine};

pub mod admin;
pub mod booking;
pub mod lifecycle;
pub mod model;
pub mod reports;
pub mod tables;

pub use admin::Registry;
pub use booking::{BookingCoordinator, BookingOutcome};
pub use lifecycle::{ExpiryReport, Lifecycle};
pub use reports::Reports;

/// All hospital services over one shared engine
pub struct Hospital<E: Engine> {
    pub registry: Registry<E>,
    pub coordinator: BookingCoordinator<E>,
    pub lifecycle: Lifecycle<E>,
    pub reports: Reports<E>,
}

impl<E: Engine> Hospital<E> {
    /// Creates any missing tables and wires up the services
    pub fn open(engine: E, retry: RetryPolicy) -> Result<Self> {
        tables::bootstrap(&engine)?;
        Ok(Self {
            registry: Registry::new(engine.clone(), retry),
            coordinator: BookingCoordinator::new(engine.clone(), retry),
            lifecycle: Lifecycle::new(engine.clone(), retry),
            reports: Reports::new(engine),
        })
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. Each call of `op` must run one complete
/// transaction.
pub(crate) fn with_retry<T, F>(policy: RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < policy.max_attempts() => {
                let delay = policy.delay(attempt);
                tracing::warn!(operation, attempt, ?delay, "transaction conflict, retrying");
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(operation, attempts = attempt, "giving up after repeated conflicts");
                return Err(err);
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::with_retry;
    use crate::{
        config::RetryPolicy,
        error::{Error, Result},
    };

    #[test]
    fn test_retry_until_success() -> Result<()> {
        let policy = RetryPolicy::new(3, Duration::ZERO)?;
        let mut calls = 0;
        let value = with_retry(policy, "test", || {
            calls += 1;
            if calls < 3 { Err(Error::TransactionConflict) } else { Ok(calls) }
        })?;
        assert_eq!(value, 3);
        Ok(())
    }

    #[test]
    fn test_retry_is_bounded() -> Result<()> {
        let policy = RetryPolicy::new(2, Duration::ZERO)?;
        let mut calls = 0;
        let result: Result<()> = with_retry(policy, "test", || {
            calls += 1;
            Err(Error::TransactionConflict)
        });
        assert_eq!(result, Err(Error::TransactionConflict));
        assert_eq!(calls, 2);
        Ok(())
    }

    #[test]
    fn test_other_errors_are_not_retried() -> Result<()> {
        let mut calls = 0;
        let result: Result<()> = with_retry(RetryPolicy::default(), "test", || {
            calls += 1;
            Err(Error::Validation("bad".into()))
        });
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(calls, 1);
        Ok(())
    }
}
