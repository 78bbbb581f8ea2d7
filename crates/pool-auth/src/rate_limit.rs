//! Failed-login lockout
//!
//! Best-effort abuse mitigation. State lives behind one process-wide mutex
//! that is only held for a map lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use pool_core::{Clock, PoolError, Result};

/// Tracks failures per key (phone number, IP, ...)
pub trait RateLimiter: Send + Sync {
    /// Fail with `RateLimited` while `key` is locked out
    fn check(&self, key: &str) -> Result<()>;

    fn record_failure(&self, key: &str);

    /// Forget past failures after a success
    fn reset(&self, key: &str);
}

#[derive(Debug, Default)]
struct Attempts {
    failures: u32,
    locked_until: Option<DateTime<Utc>>,
}

/// Locks a key out for a fixed window after too many failures
pub struct LockoutLimiter {
    attempts: Mutex<HashMap<String, Attempts>>,
    max_failures: u32,
    lockout: Duration,
    clock: Arc<dyn Clock>,
}

impl LockoutLimiter {
    pub fn new(max_failures: u32, lockout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            attempts: Mutex::new(HashMap::new()),
            max_failures,
            lockout,
            clock,
        }
    }
}

impl RateLimiter for LockoutLimiter {
    fn check(&self, key: &str) -> Result<()> {
        let now = self.clock.now();
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(entry) = attempts.get(key) else {
            return Ok(());
        };
        match entry.locked_until {
            Some(until) if now < until => {
                let minutes = (until - now).num_minutes() + 1;
                Err(PoolError::RateLimited(format!(
                    "Too many failed attempts. Try again in {minutes} minutes."
                )))
            }
            Some(_) => {
                attempts.remove(key);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record_failure(&self, key: &str) {
        let now = self.clock.now();
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = attempts.entry(key.to_string()).or_default();

        entry.failures += 1;
        if entry.failures >= self.max_failures {
            entry.locked_until = Some(now + self.lockout);
            warn!(failures = entry.failures, "Login locked out after repeated failures");
        }
    }

    fn reset(&self, key: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}
