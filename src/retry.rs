//! Bounded polling against eventually-consistent reads.
//!
//! The store's query endpoint lags behind writes, so the one-time bootstrap
//! needs a wait-and-recheck loop before the bulk seeding queries can be
//! trusted. Expressed as a reusable primitive rather than a one-off sleep.

use std::time::Duration;

/// Fixed-delay retry policy: up to `max_attempts` tries of the condition,
/// sleeping `delay` between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            delay: Duration::from_secs(20),
        }
    }
}

/// Poll `op` until it reports readiness.
///
/// `op` returns `Ok(Some(value))` when the condition holds, `Ok(None)` when
/// it should be retried, and `Err` for a hard failure that aborts the loop
/// immediately. Returns `Ok(None)` when all attempts are exhausted; the
/// caller decides whether that is fatal.
pub fn poll<T, E>(
    policy: RetryPolicy,
    mut op: impl FnMut() -> Result<Option<T>, E>,
) -> Result<Option<T>, E> {
    for attempt in 1..=policy.max_attempts {
        if let Some(value) = op()? {
            return Ok(Some(value));
        }
        tracing::debug!(attempt, max = policy.max_attempts, "condition not met, waiting");
        if attempt < policy.max_attempts {
            std::thread::sleep(policy.delay);
        }
    }
    Ok(None)
}
