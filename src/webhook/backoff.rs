//! Retry delay computation for webhook deliveries
//!
//! Exponential backoff with a cap and proportional jitter. The returned
//! delay is clamped to `MAX_RETRY_DELAY` after jitter so the scheduled time
//! survives clock skew and oversized multipliers.

use rand::Rng;
use std::time::Duration;

pub const MAX_ATTEMPTS: i32 = 10;
pub const INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);
pub const MULTIPLIER: f64 = 2.0;
pub const JITTER: f64 = 0.1;

/// Delay before the next attempt, given the attempt that just failed (1-indexed)
pub fn retry_delay(attempt_count: i32) -> Duration {
    let exponent = attempt_count.max(1) - 1;
    let base = (INITIAL_DELAY.as_secs_f64() * MULTIPLIER.powi(exponent))
        .min(MAX_RETRY_DELAY.as_secs_f64());

    let jitter = rand::thread_rng().gen_range(0.0..base * JITTER);

    Duration::from_secs_f64((base + jitter).min(MAX_RETRY_DELAY.as_secs_f64()))
}
