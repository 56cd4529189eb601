//! Exponential backoff with jitter

use std::time::{Duration, SystemTime};

use rand::Rng;

/// When to try again after the `attempt`th failure (1-indexed), counted
/// from `from`.
///
/// `delay = min(base * 2^(attempt - 1), max_delay) * (1 ± jitter)`
pub fn calculate_next_retry_time(
    attempt: u32,
    base_delay_secs: u64,
    max_delay_secs: u64,
    jitter_factor: f64,
    from: SystemTime,
) -> SystemTime {
    let exponent = attempt.saturating_sub(1);
    let delay = if exponent >= 63 {
        max_delay_secs
    } else {
        base_delay_secs
            .saturating_mul(1u64 << exponent)
            .min(max_delay_secs)
    };

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let jittered_delay = {
        let jitter_range = (delay as f64) * jitter_factor.clamp(0.0, 1.0);
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        ((delay as f64) + jitter).max(0.0) as u64
    };

    from + Duration::from_secs(jittered_delay)
}
