use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::RetryConfig;

/// Default jitter spread: delays are scaled by a factor in [0.75, 1.25]
const JITTER_RATIO: f64 = 0.25;

/// Delay curve across retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// initial * multiplier^(n-1), capped at max_delay_ms
    Exponential,

    /// initial + (n-1) * step, where step reuses the multiplier field as
    /// milliseconds, capped at max_delay_ms
    Linear,

    /// Always the initial delay
    Constant,

    /// initial * fib(n) with fib(1) = fib(2) = 1, capped at max_delay_ms
    Fibonacci,
}

impl BackoffStrategy {
    /// Compute the delay before the attempt following attempt `n` (1-based)
    ///
    /// Applies the configured cap, then jitter, then floors to whole
    /// milliseconds.
    pub fn delay_for_attempt(self, attempt: u32, config: &RetryConfig) -> Duration {
        let attempt = attempt.max(1);
        let initial = config.initial_delay_ms as f64;
        let cap = config.max_delay_ms as f64;

        let base = match self {
            Self::Exponential => initial * config.multiplier.powi(attempt as i32 - 1),
            Self::Linear => initial + (attempt as f64 - 1.0) * config.multiplier,
            Self::Constant => initial,
            Self::Fibonacci => initial * fibonacci(attempt),
        };

        let capped = if self == Self::Constant {
            base
        } else {
            base.min(cap)
        };

        let jittered = if config.jitter {
            apply_jitter(capped)
        } else {
            capped
        };

        Duration::from_millis(jittered.max(0.0).floor() as u64)
    }
}

/// fib(1) = fib(2) = 1, computed in f64 so large attempts saturate
/// harmlessly before the cap applies
fn fibonacci(n: u32) -> f64 {
    let (mut a, mut b) = (1.0_f64, 1.0_f64);
    for _ in 2..n {
        let next = a + b;
        a = b;
        b = next;
    }
    b
}

fn apply_jitter(delay: f64) -> f64 {
    let factor = rand::thread_rng().gen_range(1.0 - JITTER_RATIO..=1.0 + JITTER_RATIO);
    delay * factor
}
