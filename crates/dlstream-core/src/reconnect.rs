//! Reconnect policies.
//!
//! A policy is a pure decision: given how many reconnects have already been
//! scheduled since the last successful open, return the delay before the next
//! one, or `None` to give up. The connection state machine only talks to the
//! [`ReconnectPolicy`] trait, so swapping fixed-interval for exponential
//! backoff never touches the machine.
//!
//! - [`FixedInterval`]: `attempt < max_attempts` → retry after `interval`
//! - [`ExponentialBackoff`]: same cap, delay `min(max_delay, base * 2^attempt)`
//!   with symmetric jitter

use std::fmt::Debug;
use std::time::Duration;

/// Default attempt cap.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default fixed interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 3000;
/// Default cap for exponential delays in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Decides whether and when to retry after a connection closes.
pub trait ReconnectPolicy: Debug + Send + Sync {
    /// Delay before reconnect number `attempt + 1`, or `None` to stop.
    ///
    /// `attempt` is zero-based: the number of reconnects already scheduled
    /// since the last successful open.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Fixed interval
// ─────────────────────────────────────────────────────────────────────────────

/// Retry after a constant interval, at most `max_attempts` times.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedInterval {
    /// Maximum reconnects before giving up.
    pub max_attempts: u32,
    /// Wait before each reconnect.
    pub interval: Duration,
}

impl FixedInterval {
    /// Create a fixed-interval policy.
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_INTERVAL_MS),
        )
    }
}

impl ReconnectPolicy for FixedInterval {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then_some(self.interval)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Exponential backoff
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff with jitter and an attempt cap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExponentialBackoff {
    /// Maximum reconnects before giving up.
    pub max_attempts: u32,
    /// Delay for the first reconnect.
    pub base: Duration,
    /// Upper bound for any single delay (before jitter).
    pub max_delay: Duration,
    /// Jitter range 0.0–1.0; 0.2 varies the delay by ±20%.
    pub jitter_factor: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base: Duration::from_millis(DEFAULT_INTERVAL_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    #[allow(clippy::cast_possible_truncation)]
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let random = if self.jitter_factor > 0.0 {
            rand::random::<f64>()
        } else {
            0.5
        };
        Some(Duration::from_millis(calculate_backoff_delay(
            attempt,
            self.base.as_millis() as u64,
            self.max_delay.as_millis() as u64,
            self.jitter_factor,
            random,
        )))
    }
}

/// Exponential backoff delay with explicit randomness.
///
/// `min(max_delay_ms, base_delay_ms * 2^attempt) * (1 + (random * 2 - 1) * jitter_factor)`
///
/// `random` should be in `[0.0, 1.0)`; `0.5` yields the un-jittered value.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_backoff_delay(
    attempt: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter_factor: f64,
    random: f64,
) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(max_delay_ms);

    let jitter = 1.0 + (random * 2.0 - 1.0) * jitter_factor.clamp(0.0, 1.0);
    ((capped as f64) * jitter).round().max(0.0) as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
