//! Reconnect backoff.
//!
//! - [`ReconnectPolicy`]: immutable configuration (initial delay, multiplier, cap)
//! - [`Backoff`]: the current delay, grown after every failed attempt and
//!   reset after every successful handshake
//!
//! No jitter: the delay sequence is deterministic so reconnect behavior can
//! be asserted exactly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default first reconnect delay in milliseconds.
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
/// Default growth factor between attempts.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
/// Default delay cap in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Reconnect backoff configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt in ms (default: 1000).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Factor applied after each failed attempt (default: 2.0).
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Upper bound on the delay in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Reconnect after an established link drops (default: true).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_initial_delay_ms() -> u64 {
    DEFAULT_INITIAL_DELAY_MS
}
fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_enabled() -> bool {
    true
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            enabled: true,
        }
    }
}

impl ReconnectPolicy {
    /// Initial delay.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms))
    }

    /// Delay cap.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Delay that follows `current`: `min(max, current * multiplier)`.
    ///
    /// Multipliers below 1.0 (or NaN) are treated as 1.0 so the delay never
    /// shrinks between failures.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn next_delay(&self, current: Duration) -> Duration {
        let factor = if self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let grown = (current.as_millis() as f64) * factor;
        let capped = grown.min(self.max_delay_ms as f64);
        Duration::from_millis(capped.round().max(0.0) as u64)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mutable delay
// ─────────────────────────────────────────────────────────────────────────────

/// Current reconnect delay.
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: ReconnectPolicy,
    current: Duration,
}

impl Backoff {
    /// Start at the policy's initial delay.
    pub fn new(policy: ReconnectPolicy) -> Self {
        let current = policy.initial_delay();
        Self { policy, current }
    }

    /// Delay to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Grow the delay for the following attempt and return the new value.
    pub fn grow(&mut self) -> Duration {
        self.current = self.policy.next_delay(self.current);
        self.current
    }

    /// Back to the initial delay (after a successful handshake).
    pub fn reset(&mut self) {
        self.current = self.policy.initial_delay();
    }

    /// The configuration this backoff follows.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &Backoff) -> u64 {
        backoff.current().as_secs()
    }

    #[test]
    fn policy_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.initial_delay(), Duration::from_secs(1));
        assert_eq!(policy.max_delay(), Duration::from_secs(30));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn policy_serde_defaults() {
        let policy: ReconnectPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, ReconnectPolicy::default());
        let policy: ReconnectPolicy = serde_json::from_str(r#"{"maxDelayMs": 5000}"#).unwrap();
        assert_eq!(policy.max_delay_ms, 5000);
        assert_eq!(policy.initial_delay_ms, 1000);
    }

    #[test]
    fn delay_sequence_doubles_then_caps() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        let mut waited = Vec::new();
        for _ in 0..8 {
            waited.push(secs(&backoff));
            let _ = backoff.grow();
        }
        assert_eq!(waited, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        for _ in 0..4 {
            let _ = backoff.grow();
        }
        assert_eq!(secs(&backoff), 16);
        backoff.reset();
        assert_eq!(secs(&backoff), 1);
    }

    #[test]
    fn fractional_multiplier() {
        let policy = ReconnectPolicy {
            initial_delay_ms: 1000,
            multiplier: 1.5,
            max_delay_ms: 10_000,
            ..ReconnectPolicy::default()
        };
        let mut backoff = Backoff::new(policy);
        assert_eq!(backoff.grow(), Duration::from_millis(1500));
        assert_eq!(backoff.grow(), Duration::from_millis(2250));
    }

    #[test]
    fn shrinking_multiplier_is_clamped() {
        let policy = ReconnectPolicy {
            initial_delay_ms: 500,
            multiplier: 0.5,
            max_delay_ms: 10_000,
            ..ReconnectPolicy::default()
        };
        let mut backoff = Backoff::new(policy);
        assert_eq!(backoff.grow(), Duration::from_millis(500));
    }

    #[test]
    fn initial_above_max_is_capped() {
        let policy = ReconnectPolicy {
            initial_delay_ms: 60_000,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            ..ReconnectPolicy::default()
        };
        assert_eq!(Backoff::new(policy).current(), Duration::from_secs(30));
    }

    #[test]
    fn grow_never_overflows() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        for _ in 0..200 {
            let _ = backoff.grow();
        }
        assert_eq!(backoff.current(), Duration::from_secs(30));
    }
}
