//! Backoff between job state polls.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollPolicy {
    #[serde(default = "default_initial_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

fn default_initial_ms() -> u64 {
    2_000
}

fn default_max_ms() -> u64 {
    60_000
}

fn default_multiplier() -> u32 {
    2
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_ms(),
            max_interval_ms: default_max_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl PollPolicy {
    /// Fixed short interval, for tests and local rehearsal.
    pub fn immediate() -> Self {
        Self {
            initial_interval_ms: 1,
            max_interval_ms: 1,
            multiplier: 1,
        }
    }

    /// Delay before the poll following `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.multiplier.max(1)).saturating_pow(attempt);
        let ms = self
            .initial_interval_ms
            .saturating_mul(factor)
            .min(self.max_interval_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_until_cap() {
        let policy = PollPolicy {
            initial_interval_ms: 100,
            max_interval_ms: 500,
            multiplier: 2,
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(500));
        assert_eq!(policy.delay(40), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_multiplier_is_constant() {
        let policy = PollPolicy {
            initial_interval_ms: 10,
            max_interval_ms: 1_000,
            multiplier: 0,
        };
        assert_eq!(policy.delay(5), Duration::from_millis(10));
    }
}
