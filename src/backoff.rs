use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Minimum interval between two token acquisition attempts.
///
/// Every policy is capped and never shrinks as the number of failed attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Backoff {
    Constant {
        #[serde(with = "secs")]
        interval: Duration,
    },
    Linear {
        #[serde(with = "secs")]
        initial: Duration,
        #[serde(with = "secs")]
        step: Duration,
        #[serde(with = "secs")]
        max: Duration,
    },
    Exponential {
        #[serde(with = "secs")]
        initial: Duration,
        #[serde(with = "secs")]
        max: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Constant {
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl Backoff {
    /// Interval to wait after `failed_attempts` consecutive failures.
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        if failed_attempts == 0 {
            return Duration::ZERO;
        }
        let n = failed_attempts - 1;
        match *self {
            Backoff::Constant { interval } => interval,
            Backoff::Linear { initial, step, max } => initial
                .saturating_add(step.saturating_mul(n))
                .min(max.max(initial)),
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.checked_pow(n).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max.max(initial))
            }
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
