//! Bounded exponential backoff for operations with a known class of
//! transient failure.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Fractional milliseconds in config (`"base_delay_ms": 0.5`).
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            factor: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, factor: u32) -> Self {
        Self {
            max_retries,
            base_delay,
            factor,
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Sleep before retry number `attempt` (1-based): `base * factor^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(multiplier)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if delay.subsec_nanos() % 1_000_000 == 0 {
            serializer.serialize_u64(delay.as_secs() * 1_000 + u64::from(delay.subsec_millis()))
        } else {
            serializer.serialize_f64(delay.as_secs_f64() * 1_000.0)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(ms / 1_000.0)
            .map_err(|_| de::Error::custom(format!("invalid delay of {ms} ms")))
    }
}

/// Run `operation` until it succeeds, fails with an error `is_transient`
/// rejects, or the policy's retries are spent. The last error is returned.
///
/// The backoff sleep only suspends the calling future.
pub async fn with_retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_transient: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !is_transient(&e) => return Err(e),
            Err(e) if attempt > policy.max_retries => {
                warn!(attempts = attempt, error = %e, "retries exhausted");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                debug!(attempt, ?delay, error = %e, "transient failure, backing off");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
