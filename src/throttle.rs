//! Pacing and backoff policies
//!
//! All deliberate waiting in the orchestration goes through here: the
//! pacing between registration calls, the settle pause before the transfer
//! phase, and the backoff applied to retryable poll failures.

use crate::config::ThrottleConfig;

use rand::Rng;
use std::time::Duration;

/// Configured pacing policy
#[derive(Clone)]
pub struct Throttle {
    config: ThrottleConfig,
}

impl Throttle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self { config }
    }

    /// Pause between per-chain registration calls
    pub async fn registration_pause(&self) {
        pause_ms(self.config.registration_delay_ms).await;
    }

    /// Pause after the registration fan-out, before the transfer phase
    pub async fn settle_pause(&self) {
        pause_ms(self.config.settle_delay_ms).await;
    }

    /// Backoff delay for the given retry attempt (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self.config.backoff_base_ms, self.config.backoff_max_ms)
    }
}

async fn pause_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Calculate exponential backoff delay with jitter (0 to 10% of the delay)
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);
        assert!(b1.as_millis() <= 110);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000);
        assert!(max.as_millis() <= 1100);
    }

    #[test]
    fn test_zero_attempt_has_no_delay() {
        assert_eq!(calculate_backoff(0, 100, 1000), Duration::from_millis(0));
    }

    #[tokio::test]
    async fn test_zero_pauses_return_immediately() {
        let throttle = Throttle::new(ThrottleConfig {
            registration_delay_ms: 0,
            settle_delay_ms: 0,
            backoff_base_ms: 100,
            backoff_max_ms: 1000,
        });
        // Must not hang
        throttle.registration_pause().await;
        throttle.settle_pause().await;
    }
}
