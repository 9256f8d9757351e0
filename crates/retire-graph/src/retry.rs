//! Retry timing for throttled and transiently failing Graph requests.
//!
//! Graph answers 429 with an optional `Retry-After` header and occasionally
//! returns 502/503/504 under load. Both are retried with exponential backoff
//! and jitter; an explicit `Retry-After` wins over the computed delay.

use rand::Rng;
use std::time::Duration;

/// Configuration for request retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Base delay for exponential backoff in milliseconds (default: 1000ms).
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds (default: 120000ms = 2 minutes).
    pub max_delay_ms: u64,
    /// Jitter factor as a fraction of delay (default: 0.25 = 25%).
    pub jitter_factor: f64,
    /// Maximum retries per request (default: 5).
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 120_000,
            jitter_factor: 0.25,
            max_retries: 5,
        }
    }
}

impl RetryConfig {
    /// Creates a configuration with short delays for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            base_delay_ms: 5,
            max_delay_ms: 50,
            jitter_factor: 0.0,
            max_retries: 3,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("base_delay_ms must be > 0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err("max_delay_ms must be >= base_delay_ms".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err("jitter_factor must be in range [0.0, 1.0]".to_string());
        }
        Ok(())
    }

    /// Parses a `Retry-After` header given in seconds.
    ///
    /// The HTTP-date form is not used by Graph and is ignored.
    #[must_use]
    pub fn parse_retry_after(header_value: &str) -> Option<u64> {
        header_value.trim().parse::<u64>().ok()
    }

    /// Exponential delay `base * 2^attempt`, capped at `max_delay_ms`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Adds up to `jitter_factor` of extra delay.
    #[must_use]
    pub fn add_jitter(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as f64;
        let jitter_range = delay_ms * self.jitter_factor;
        if jitter_range <= 0.0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=jitter_range);
        Duration::from_millis((delay_ms + jitter) as u64)
    }

    /// Delay before retry number `attempt`, honouring `Retry-After`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        match retry_after_secs {
            Some(secs) => {
                let capped_ms = secs.saturating_mul(1000).min(self.max_delay_ms);
                Duration::from_millis(capped_ms)
            }
            None => self.add_jitter(self.backoff_delay(attempt)),
        }
    }
}
