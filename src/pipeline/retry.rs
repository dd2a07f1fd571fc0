use crate::config::ScraperConfig;
use rand::Rng;
use std::time::Duration;

/// Linear backoff with jitter: after failed attempt `k` the next attempt
/// waits `uniform(delay_min, delay_max) * k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_min: Duration,
    pub delay_max: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_min: Duration, delay_max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay_min,
            delay_max: delay_max.max(delay_min),
        }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_secs_f64(config.retry_delay_min_secs.max(0.0)),
            Duration::from_secs_f64(config.retry_delay_max_secs.max(0.0)),
        )
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Lower bound of the wait after failed attempt `k` (1-based).
    pub fn min_delay(&self, k: u32) -> Duration {
        self.delay_min * k
    }

    /// Waits between consecutive attempts; one fewer than `max_attempts`.
    pub fn delays(&self) -> std::vec::IntoIter<Duration> {
        let mut rng = rand::rng();
        (1..self.max_attempts)
            .map(|k| {
                let base = if self.delay_max > self.delay_min {
                    rng.random_range(self.delay_min..=self.delay_max)
                } else {
                    self.delay_min
                };
                base * k
            })
            .collect::<Vec<_>>()
            .into_iter()
    }
}
