use relay_common::config::RetryConfig;
use std::time::Duration;

/// Delay between retries on the same node.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// `initial * multiplier^(retry-1)`, capped at `max`.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (1-indexed).
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let exponent = retry.saturating_sub(1) as i32;
                let millis = initial.as_millis() as f64 * multiplier.powi(exponent);
                let cap = max.as_millis() as f64;
                if millis.is_nan() || millis < 0.0 {
                    Duration::ZERO
                } else if millis > cap {
                    *max
                } else {
                    Duration::from_millis(millis as u64)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionPolicy {
    pub attempts: u32,
    pub backoff: Backoff,
}

/// Retry budget per node position, plus per-attempt and overall limits.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Position 0, the presumed master.
    pub first: PositionPolicy,
    /// Every later position.
    pub rest: PositionPolicy,
    pub attempt_timeout: Duration,
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        let backoff = match config.backoff_multiplier {
            Some(multiplier) => Backoff::Exponential {
                initial: Duration::from_millis(config.delay_ms),
                multiplier,
                max: Duration::from_millis(config.max_delay_ms),
            },
            None => Backoff::Fixed(Duration::from_millis(config.delay_ms)),
        };
        Self {
            first: PositionPolicy {
                attempts: config.master_attempts.max(1),
                backoff: backoff.clone(),
            },
            rest: PositionPolicy {
                attempts: config.other_attempts.max(1),
                backoff,
            },
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            deadline: config.deadline_ms.map(Duration::from_millis),
        }
    }

    /// Same budgets with a longer per-attempt timeout, for command
    /// execution and uploads.
    pub fn long_running(config: &RetryConfig) -> Self {
        Self {
            attempt_timeout: Duration::from_millis(config.long_attempt_timeout_ms),
            ..Self::from_config(config)
        }
    }

    pub fn for_position(&self, position: usize) -> &PositionPolicy {
        if position == 0 {
            &self.first
        } else {
            &self.rest
        }
    }
}
