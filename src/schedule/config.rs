//! Declarative retry policy that can be loaded from configuration files

use super::Schedule;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy with a backoff strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Maximum retry attempts after the first run
    #[serde(default = "default_attempts")]
    pub attempts: usize,

    /// Backoff strategy
    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Initial delay between retries
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Add jitter to delays
    #[serde(default)]
    pub jitter: bool,

    /// Jitter factor (0.0 to 1.0)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,

    /// Maximum total time for retries
    #[serde(default, with = "humantime_serde")]
    pub retry_budget: Option<Duration>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff: BackoffStrategy::default(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            jitter: false,
            jitter_factor: default_jitter_factor(),
            retry_budget: None,
        }
    }
}

/// Backoff strategies for retry delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear increase in delay
    Linear {
        #[serde(with = "humantime_serde")]
        increment: Duration,
    },
    /// Exponential increase in delay
    Exponential {
        #[serde(default = "default_exponential_base")]
        base: f64,
    },
    /// Fibonacci sequence delays
    Fibonacci,
    /// Custom delay sequence
    Custom { delays: Vec<Duration> },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Exponential {
            base: default_exponential_base(),
        }
    }
}

impl ScheduleConfig {
    /// Build the schedule this policy describes
    pub fn to_schedule(&self) -> Schedule {
        let backoff = match &self.backoff {
            BackoffStrategy::Fixed => Schedule::spaced(self.initial_delay),
            BackoffStrategy::Linear { increment } => Schedule::Linear {
                initial: self.initial_delay,
                increment: *increment,
            },
            BackoffStrategy::Exponential { base } => {
                Schedule::exponential(self.initial_delay, *base)
            }
            BackoffStrategy::Fibonacci => Schedule::fibonacci(self.initial_delay),
            BackoffStrategy::Custom { delays } => Schedule::from_delays(delays.iter().copied()),
        };

        let mut schedule = backoff.max_delay(self.max_delay);
        if self.jitter {
            schedule = schedule.jittered(self.jitter_factor);
        }
        schedule = schedule & Schedule::recurs(self.attempts);
        if let Some(budget) = self.retry_budget {
            schedule = schedule & Schedule::up_to(budget);
        }
        schedule
    }
}

fn default_attempts() -> usize {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_jitter_factor() -> f64 {
    0.3
}

fn default_exponential_base() -> f64 {
    2.0
}
