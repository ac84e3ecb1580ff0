//! Declarative delay sequences driving repeat and retry
//!
//! A [`Schedule`] describes a lazy, possibly infinite sequence of delays. The
//! sequence is only materialised when [`Schedule::iter`] is called, once per
//! repeat/retry loop, so a schedule value can be shared and reused freely.
//!
//! Each yielded delay grants one more iteration. An exhausted sequence means
//! "stop": `recurs(3)` yields three delays and therefore allows three
//! iterations after the first run.
//!
//! ```
//! use effio::schedule::Schedule;
//! use std::time::Duration;
//!
//! // Exponential backoff from 10ms, at most 5 retries, never waiting more than 1s
//! let policy = Schedule::exponential(Duration::from_millis(10), 2.0)
//!     .max_delay(Duration::from_secs(1))
//!     & Schedule::recurs(5);
//! # let _ = policy;
//! ```

pub mod config;

pub use config::{BackoffStrategy, ScheduleConfig};

use crate::runtime::Clock;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Iterator over the delays of a running schedule
pub type ScheduleIter = Box<dyn Iterator<Item = Duration> + Send>;

/// Recursive description of a delay sequence
#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    /// Unlimited iterations with no delay
    Forever,
    /// No further iterations
    Never,
    /// Exactly `n` iterations with no delay
    Recurs(usize),
    /// Unlimited iterations separated by a fixed interval
    Spaced(Duration),
    /// `base`, `base * factor`, `base * factor^2`, ...
    Exponential { base: Duration, factor: f64 },
    /// `initial`, `initial + increment`, `initial + 2 * increment`, ...
    Linear { initial: Duration, increment: Duration },
    /// `base`, `base`, `2 * base`, `3 * base`, `5 * base`, ...
    Fibonacci(Duration),
    /// An explicit finite list of delays
    FromDelays(Vec<Duration>),
    /// Continues while either side continues, taking the smaller delay
    Union(Box<Schedule>, Box<Schedule>),
    /// Continues while both sides continue, taking the larger delay
    Intersect(Box<Schedule>, Box<Schedule>),
    /// Zero-delay iterations while less than the duration has elapsed on the clock
    UpTo(Duration),
    /// Caps every delay of the inner schedule
    MaxDelay(Box<Schedule>, Duration),
    /// Randomises every delay of the inner schedule by up to `factor / 2` either way
    Jittered(Box<Schedule>, f64),
}

impl Schedule {
    pub fn forever() -> Self {
        Self::Forever
    }

    pub fn never() -> Self {
        Self::Never
    }

    pub fn recurs(times: usize) -> Self {
        Self::Recurs(times)
    }

    pub fn spaced(interval: Duration) -> Self {
        Self::Spaced(interval)
    }

    pub fn exponential(base: Duration, factor: f64) -> Self {
        Self::Exponential { base, factor }
    }

    pub fn linear(base: Duration) -> Self {
        Self::Linear {
            initial: base,
            increment: base,
        }
    }

    pub fn fibonacci(base: Duration) -> Self {
        Self::Fibonacci(base)
    }

    pub fn from_delays(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self::FromDelays(delays.into_iter().collect())
    }

    pub fn up_to(limit: Duration) -> Self {
        Self::UpTo(limit)
    }

    pub fn union(self, other: Schedule) -> Self {
        Self::Union(Box::new(self), Box::new(other))
    }

    pub fn intersect(self, other: Schedule) -> Self {
        Self::Intersect(Box::new(self), Box::new(other))
    }

    pub fn max_delay(self, cap: Duration) -> Self {
        Self::MaxDelay(Box::new(self), cap)
    }

    /// Jitter factor is clamped to `0.0..=1.0`
    pub fn jittered(self, factor: f64) -> Self {
        Self::Jittered(Box::new(self), factor.clamp(0.0, 1.0))
    }

    /// Start a fresh run of this schedule against `clock`
    pub fn iter(&self, clock: Arc<dyn Clock>) -> ScheduleIter {
        match self {
            Self::Forever => Box::new(std::iter::repeat(Duration::ZERO)),
            Self::Never => Box::new(std::iter::empty()),
            Self::Recurs(times) => Box::new(std::iter::repeat(Duration::ZERO).take(*times)),
            Self::Spaced(interval) => Box::new(std::iter::repeat(*interval)),
            Self::Exponential { base, factor } => {
                let factor = *factor;
                Box::new(
                    std::iter::successors(Some(base.as_secs_f64()), move |secs| {
                        Some(secs * factor)
                    })
                    .map(secs_to_duration),
                )
            }
            Self::Linear { initial, increment } => {
                let (initial, increment) = (*initial, *increment);
                Box::new(
                    (0u32..).map(move |step| initial.saturating_add(increment.saturating_mul(step))),
                )
            }
            Self::Fibonacci(base) => Box::new(
                std::iter::successors(Some((*base, *base)), |(current, next)| {
                    Some((*next, current.saturating_add(*next)))
                })
                .map(|(current, _)| current),
            ),
            Self::FromDelays(delays) => Box::new(delays.clone().into_iter()),
            Self::Union(lhs, rhs) => {
                let mut lhs = lhs.iter(clock.clone()).fuse();
                let mut rhs = rhs.iter(clock).fuse();
                Box::new(std::iter::from_fn(move || match (lhs.next(), rhs.next()) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (Some(d), None) | (None, Some(d)) => Some(d),
                    (None, None) => None,
                }))
            }
            Self::Intersect(lhs, rhs) => Box::new(
                lhs.iter(clock.clone())
                    .zip(rhs.iter(clock))
                    .map(|(a, b)| a.max(b)),
            ),
            Self::UpTo(limit) => {
                let limit = *limit;
                let start = clock.now();
                Box::new(
                    std::iter::repeat(Duration::ZERO)
                        .take_while(move |_| clock.now().saturating_duration_since(start) < limit),
                )
            }
            Self::MaxDelay(inner, cap) => {
                let cap = *cap;
                Box::new(inner.iter(clock).map(move |delay| delay.min(cap)))
            }
            Self::Jittered(inner, factor) => {
                let factor = *factor;
                Box::new(inner.iter(clock).map(move |delay| apply_jitter(delay, factor)))
            }
        }
    }
}

impl std::ops::BitOr for Schedule {
    type Output = Schedule;

    fn bitor(self, rhs: Schedule) -> Schedule {
        self.union(rhs)
    }
}

impl std::ops::BitAnd for Schedule {
    type Output = Schedule;

    fn bitand(self, rhs: Schedule) -> Schedule {
        self.intersect(rhs)
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn apply_jitter(delay: Duration, factor: f64) -> Duration {
    if factor <= 0.0 || delay.is_zero() {
        return delay;
    }
    let mut rng = rand::rng();
    let jitter_range = delay.as_secs_f64() * factor;
    let jitter = rng.random_range(-jitter_range / 2.0..=jitter_range / 2.0);
    secs_to_duration((delay.as_secs_f64() + jitter).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::VirtualClock;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn take(schedule: &Schedule, n: usize) -> Vec<Duration> {
        schedule.iter(Arc::new(VirtualClock::new())).take(n).collect()
    }

    #[test]
    fn test_recurs_yields_n_zero_delays() {
        assert_eq!(take(&Schedule::recurs(3), 10), vec![Duration::ZERO; 3]);
        assert!(take(&Schedule::never(), 10).is_empty());
        assert_eq!(take(&Schedule::forever(), 4).len(), 4);
    }

    #[test]
    fn test_exponential_growth() {
        let schedule = Schedule::exponential(ms(10), 2.0);
        assert_eq!(take(&schedule, 4), vec![ms(10), ms(20), ms(40), ms(80)]);
    }

    #[test]
    fn test_exponential_saturates_instead_of_panicking() {
        let schedule = Schedule::exponential(Duration::from_secs(1), 1e300);
        let delays = take(&schedule, 3);
        assert_eq!(delays[2], Duration::MAX);
    }

    #[test]
    fn test_linear_and_fibonacci() {
        assert_eq!(take(&Schedule::linear(ms(5)), 3), vec![ms(5), ms(10), ms(15)]);
        assert_eq!(
            take(&Schedule::fibonacci(ms(1)), 6),
            vec![ms(1), ms(1), ms(2), ms(3), ms(5), ms(8)]
        );
    }

    #[test]
    fn test_union_takes_smaller_delay_and_longer_run() {
        let schedule = Schedule::from_delays([ms(50), ms(5)]) | Schedule::spaced(ms(20)).intersect(Schedule::recurs(3));
        assert_eq!(take(&schedule, 10), vec![ms(20), ms(5), ms(20)]);
    }

    #[test]
    fn test_intersect_takes_larger_delay_and_shorter_run() {
        let schedule = Schedule::spaced(ms(10)) & Schedule::from_delays([ms(5), ms(30)]);
        assert_eq!(take(&schedule, 10), vec![ms(10), ms(30)]);
    }

    #[test]
    fn test_up_to_follows_clock() {
        let clock = VirtualClock::new();
        let mut delays = Schedule::up_to(ms(100)).iter(Arc::new(clock.clone()));

        assert_eq!(delays.next(), Some(Duration::ZERO));
        clock.advance(ms(60));
        assert_eq!(delays.next(), Some(Duration::ZERO));
        clock.advance(ms(60));
        assert_eq!(delays.next(), None);
    }

    #[test]
    fn test_max_delay_caps() {
        let schedule = Schedule::exponential(ms(10), 10.0).max_delay(ms(500));
        assert_eq!(take(&schedule, 4), vec![ms(10), ms(100), ms(500), ms(500)]);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let schedule = Schedule::spaced(ms(100)).jittered(0.5);
        for delay in take(&schedule, 50) {
            assert!(delay >= ms(75) && delay <= ms(125), "{delay:?}");
        }
    }

    #[test]
    fn test_schedule_is_reusable() {
        let schedule = Schedule::recurs(2);
        assert_eq!(take(&schedule, 5).len(), 2);
        assert_eq!(take(&schedule, 5).len(), 2);
    }
}
