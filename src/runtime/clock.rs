//! Clock and delay providers consumed by schedules, sleeps, and fork timeouts

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Source of the current time and of delays
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// Resolve after `duration` has elapsed on this clock
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Wall-clock time backed by tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        tokio::time::sleep(duration).boxed()
    }
}

#[derive(Debug)]
struct VirtualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

/// Deterministic clock for tests
///
/// `sleep` completes immediately, advancing virtual time by the requested
/// duration and recording it.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    origin: Instant,
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(VirtualState {
                elapsed: Duration::ZERO,
                sleeps: Vec::new(),
            })),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut VirtualState) -> R) -> R {
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Move virtual time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        self.with_state(|state| state.elapsed = state.elapsed.saturating_add(duration));
    }

    /// Total virtual time elapsed
    pub fn elapsed(&self) -> Duration {
        self.with_state(|state| state.elapsed)
    }

    /// Every delay requested through `sleep`, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.with_state(|state| state.sleeps.clone())
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    /// Virtual time saturates at the latest instant the platform can represent
    fn now(&self) -> Instant {
        let elapsed = self.elapsed();
        self.origin
            .checked_add(elapsed)
            .unwrap_or_else(|| latest_instant(self.origin, elapsed))
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.with_state(|state| {
            state.elapsed = state.elapsed.saturating_add(duration);
            state.sleeps.push(duration);
        });
        futures::future::ready(()).boxed()
    }
}

/// Greatest instant reachable from `origin` by adding at most `limit`
fn latest_instant(origin: Instant, limit: Duration) -> Instant {
    let mut at = origin;
    let mut step = limit;
    while !step.is_zero() {
        match at.checked_add(step) {
            Some(next) => at = next,
            None => step /= 2,
        }
    }
    at
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_clock_records_sleeps() {
        let clock = VirtualClock::new();
        let start = clock.now();

        futures::executor::block_on(clock.sleep(Duration::from_millis(30)));
        futures::executor::block_on(clock.sleep(Duration::from_millis(20)));

        assert_eq!(clock.sleeps(), vec![Duration::from_millis(30), Duration::from_millis(20)]);
        assert_eq!(clock.now() - start, Duration::from_millis(50));
    }

    #[test]
    fn test_virtual_clock_advance() {
        let clock = VirtualClock::new();
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_virtual_clock_saturates_on_huge_sleeps() {
        let clock = VirtualClock::new();
        let start = clock.now();

        futures::executor::block_on(clock.sleep(Duration::MAX));
        futures::executor::block_on(clock.sleep(Duration::MAX));
        clock.advance(Duration::from_secs(1));

        assert_eq!(clock.elapsed(), Duration::MAX);
        assert_eq!(clock.sleeps(), vec![Duration::MAX, Duration::MAX]);
        let late = clock.now();
        assert!(late > start);
        assert_eq!(clock.now(), late);
    }

    #[tokio::test]
    async fn test_system_clock_sleeps() {
        let clock = SystemClock;
        let start = clock.now();
        clock.sleep(Duration::from_millis(10)).await;
        assert!(clock.now() - start >= Duration::from_millis(10));
    }
}
