//! Common test utilities and helpers

#![allow(dead_code)]

use effio::{Effect, EffectError, Runtime, RuntimeConfig, Source};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Runtime with a small worker pool for blocking-style tests
pub fn test_runtime() -> Runtime {
    Runtime::new(RuntimeConfig::default().with_worker_threads(2)).expect("runtime should build")
}

/// A source that yields `value` once, after `delay`
pub fn delayed_source<A: effio::Value>(value: A, delay: Duration) -> Source<A> {
    Source::from_effect(Effect::sleep(delay).map(move |_| value.clone()))
}

/// Shared counter standing in for an external resource pool
///
/// Acquiring increments the count, releasing decrements it; a balanced run
/// leaves it at its baseline.
#[derive(Clone, Default)]
pub struct CountingPool {
    live: Arc<AtomicI64>,
}

impl CountingPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live(&self) -> i64 {
        self.live.load(Ordering::SeqCst)
    }

    pub fn acquire(&self) -> Effect<i64> {
        let live = self.live.clone();
        Effect::sync(move || live.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn release(&self) -> impl Fn(i64) -> Effect<()> + Send + Sync + 'static {
        let live = self.live.clone();
        move |_| {
            let live = live.clone();
            Effect::sync(move || {
                live.fetch_sub(1, Ordering::SeqCst);
            })
        }
    }
}

/// Failure used where a test only cares that something went wrong
pub fn boom() -> EffectError {
    EffectError::failure("boom")
}
