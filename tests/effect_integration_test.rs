//! Integration tests for effect composition, bracket, fork and schedules
//!
//! These run effects through the public entry points (`Runtime::execute`,
//! `Effect::execute`) rather than against hand-built environments.

mod common;

use common::{boom, test_runtime, CountingPool};
use effio::prelude::*;
use effio::{ErrorCode, RuntimeConfig, ScheduleConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Bracket
// ============================================================================

#[test]
fn test_bracket_returns_counter_to_baseline_when_use_fails() {
    let runtime = test_runtime();
    let pool = CountingPool::new();
    let baseline = pool.live();

    let effect = pool
        .acquire()
        .bracket(|_| Effect::<String>::fail(boom()), pool.release());

    let err = runtime.execute(&effect).unwrap_err();
    assert_eq!(err, boom());
    assert_eq!(pool.live(), baseline);
}

#[test]
fn test_bracket_returns_counter_to_baseline_when_use_is_cancelled() {
    let runtime = test_runtime();
    let pool = CountingPool::new();

    let effect = pool.acquire().bracket(
        |_| {
            Effect::lift_sync(|env: &Environment| {
                env.cancel();
                Ok(())
            })
            .bind(|_| Effect::sleep(Duration::from_secs(30)))
        },
        pool.release(),
    );

    let err = runtime.execute(&effect).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(pool.live(), 0);
}

#[test]
fn test_nested_brackets_release_in_reverse_order() {
    let runtime = test_runtime();
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let record = {
        let order = order.clone();
        move |label: &'static str| {
            let order = order.clone();
            move |_: &'static str| {
                let order = order.clone();
                Effect::sync(move || order.lock().unwrap().push(label))
            }
        }
    };

    let effect = Effect::pure("outer").bracket(
        {
            let record = record.clone();
            move |_| Effect::pure("inner").bracket(|_| Effect::pure(1), record("inner"))
        },
        record("outer"),
    );

    assert_eq!(runtime.execute(&effect).unwrap(), 1);
    assert_eq!(*order.lock().unwrap(), vec!["inner", "outer"]);
}

// ============================================================================
// Fork
// ============================================================================

#[test]
fn test_fork_and_join_on_runtime() {
    let runtime = test_runtime();

    let effect = Effect::sleep(Duration::from_millis(10))
        .map(|_| 21)
        .fork(None)
        .bind(|fiber| fiber.join())
        .map(|n| n * 2);

    assert_eq!(runtime.execute(&effect).unwrap(), 42);
}

#[test]
fn test_cancelled_fiber_joins_with_cancellation() {
    let runtime = test_runtime();

    let effect = Effect::sleep(Duration::from_secs(30))
        .fork(None)
        .bind(|fiber| {
            let joined = fiber.clone();
            fiber
                .cancel()
                .bind({
                    let fiber = fiber.clone();
                    move |_| fiber.cancel()
                })
                .bind(move |_| joined.join())
        });

    let err = runtime.execute(&effect).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.code(), ErrorCode::CANCELLED_FIBER);
}

#[test]
fn test_join_times_out_with_configured_timeout() {
    let config = RuntimeConfig::default()
        .with_worker_threads(2)
        .with_fork_timeout(Duration::from_millis(20));
    let runtime = effio::Runtime::new(config).unwrap();

    let effect = Effect::sleep(Duration::from_secs(30))
        .fork(None)
        .bind(|fiber| {
            let cleanup = fiber.clone();
            fiber
                .join()
                .catch(|e| e.is_timeout(), move |timeout| {
                    cleanup.cancel().bind(move |_| Effect::fail(timeout.clone()))
                })
        });

    let err = runtime.execute(&effect).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.code(), ErrorCode::TIMEOUT_FIBER_AWAIT);
}

#[test]
fn test_many_fibers_join_independently() {
    let runtime = test_runtime();

    let fibers = Effect::sequence((0..16).map(|n| {
        Effect::sleep(Duration::from_millis(16 - n as u64))
            .map(move |_| n)
            .fork(None)
    }));
    let effect = fibers.bind(|handles| Effect::sequence(handles.iter().map(|h| h.join())));

    assert_eq!(runtime.execute(&effect).unwrap(), (0..16).collect::<Vec<_>>());
}

// ============================================================================
// Repeat and retry
// ============================================================================

#[test]
fn test_repeat_until_recurs_three_runs_four_times() {
    let runtime = test_runtime();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    let effect = Effect::sync(move || counter.fetch_add(1, Ordering::SeqCst) + 1)
        .repeat_until(Schedule::recurs(3), |_| false);

    assert_eq!(runtime.execute(&effect).unwrap(), 4);
    assert_eq!(runs.load(Ordering::SeqCst), 4);
}

#[test]
fn test_retry_until_recurs_two_attempts_three_times() {
    let runtime = test_runtime();
    let attempts = Arc::new(AtomicUsize::new(0));

    let counter = attempts.clone();
    let effect = Effect::<()>::lift_sync(move |_| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Err(EffectError::failure(format!("attempt {}", attempt)))
    })
    .retry_until(Schedule::recurs(2), |_| true);

    let err = runtime.execute(&effect).unwrap_err();
    assert_eq!(err.message(), "attempt 3");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn test_retry_policy_loaded_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("effio.toml");
    std::fs::write(
        &path,
        r#"
worker_threads = 2

[retry]
attempts = 4
backoff = "fibonacci"
initial_delay = "1ms"
max_delay = "5ms"
"#,
    )
    .unwrap();

    let config = RuntimeConfig::load(&path).unwrap();
    assert_eq!(config.retry.as_ref().map(|r| r.attempts), Some(4));
    let runtime = effio::Runtime::new(config).unwrap();

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let effect = Effect::lift_sync(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 3 {
            Err(boom())
        } else {
            Ok("recovered")
        }
    })
    .retry_configured();

    assert_eq!(runtime.execute(&effect).unwrap(), "recovered");
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[test]
fn test_schedule_config_budget_stops_retrying() {
    let runtime = test_runtime();
    let policy = ScheduleConfig {
        attempts: 1000,
        initial_delay: Duration::from_millis(5),
        retry_budget: Some(Duration::from_millis(30)),
        ..ScheduleConfig::default()
    };

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let effect = Effect::<()>::lift_sync(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(boom())
    })
    .retry(policy.to_schedule());

    assert!(runtime.execute(&effect).is_err());
    let attempts = attempts.load(Ordering::SeqCst);
    assert!(attempts > 1 && attempts < 1000, "attempts = {}", attempts);
}

// ============================================================================
// Resources and top-level execution
// ============================================================================

#[test]
fn test_execute_releases_unreleased_resources() {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();

    let effect = Effect::pure("connection")
        .acquire_resource(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .map(|acquired| acquired.value().len());

    assert_eq!(effect.execute().unwrap(), "connection".len());
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_release_failure_is_reported_after_success() {
    let effect = Effect::pure(1)
        .acquire_resource(|_| Err(EffectError::failure("disposal failed")))
        .map(|acquired| *acquired.value());

    let err = effect.execute().unwrap_err();
    assert_eq!(err.message(), "disposal failed");
}

#[test]
fn test_error_crosses_host_boundary_losslessly() {
    let original = EffectError::failure("inner").with_context("loading");
    let host = original.to_exception();
    let back = EffectError::from_host(host);

    assert_eq!(back, original);

    let wrapped = Effect::<()>::try_sync(|| {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
    })
    .execute()
    .unwrap_err();
    assert!(wrapped.downcast_ref::<std::io::Error>().is_some());
}
