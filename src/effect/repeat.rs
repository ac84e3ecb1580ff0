//! Schedule-driven repetition and retry

use super::{Effect, Value};
use crate::error::EffectError;
use crate::schedule::Schedule;
use std::sync::Arc;
use tracing::{debug, info, trace};

impl<A: Value> Effect<A> {
    /// Run until `predicate` holds on the result, pausing per `schedule`
    ///
    /// The effect runs once, then once more for every delay the schedule
    /// yields. When the schedule is exhausted first, the last result is
    /// returned as a success. Failures end the loop immediately.
    pub fn repeat_until<P>(self, schedule: Schedule, predicate: P) -> Self
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        if let Self::Fail(error) = self {
            return Self::Fail(error);
        }
        let predicate = Arc::new(predicate);
        Effect::suspend(move |env| {
            let effect = self.clone();
            let schedule = schedule.clone();
            let predicate = predicate.clone();
            async move {
                let mut delays = schedule.iter(env.clock().clone());
                let mut iteration = 1usize;
                loop {
                    let value = effect.run_async(&env).await?;
                    if predicate(&value) {
                        return Ok(value);
                    }
                    let Some(delay) = delays.next() else {
                        trace!(iterations = iteration, "Repeat schedule exhausted");
                        return Ok(value);
                    };
                    trace!(iteration, ?delay, "Repeating effect");
                    env.sleep(delay).await?;
                    iteration += 1;
                }
            }
        })
    }

    /// Repeat for as long as `schedule` allows, returning the last result
    pub fn repeat(self, schedule: Schedule) -> Self {
        self.repeat_until(schedule, |_| false)
    }

    /// Retry failures for which `should_retry` holds, pausing per `schedule`
    ///
    /// Each retry reruns the whole effect from scratch. Errors rejected by
    /// `should_retry`, and cancellation, propagate at once. Exhausting the
    /// schedule propagates the last failure.
    pub fn retry_until<P>(self, schedule: Schedule, should_retry: P) -> Self
    where
        P: Fn(&EffectError) -> bool + Send + Sync + 'static,
    {
        if let Self::Pure(value) = self {
            return Self::Pure(value);
        }
        let should_retry = Arc::new(should_retry);
        Effect::suspend(move |env| {
            let effect = self.clone();
            let schedule = schedule.clone();
            let should_retry = should_retry.clone();
            async move {
                let mut delays = schedule.iter(env.clock().clone());
                let mut attempt = 1usize;
                loop {
                    let error = match effect.run_async(&env).await {
                        Ok(value) => return Ok(value),
                        Err(error) => error,
                    };
                    if error.is_cancelled() || !should_retry(&error) {
                        return Err(error);
                    }
                    let Some(delay) = delays.next() else {
                        debug!(attempts = attempt, "Retry schedule exhausted");
                        return Err(error);
                    };
                    info!(
                        "Retrying effect (attempt {}) after {:?}: {}",
                        attempt + 1,
                        delay,
                        error
                    );
                    env.sleep(delay).await?;
                    attempt += 1;
                }
            }
        })
    }

    /// Retry every failure except cancellation for as long as `schedule` allows
    pub fn retry(self, schedule: Schedule) -> Self {
        self.retry_until(schedule, |_| true)
    }

    /// Retry using the environment's configured retry policy
    pub fn retry_configured(self) -> Self {
        Effect::suspend(move |env| {
            let schedule = env.config().retry_schedule();
            self.clone().retry(schedule).run_async(&env)
        })
    }
}
