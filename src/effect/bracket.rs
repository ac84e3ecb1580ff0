//! Acquire/use/release and registry-tracked resources

use super::{settle, Effect, Value};
use crate::error::{EffectError, Result};
use crate::runtime::{Environment, ResourceId};
use futures::FutureExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A value whose disposal is tracked by the environment's resource registry
#[derive(Debug, Clone)]
pub struct Acquired<R> {
    id: ResourceId,
    value: R,
}

impl<R> Acquired<R> {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn value(&self) -> &R {
        &self.value
    }

    pub fn into_value(self) -> R {
        self.value
    }
}

/// Release that has not run yet
///
/// Running it consumes it. If the owning future is dropped first (an outer
/// race lost, a fiber abandoned) the release is dispatched to the executor
/// instead, so it still runs once.
struct PendingRelease {
    pending: Option<(Effect<()>, Environment)>,
}

impl PendingRelease {
    fn new(release: Effect<()>, env: Environment) -> Self {
        Self {
            pending: Some((release, env)),
        }
    }

    async fn run(&mut self) -> Result<()> {
        match self.pending.take() {
            Some((release, env)) => release.run_async(&env).await,
            None => Ok(()),
        }
    }
}

impl Drop for PendingRelease {
    fn drop(&mut self) {
        if let Some((release, env)) = self.pending.take() {
            debug!("Bracket abandoned before release, releasing in background");
            let future = release.run_async(&env);
            env.executor().spawn(
                async move {
                    if let Err(e) = future.await {
                        warn!(error = %e, "Background release failed");
                    }
                }
                .boxed(),
            );
        }
    }
}

impl<R: Value> Effect<R> {
    /// Use the acquired value, then release it exactly once
    ///
    /// `self` is the acquisition. Acquisition and release run detached from
    /// the environment's cancellation; `use_fn` runs in the environment and
    /// may be cancelled. When both use and release fail, the error is an
    /// aggregate of the two.
    pub fn bracket<B, U, F>(self, use_fn: U, release: F) -> Effect<B>
    where
        B: Value,
        U: Fn(R) -> Effect<B> + Send + Sync + 'static,
        F: Fn(R) -> Effect<()> + Send + Sync + 'static,
    {
        self.bracket_with(use_fn, Effect::Fail, release)
    }

    /// [`Effect::bracket`] with a handler for use failures
    ///
    /// `catch_fn` sees every use failure except cancellation, before release runs.
    pub fn bracket_with<B, U, C, F>(self, use_fn: U, catch_fn: C, release: F) -> Effect<B>
    where
        B: Value,
        U: Fn(R) -> Effect<B> + Send + Sync + 'static,
        C: Fn(EffectError) -> Effect<B> + Send + Sync + 'static,
        F: Fn(R) -> Effect<()> + Send + Sync + 'static,
    {
        if let Self::Fail(error) = self {
            return Effect::Fail(error);
        }
        let use_fn = Arc::new(use_fn);
        let catch_fn = Arc::new(catch_fn);
        let release = Arc::new(release);

        Effect::suspend(move |env| {
            let acquire = self.run_async(&env.uncancellable());
            let use_fn = use_fn.clone();
            let catch_fn = catch_fn.clone();
            let release = release.clone();
            async move {
                let resource = acquire.await?;
                let mut pending = PendingRelease::new(release(resource.clone()), env.uncancellable());

                let outcome = match use_fn(resource).run_async(&env).await {
                    Err(error) if !error.is_cancelled() => catch_fn(error).run_async(&env).await,
                    other => other,
                };
                let released = pending.run().await;
                settle(outcome, released)
            }
        })
    }

    /// Register the produced value with the environment's resource registry
    ///
    /// `release` runs when the returned handle is released, or at the latest
    /// when the top-level run releases everything it acquired.
    pub fn acquire_resource<F>(self, release: F) -> Effect<Acquired<R>>
    where
        F: Fn(&R) -> Result<()> + Send + Sync + 'static,
    {
        let release = Arc::new(release);
        self.bind(move |value| {
            let release = release.clone();
            Effect::lift_sync(move |env| {
                let release = release.clone();
                let tracked = value.clone();
                let id = env
                    .resources()
                    .acquire(Arc::new(move || -> Result<()> { release(&tracked) }));
                Ok(Acquired {
                    id,
                    value: value.clone(),
                })
            })
        })
    }

    /// Run in a child cancellation scope
    ///
    /// Cancelling from inside (via [`Environment::cancel`]) stops this effect
    /// without cancelling the caller.
    pub fn local_cancel(self) -> Self {
        Effect::suspend(move |env| self.run_async(&env.local_cancel()))
    }
}

impl Effect<()> {
    /// Dispose a registered resource now
    ///
    /// Releasing twice is a no-op. In a cancelled environment this fails with
    /// `Cancelled` and the resource is left for the final `release_all`.
    pub fn release_resource(id: ResourceId) -> Self {
        Effect::suspend(move |env| {
            let released = env.resources().release(id);
            futures::future::ready(released)
        })
    }
}
