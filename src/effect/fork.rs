//! Background fibers with cancel and await handles

use super::{Effect, Value};
use crate::error::{common, Result};
use crate::runtime::{CancellationScope, Environment};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier of a forked fiber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberId(Uuid);

impl FiberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for FiberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fiber-{}", self.0)
    }
}

struct FiberState<A> {
    id: FiberId,
    scope: CancellationScope,
    timeout: Option<Duration>,
    outcome: watch::Sender<Option<Result<A>>>,
}

impl<A: Value> FiberState<A> {
    /// Record the terminal outcome; only the first write is kept
    fn complete(&self, outcome: Result<A>) -> bool {
        self.outcome.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(outcome);
                true
            } else {
                false
            }
        })
    }

    fn cancel(&self) {
        // Record the outcome before the fiber can observe the scope and
        // finish with its own interrupted error.
        if self.complete(Err(common::fiber_cancelled(self.id))) {
            debug!(fiber = %self.id, "Fiber cancelled");
        }
        self.scope.cancel();
    }

    fn outcome(&self) -> Option<Result<A>> {
        Option::clone(&self.outcome.borrow())
    }

    async fn wait(&self) -> Result<A> {
        let mut receiver = self.outcome.subscribe();
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => Option::clone(&outcome),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(common::fiber_lost(self.id)))
    }

    async fn join(&self, env: &Environment) -> Result<A> {
        match self.timeout {
            None => {
                tokio::select! {
                    biased;
                    _ = env.cancellation().cancelled() => Err(common::scope_cancelled()),
                    outcome = self.wait() => outcome,
                }
            }
            Some(timeout) => {
                tokio::select! {
                    biased;
                    _ = env.cancellation().cancelled() => Err(common::scope_cancelled()),
                    outcome = self.wait() => outcome,
                    _ = env.clock().sleep(timeout) => {
                        warn!(fiber = %self.id, ?timeout, "Await timed out; fiber is still running");
                        Err(common::await_timeout(self.id, timeout))
                    }
                }
            }
        }
    }
}

/// Marks a fiber lost if its task is dropped before finishing
struct Completion<A: Value> {
    state: Arc<FiberState<A>>,
    finished: bool,
}

impl<A: Value> Completion<A> {
    fn finish(mut self, outcome: Result<A>) {
        self.finished = true;
        if let Err(e) = &outcome {
            debug!(fiber = %self.state.id, error = %e, "Fiber failed");
        }
        self.state.complete(outcome);
    }
}

impl<A: Value> Drop for Completion<A> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.complete(Err(common::fiber_lost(self.state.id)));
        }
    }
}

/// Handle to a forked fiber
///
/// Behaves as a single-assignment future: once a terminal outcome is
/// recorded, every [`ForkHandle::join`] observes the same outcome. Clones
/// refer to the same fiber.
pub struct ForkHandle<A> {
    state: Arc<FiberState<A>>,
}

impl<A> Clone for ForkHandle<A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<A: Value> ForkHandle<A> {
    fn spawn(effect: &Effect<A>, env: &Environment, timeout: Option<Duration>) -> Self {
        let fiber_env = env.local_cancel();
        let (outcome, _) = watch::channel(None);
        let state = Arc::new(FiberState {
            id: FiberId::new(),
            scope: fiber_env.cancellation().clone(),
            timeout: timeout.or(env.config().fork_timeout),
            outcome,
        });

        debug!(fiber = %state.id, timeout = ?state.timeout, "Forking fiber");
        let future = effect.run_async(&fiber_env);
        let completion = Completion {
            state: state.clone(),
            finished: false,
        };
        env.executor().spawn(
            async move {
                let outcome = future.await;
                completion.finish(outcome);
            }
            .boxed(),
        );

        Self { state }
    }

    pub fn id(&self) -> FiberId {
        self.state.id
    }

    /// Signal the fiber's cancellation scope; idempotent
    ///
    /// A fiber that has not finished yet is recorded as cancelled.
    pub fn cancel(&self) -> Effect<()> {
        let state = self.state.clone();
        Effect::sync(move || state.cancel())
    }

    /// Wait for the fiber's terminal outcome
    ///
    /// With a timeout, elapsing first yields a `Timeout` error and leaves
    /// the fiber running; issue [`ForkHandle::cancel`] to stop it.
    pub fn join(&self) -> Effect<A> {
        let state = self.state.clone();
        Effect::suspend(move |env| {
            let state = state.clone();
            async move { state.join(&env).await }
        })
    }

    /// The terminal outcome, if one has been recorded
    pub fn outcome(&self) -> Option<Result<A>> {
        self.state.outcome()
    }

    pub fn is_finished(&self) -> bool {
        self.state.outcome.borrow().is_some()
    }
}

impl<A> std::fmt::Debug for ForkHandle<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkHandle")
            .field("id", &self.state.id)
            .field("timeout", &self.state.timeout)
            .finish()
    }
}

impl<A: Value> Effect<A> {
    /// Run this effect on the environment's executor
    ///
    /// The fiber runs in a child cancellation scope, so cancelling the
    /// forking environment cancels it too. Its failure stays on the handle
    /// until joined. `timeout` bounds each join; `None` falls back to the
    /// configured `fork_timeout`.
    pub fn fork(&self, timeout: Option<Duration>) -> Effect<ForkHandle<A>> {
        let effect = self.clone();
        Effect::lift_sync(move |env| Ok(ForkHandle::spawn(&effect, env, timeout)))
    }
}
