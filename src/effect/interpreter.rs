//! Evaluation of effect descriptions against an environment

use super::{settle, Effect, Value};
use crate::error::Result;
use crate::runtime::Environment;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::task::{Context, Poll};
use tokio::runtime::Handle;

impl<A: Value> Effect<A> {
    /// Evaluate the effect, suspending at asynchronous nodes
    ///
    /// The returned future owns clones of the effect and the environment.
    /// Cancellation is checked before any synchronous or asynchronous work
    /// starts; `Pure` and `Fail` resolve without touching the environment.
    pub fn run_async(&self, env: &Environment) -> BoxFuture<'static, Result<A>> {
        match self {
            Self::Pure(value) => futures::future::ready(Ok(value.clone())).boxed(),
            Self::Fail(error) => futures::future::ready(Err(error.clone())).boxed(),
            Self::Sync(thunk) => {
                let thunk = thunk.clone();
                let env = env.clone();
                async move {
                    env.check_cancelled()?;
                    thunk(&env)
                }
                .boxed()
            }
            Self::Async(thunk) => {
                let thunk = thunk.clone();
                let env = env.clone();
                async move {
                    env.check_cancelled()?;
                    thunk(env).await
                }
                .boxed()
            }
        }
    }

    /// Evaluate the effect on the calling thread
    ///
    /// Asynchronous nodes are driven by spin-yield polling rather than a
    /// blocking wait, so a fiber may call `run` on a nested effect without
    /// parking a scheduler thread. Timers and I/O are driven by the
    /// executor's runtime, which must not be a current-thread runtime owned
    /// by the calling thread.
    pub fn run(&self, env: &Environment) -> Result<A> {
        match self {
            Self::Pure(value) => Ok(value.clone()),
            Self::Fail(error) => Err(error.clone()),
            Self::Sync(thunk) => {
                env.check_cancelled()?;
                thunk(env)
            }
            Self::Async(_) => spin_wait(self.run_async(env), env.executor().runtime_handle()),
        }
    }

    /// Run in a fresh environment, then release everything it acquired
    pub fn execute(&self) -> Result<A> {
        let env = Environment::new()?;
        let result = self.run(&env);
        settle(result, env.release_all())
    }

    /// Asynchronous [`Effect::execute`]
    pub async fn execute_async(&self) -> Result<A> {
        let env = Environment::new()?;
        let result = self.run_async(&env).await;
        settle(result, env.release_all())
    }
}

/// Poll `future` to completion, yielding the thread between polls
fn spin_wait<T>(mut future: BoxFuture<'static, T>, handle: Option<Handle>) -> T {
    let _entered = handle.as_ref().map(Handle::enter);
    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(value) = future.as_mut().poll(&mut cx) {
            return value;
        }
        std::thread::yield_now();
    }
}
