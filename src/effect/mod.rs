//! Deferred, composable computations
//!
//! An [`Effect`] is a closed description of a computation: a pure value, a
//! failure, a synchronous thunk, or an asynchronous thunk. Building an effect
//! never performs a side effect; only [`Effect::run`] and
//! [`Effect::run_async`] evaluate it against an [`Environment`].
//!
//! Effects are cloneable and re-runnable. Repeat and retry rely on this: each
//! iteration evaluates the same description from scratch.
//!
//! ```
//! use effio::Effect;
//!
//! # tokio_test::block_on(async {
//! let effect = Effect::pure(20)
//!     .map(|n| n + 1)
//!     .bind(|n| Effect::pure(n * 2));
//! assert_eq!(effect.execute_async().await.unwrap(), 42);
//! # });
//! ```

mod bracket;
mod fork;
mod interpreter;
mod repeat;


pub use bracket::Acquired;
pub use fork::{FiberId, ForkHandle};

use crate::error::{EffectError, Result};
use crate::runtime::Environment;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Values an effect can produce
///
/// Effects are re-runnable and their outcomes may be observed more than once,
/// so produced values must be cloneable and shareable across threads.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Value for T {}

pub(crate) type SyncThunk<A> = Arc<dyn Fn(&Environment) -> Result<A> + Send + Sync>;
pub(crate) type AsyncThunk<A> =
    Arc<dyn Fn(Environment) -> BoxFuture<'static, Result<A>> + Send + Sync>;

/// A lazily evaluated computation producing `A` or an [`EffectError`]
#[derive(Clone)]
pub enum Effect<A> {
    Pure(A),
    Fail(EffectError),
    Sync(SyncThunk<A>),
    Async(AsyncThunk<A>),
}

impl<A: Value> Effect<A> {
    /// Create a pure value (no effects)
    pub fn pure(value: A) -> Self {
        Self::Pure(value)
    }

    /// Create a failing effect
    pub fn fail(error: EffectError) -> Self {
        Self::Fail(error)
    }

    /// Lift a synchronous function of the environment
    pub fn lift_sync<F>(f: F) -> Self
    where
        F: Fn(&Environment) -> Result<A> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Lift an infallible synchronous function
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self::lift_sync(move |_| Ok(f()))
    }

    /// Lift an asynchronous function of the environment
    ///
    /// The returned future is abandoned with `Cancelled` as soon as the
    /// environment's scope is cancelled.
    ///
    /// ```
    /// use effio::Effect;
    ///
    /// # tokio_test::block_on(async {
    /// let effect = Effect::lift_async(|_env| async { Ok("ready") });
    /// assert_eq!(effect.execute_async().await.unwrap(), "ready");
    /// # });
    /// ```
    pub fn lift_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Environment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A>> + Send + 'static,
    {
        Self::Async(Arc::new(move |env: Environment| {
            let future = f(env.clone());
            async move {
                tokio::select! {
                    biased;
                    _ = env.cancellation().cancelled() => Err(crate::error::common::scope_cancelled()),
                    result = future => result,
                }
            }
            .boxed()
        }))
    }

    /// Lift a `Result`
    pub fn from_result(result: Result<A>) -> Self {
        match result {
            Ok(value) => Self::Pure(value),
            Err(error) => Self::Fail(error),
        }
    }

    /// Lift a fallible host function, converting its error at the boundary
    pub fn try_sync<F, E>(f: F) -> Self
    where
        F: Fn() -> std::result::Result<A, E> + Send + Sync + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::lift_sync(move |_| f().map_err(EffectError::from_exception))
    }

    /// Internal asynchronous node that is not raced against cancellation
    ///
    /// Combinators use this so that their own bookkeeping (bracket release,
    /// retry loops) always gets to run; the leaves they evaluate observe
    /// cancellation themselves.
    pub(crate) fn suspend<F, Fut>(f: F) -> Self
    where
        F: Fn(Environment) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A>> + Send + 'static,
    {
        Self::Async(Arc::new(move |env| f(env).boxed()))
    }

    pub fn is_pure(&self) -> bool {
        matches!(self, Self::Pure(_))
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }

    /// Transform the success value
    ///
    /// `Fail` is returned unchanged without calling `f`.
    pub fn map<B, F>(self, f: F) -> Effect<B>
    where
        B: Value,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        match self {
            Self::Fail(error) => Effect::Fail(error),
            Self::Pure(value) => Effect::Sync(Arc::new(move |_| Ok(f(value.clone())))),
            Self::Sync(thunk) => Effect::Sync(Arc::new(move |env| thunk(env).map(&f))),
            Self::Async(thunk) => {
                let f = Arc::new(f);
                Effect::Async(Arc::new(move |env| {
                    let future = thunk(env);
                    let f = f.clone();
                    async move { future.await.map(|value| f(value)) }.boxed()
                }))
            }
        }
    }

    /// Sequence a dependent effect, short-circuiting on failure
    ///
    /// ```
    /// use effio::{Effect, EffectError};
    ///
    /// # tokio_test::block_on(async {
    /// let failed: Effect<i32> = Effect::fail(EffectError::failure("boom"));
    /// let chained = failed.bind(|n| Effect::pure(n + 1));
    /// assert_eq!(chained.execute_async().await.unwrap_err().message(), "boom");
    /// # });
    /// ```
    pub fn bind<B, F>(self, f: F) -> Effect<B>
    where
        B: Value,
        F: Fn(A) -> Effect<B> + Send + Sync + 'static,
    {
        if let Self::Fail(error) = self {
            return Effect::Fail(error);
        }
        let f = Arc::new(f);
        Effect::suspend(move |env| {
            let first = self.run_async(&env);
            let f = f.clone();
            async move {
                let value = first.await?;
                f(value).run_async(&env).await
            }
        })
    }

    /// Alias of [`Effect::bind`]
    pub fn and_then<B, F>(self, f: F) -> Effect<B>
    where
        B: Value,
        F: Fn(A) -> Effect<B> + Send + Sync + 'static,
    {
        self.bind(f)
    }

    /// Transform the error
    pub fn map_err<F>(self, f: F) -> Self
    where
        F: Fn(EffectError) -> EffectError + Send + Sync + 'static,
    {
        match self {
            Self::Pure(value) => Self::Pure(value),
            Self::Fail(error) => Self::Sync(Arc::new(move |_| Err(f(error.clone())))),
            Self::Sync(thunk) => Self::Sync(Arc::new(move |env| thunk(env).map_err(&f))),
            Self::Async(thunk) => {
                let f = Arc::new(f);
                Self::Async(Arc::new(move |env| {
                    let future = thunk(env);
                    let f = f.clone();
                    async move { future.await.map_err(|error| f(error)) }.boxed()
                }))
            }
        }
    }

    /// Recover from errors matching `predicate`
    ///
    /// Errors the predicate rejects are re-raised untouched. Cancellation is
    /// only intercepted when the predicate explicitly matches it.
    pub fn catch<P, H>(self, predicate: P, handler: H) -> Self
    where
        P: Fn(&EffectError) -> bool + Send + Sync + 'static,
        H: Fn(EffectError) -> Effect<A> + Send + Sync + 'static,
    {
        if let Self::Pure(value) = self {
            return Self::Pure(value);
        }
        let predicate = Arc::new(predicate);
        let handler = Arc::new(handler);
        Self::suspend(move |env| {
            let attempt = self.run_async(&env);
            let predicate = predicate.clone();
            let handler = handler.clone();
            async move {
                match attempt.await {
                    Err(error) if predicate(&error) => handler(error).run_async(&env).await,
                    other => other,
                }
            }
        })
    }

    /// Recover from errors carrying `code`
    pub fn catch_code<H>(self, code: u16, handler: H) -> Self
    where
        H: Fn(EffectError) -> Effect<A> + Send + Sync + 'static,
    {
        self.catch(move |error| error.code() == code, handler)
    }

    /// Recover from any error except cancellation
    pub fn or_else<H>(self, handler: H) -> Self
    where
        H: Fn(EffectError) -> Effect<A> + Send + Sync + 'static,
    {
        self.catch(|error| !error.is_cancelled(), handler)
    }

    /// Fail with `error_fn(&value)` unless `predicate` holds
    pub fn check<P, F>(self, predicate: P, error_fn: F) -> Self
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
        F: Fn(&A) -> EffectError + Send + Sync + 'static,
    {
        self.bind(move |value| {
            if predicate(&value) {
                Effect::Pure(value)
            } else {
                Effect::Fail(error_fn(&value))
            }
        })
    }

    /// Run a side effect on the success value, keeping the value
    pub fn tap<F>(self, f: F) -> Self
    where
        F: Fn(&A) -> Effect<()> + Send + Sync + 'static,
    {
        self.bind(move |value| f(&value).map(move |_| value.clone()))
    }

    /// Run both effects in order, returning both values
    pub fn zip<B: Value>(self, other: Effect<B>) -> Effect<(A, B)> {
        self.bind(move |a| other.clone().map(move |b| (a.clone(), b)))
    }

    /// Run effects in order, collecting their values; stops at the first failure
    pub fn sequence(effects: impl IntoIterator<Item = Effect<A>>) -> Effect<Vec<A>> {
        let effects: Vec<Effect<A>> = effects.into_iter().collect();
        Effect::suspend(move |env| {
            let effects = effects.clone();
            async move {
                let mut values = Vec::with_capacity(effects.len());
                for effect in &effects {
                    values.push(effect.run_async(&env).await?);
                }
                Ok(values)
            }
        })
    }
}

impl Effect<()> {
    pub fn unit() -> Self {
        Self::Pure(())
    }

    /// Suspend for `duration` on the environment's clock
    pub fn sleep(duration: Duration) -> Self {
        Self::suspend(move |env| async move { env.sleep(duration).await })
    }
}

impl<A> std::fmt::Debug for Effect<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pure(_) => f.write_str("Effect::Pure(..)"),
            Self::Fail(error) => f.debug_tuple("Effect::Fail").field(error).finish(),
            Self::Sync(_) => f.write_str("Effect::Sync(..)"),
            Self::Async(_) => f.write_str("Effect::Async(..)"),
        }
    }
}

/// Combine a primary outcome with a release outcome
///
/// A release failure never replaces a primary failure; both are kept.
pub(crate) fn settle<A>(result: Result<A>, release: Result<()>) -> Result<A> {
    match (result, release) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_error)) => Err(release_error),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(release_error)) => Err(EffectError::aggregate(error, release_error)),
    }
}
