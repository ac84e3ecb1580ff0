//! Consumers of posted values, the dual of sources

use super::channel::Channel;
use crate::effect::{Effect, Value};
use crate::error::{common, EffectError, Result};
use std::sync::{Arc, Mutex};

/// Routing decision for [`Sink::choose`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice<L, R> {
    Left(L),
    Right(R),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkStatus {
    Open,
    Completed,
    Failed,
}

type PostFn<A> = Arc<dyn Fn(A) -> Effect<()> + Send + Sync>;
type FailFn = Arc<dyn Fn(EffectError) -> Effect<()> + Send + Sync>;

/// Destination for values, with a one-way terminal state
///
/// `post`, `complete`, and `fail` describe effects; nothing happens until
/// they run. Once `complete` or `fail` has run, further posts and
/// completions fail with a closed error. Clones share the terminal state.
pub struct Sink<A> {
    post: PostFn<A>,
    complete: Effect<()>,
    fail: FailFn,
    status: Arc<Mutex<SinkStatus>>,
}

impl<A> Clone for Sink<A> {
    fn clone(&self) -> Self {
        Self {
            post: self.post.clone(),
            complete: self.complete.clone(),
            fail: self.fail.clone(),
            status: self.status.clone(),
        }
    }
}

impl<A> Sink<A> {
    fn status(&self) -> SinkStatus {
        match self.status.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl<A> std::fmt::Debug for Sink<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink").field("status", &self.status()).finish()
    }
}

/// Run both effects concurrently, keeping both failures
fn both(lhs: Effect<()>, rhs: Effect<()>) -> Effect<()> {
    Effect::lift_async(move |env| {
        let lhs = lhs.run_async(&env);
        let rhs = rhs.run_async(&env);
        async move {
            let (lhs, rhs) = futures::join!(lhs, rhs);
            crate::effect::settle(lhs, rhs)
        }
    })
}

impl<A: Value> Sink<A> {
    fn from_parts<P, F>(post: P, complete: Effect<()>, fail: F) -> Self
    where
        P: Fn(A) -> Effect<()> + Send + Sync + 'static,
        F: Fn(EffectError) -> Effect<()> + Send + Sync + 'static,
    {
        Self {
            post: Arc::new(post),
            complete,
            fail: Arc::new(fail),
            status: Arc::new(Mutex::new(SinkStatus::Open)),
        }
    }

    /// Posts into `channel`; completing or failing the sink finishes the channel
    pub fn channel(channel: Channel<A>) -> Self {
        let posting = channel.clone();
        let completing = channel.clone();
        Self::from_parts(
            move |value| {
                let channel = posting.clone();
                Effect::lift_sync(move |_| channel.post(value.clone()))
            },
            Effect::lift_sync(move |_| completing.complete()),
            move |error| {
                let channel = channel.clone();
                Effect::lift_sync(move |_| channel.fail(error.clone()))
            },
        )
    }

    /// Like [`Sink::channel`], but a post to a full bounded channel waits
    /// for a reader to make room instead of failing
    pub fn channel_with_backpressure(channel: Channel<A>) -> Self {
        let posting = channel.clone();
        let completing = channel.clone();
        Self::from_parts(
            move |value| {
                let channel = posting.clone();
                Effect::lift_async(move |env| {
                    let channel = channel.clone();
                    let value = value.clone();
                    let token = env.cancellation().clone();
                    async move { channel.write(value, &token).await }
                })
            },
            Effect::lift_sync(move |_| completing.complete()),
            move |error| {
                let channel = channel.clone();
                Effect::lift_sync(move |_| channel.fail(error.clone()))
            },
        )
    }

    /// Runs `f` for each posted value
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(A) -> Effect<()> + Send + Sync + 'static,
    {
        Self::from_parts(f, Effect::unit(), |_| Effect::unit())
    }

    /// Accepts and discards everything
    pub fn void() -> Self {
        Self::from_parts(|_| Effect::unit(), Effect::unit(), |_| Effect::unit())
    }

    /// Fans every value out to both sinks concurrently
    ///
    /// Both sinks always receive the value; if either fails the error is
    /// reported, and if both fail the errors are aggregated.
    pub fn combine(lhs: Sink<A>, rhs: Sink<A>) -> Self {
        let (post_lhs, post_rhs) = (lhs.clone(), rhs.clone());
        let (fail_lhs, fail_rhs) = (lhs.clone(), rhs.clone());
        Self::from_parts(
            move |value: A| both(post_lhs.post(value.clone()), post_rhs.post(value)),
            both(lhs.complete(), rhs.complete()),
            move |error: EffectError| both(fail_lhs.fail(error.clone()), fail_rhs.fail(error)),
        )
    }

    /// Routes each value to exactly one of two sinks
    pub fn choose<L, R, F>(route: F, left: Sink<L>, right: Sink<R>) -> Self
    where
        L: Value,
        R: Value,
        F: Fn(A) -> Choice<L, R> + Send + Sync + 'static,
    {
        let (post_left, post_right) = (left.clone(), right.clone());
        let (fail_left, fail_right) = (left.clone(), right.clone());
        Self::from_parts(
            move |value| match route(value) {
                Choice::Left(value) => post_left.post(value),
                Choice::Right(value) => post_right.post(value),
            },
            both(left.complete(), right.complete()),
            move |error: EffectError| both(fail_left.fail(error.clone()), fail_right.fail(error)),
        )
    }

    /// A sink of `B` that converts each value before posting here
    pub fn contramap<B, F>(self, f: F) -> Sink<B>
    where
        B: Value,
        F: Fn(B) -> A + Send + Sync + 'static,
    {
        let (posting, failing) = (self.clone(), self.clone());
        Sink::from_parts(
            move |value| posting.post(f(value)),
            self.complete(),
            move |error| failing.fail(error),
        )
    }

    pub fn is_open(&self) -> bool {
        self.status() == SinkStatus::Open
    }

    fn transition(&self, next: SinkStatus) -> Result<()> {
        let mut status = match self.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *status != SinkStatus::Open {
            return Err(common::sink_closed());
        }
        *status = next;
        Ok(())
    }

    /// Deliver a value; fails with a closed error once the sink is terminal
    pub fn post(&self, value: A) -> Effect<()> {
        let sink = self.clone();
        Effect::lift_async(move |env| {
            let delivery = sink
                .is_open()
                .then(|| (sink.post)(value.clone()).run_async(&env));
            async move {
                match delivery {
                    Some(delivery) => delivery.await,
                    None => Err(common::sink_closed()),
                }
            }
        })
    }

    /// Move to the completed state
    pub fn complete(&self) -> Effect<()> {
        let sink = self.clone();
        Effect::lift_async(move |env| {
            let completion = sink
                .transition(SinkStatus::Completed)
                .map(|()| sink.complete.run_async(&env));
            async move { completion?.await }
        })
    }

    /// Move to the failed state, propagating `error` downstream
    pub fn fail(&self, error: EffectError) -> Effect<()> {
        let sink = self.clone();
        Effect::lift_async(move |env| {
            let failure = sink
                .transition(SinkStatus::Failed)
                .map(|()| (sink.fail)(error.clone()).run_async(&env));
            async move { failure?.await }
        })
    }
}
