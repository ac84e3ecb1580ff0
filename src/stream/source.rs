//! Asynchronous producers and their reductions

use super::channel::Channel;
use super::merge::MergeIterator;
use super::sink::Sink;
use crate::effect::{Effect, Value};
use crate::error::{common, Result};
use crate::runtime::{CancellationScope, Environment};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use tracing::debug;

/// A single pass over a source
///
/// `ready_to_read` must be cancel-safe: dropping the returned future before
/// it completes must not lose an item. Merge relies on this when it abandons
/// the readiness checks that lost a race.
#[async_trait]
pub trait SourceIterator<A>: Send {
    /// Wait until an item can be read (`true`) or the source is exhausted (`false`)
    async fn ready_to_read(&mut self, env: &Environment, token: &CancellationScope) -> Result<bool>;

    /// Take the item made available by the last successful `ready_to_read`
    fn read(&mut self) -> Option<A>;
}

type Opener<A> = Arc<dyn Fn() -> Box<dyn SourceIterator<A>> + Send + Sync>;

/// A re-readable description of an asynchronous sequence
///
/// Every reduction opens a fresh [`SourceIterator`]. Sources over shared
/// state (a channel) share that state between passes.
pub struct Source<A> {
    open: Opener<A>,
}

impl<A> Clone for Source<A> {
    fn clone(&self) -> Self {
        Self {
            open: self.open.clone(),
        }
    }
}

impl<A> std::fmt::Debug for Source<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Source(..)")
    }
}

impl<A: Value> Source<A> {
    /// A source built from a custom iterator factory
    pub fn from_iterator<I, F>(open: F) -> Self
    where
        I: SourceIterator<A> + 'static,
        F: Fn() -> I + Send + Sync + 'static,
    {
        Self {
            open: Arc::new(move || Box::new(open()) as Box<dyn SourceIterator<A>>),
        }
    }

    /// Start a new pass
    pub fn open(&self) -> Box<dyn SourceIterator<A>> {
        (self.open)()
    }

    /// Items posted to `channel`, until it completes or fails
    pub fn channel(channel: Channel<A>) -> Self {
        Self::from_iterator(move || ChannelIterator {
            channel: channel.clone(),
        })
    }

    /// The given items, in order
    pub fn iterable(items: impl IntoIterator<Item = A>) -> Self {
        let items: Arc<Vec<A>> = Arc::new(items.into_iter().collect());
        Self::pull(move || items.as_ref().clone().into_iter())
    }

    /// Items pulled from a fresh iterator on every pass
    pub fn pull<I, F>(make: F) -> Self
    where
        I: Iterator<Item = A> + Send + 'static,
        F: Fn() -> I + Send + Sync + 'static,
    {
        Self::from_iterator(move || PullIterator {
            items: make(),
            buffered: None,
        })
    }

    /// Items of a fresh stream on every pass
    pub fn from_stream<F>(make: F) -> Self
    where
        F: Fn() -> BoxStream<'static, A> + Send + Sync + 'static,
    {
        Self::from_iterator(move || StreamIterator {
            stream: make(),
            buffered: None,
            done: false,
        })
    }

    /// The single value an effect produces
    pub fn from_effect(effect: Effect<A>) -> Self {
        Self::from_iterator(move || EffectIterator {
            effect: effect.clone(),
            state: EffectState::Idle,
        })
    }

    /// Items a producer effect posts to its sink
    ///
    /// The producer is forked onto the executor on first read, writing into
    /// a channel sized by the configured `channel_capacity`. A full channel
    /// holds the producer's posts until the reader catches up. The channel
    /// is completed when the producer succeeds and failed when it fails.
    /// Dropping the pass cancels the producer.
    pub fn from_producer<F>(produce: F) -> Self
    where
        F: Fn(Sink<A>) -> Effect<()> + Send + Sync + 'static,
    {
        let produce: Arc<dyn Fn(Sink<A>) -> Effect<()> + Send + Sync> = Arc::new(produce);
        Self::from_iterator(move || ProducerIterator {
            produce: produce.clone(),
            running: None,
        })
    }

    pub fn pure(value: A) -> Self {
        Self::iterable([value])
    }

    pub fn empty() -> Self {
        Self::iterable([])
    }

    /// Items of every source, in whatever order they become ready
    ///
    /// Each read races every remaining source and takes the first one ready.
    /// There is no ordering guarantee between sources beyond that. Sources
    /// that are exhausted drop out; the merge ends when all have. Merging
    /// an empty set fails with a source-closed error.
    pub fn merge(sources: impl IntoIterator<Item = Source<A>>) -> Self {
        let sources: Arc<Vec<Source<A>>> = Arc::new(sources.into_iter().collect());
        Self::from_iterator(move || {
            MergeIterator::new(sources.iter().map(Source::open).collect())
        })
    }

    pub fn merge_with(self, other: Source<A>) -> Self {
        Self::merge([self, other])
    }

    pub fn map<B, F>(self, f: F) -> Source<B>
    where
        B: Value,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let f: Arc<dyn Fn(A) -> B + Send + Sync> = Arc::new(f);
        Source::from_iterator(move || MapIterator {
            inner: self.open(),
            f: f.clone(),
        })
    }

    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&A) -> bool + Send + Sync + 'static,
    {
        let predicate: Arc<dyn Fn(&A) -> bool + Send + Sync> = Arc::new(predicate);
        Self::from_iterator(move || FilterIterator {
            inner: self.open(),
            predicate: predicate.clone(),
            buffered: None,
        })
    }

    /// At most the first `count` items
    pub fn take(self, count: usize) -> Self {
        Self::from_iterator(move || TakeIterator {
            inner: self.open(),
            remaining: count,
        })
    }

    /// Fold every item into an accumulator
    pub fn fold<B, F>(self, init: B, f: F) -> Effect<B>
    where
        B: Value,
        F: Fn(B, A) -> B + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::lift_async(move |env| {
            let mut items = self.open();
            let f = f.clone();
            let mut acc = init.clone();
            async move {
                let token = env.cancellation().clone();
                while items.ready_to_read(&env, &token).await? {
                    if let Some(item) = items.read() {
                        acc = f(acc, item);
                    }
                }
                Ok(acc)
            }
        })
    }

    /// Drain the source, discarding items
    pub fn iter(self) -> Effect<()> {
        self.fold((), |_, _| ())
    }

    /// The final item, if any
    pub fn last(self) -> Effect<Option<A>> {
        self.fold(None, |_, item| Some(item))
    }

    /// Every item, in the order read
    pub fn collect(self) -> Effect<Vec<A>> {
        self.fold(Vec::new(), |mut items, item| {
            items.push(item);
            items
        })
    }

    /// Run `f` for each item in turn
    pub fn for_each<F>(self, f: F) -> Effect<()>
    where
        F: Fn(A) -> Effect<()> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::lift_async(move |env| {
            let mut items = self.open();
            let f = f.clone();
            async move {
                let token = env.cancellation().clone();
                while items.ready_to_read(&env, &token).await? {
                    if let Some(item) = items.read() {
                        f(item).run_async(&env).await?;
                    }
                }
                Ok(())
            }
        })
    }

    /// Post every item to `sink`, then complete it
    ///
    /// A failure reading the source fails the sink with the same error
    /// before propagating. Cancellation counts as such a failure: the sink
    /// is failed outside the cancelled scope so downstream readers see a
    /// terminal status instead of waiting forever.
    pub fn pipe(self, sink: Sink<A>) -> Effect<()> {
        let forward = sink.clone();
        let finish = sink.clone();
        let flow = self
            .for_each(move |item| forward.post(item))
            .bind(move |_| finish.complete());

        Effect::suspend(move |env| {
            let piped = flow.run_async(&env);
            let detached = env.uncancellable();
            let sink = sink.clone();
            async move {
                let error = match piped.await {
                    Ok(()) => return Ok(()),
                    Err(error) => error,
                };
                if let Err(e) = sink.fail(error.clone()).run_async(&detached).await {
                    debug!(error = %e, "Sink already terminal when pipe failed");
                }
                Err(error)
            }
        })
    }
}

impl<A: Value> FromIterator<A> for Source<A> {
    fn from_iter<T: IntoIterator<Item = A>>(items: T) -> Self {
        Self::iterable(items)
    }
}

struct ChannelIterator<A> {
    channel: Channel<A>,
}

#[async_trait]
impl<A: Value> SourceIterator<A> for ChannelIterator<A> {
    async fn ready_to_read(&mut self, _env: &Environment, token: &CancellationScope) -> Result<bool> {
        self.channel.ready_to_read(token).await
    }

    fn read(&mut self) -> Option<A> {
        self.channel.try_read()
    }
}

struct PullIterator<I: Iterator> {
    items: I,
    buffered: Option<I::Item>,
}

#[async_trait]
impl<A, I> SourceIterator<A> for PullIterator<I>
where
    A: Value,
    I: Iterator<Item = A> + Send,
{
    async fn ready_to_read(&mut self, _env: &Environment, token: &CancellationScope) -> Result<bool> {
        token.check()?;
        if self.buffered.is_none() {
            self.buffered = self.items.next();
        }
        Ok(self.buffered.is_some())
    }

    fn read(&mut self) -> Option<A> {
        self.buffered.take()
    }
}

struct StreamIterator<A> {
    stream: BoxStream<'static, A>,
    buffered: Option<A>,
    done: bool,
}

#[async_trait]
impl<A: Value> SourceIterator<A> for StreamIterator<A> {
    async fn ready_to_read(&mut self, _env: &Environment, token: &CancellationScope) -> Result<bool> {
        if self.buffered.is_some() {
            return Ok(true);
        }
        if self.done {
            return Ok(false);
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(common::scope_cancelled()),
            next = self.stream.next() => {
                self.done = next.is_none();
                self.buffered = next;
                Ok(!self.done)
            }
        }
    }

    fn read(&mut self) -> Option<A> {
        self.buffered.take()
    }
}

enum EffectState<A> {
    Idle,
    Running(BoxFuture<'static, Result<A>>),
    Ready(A),
    Done,
}

/// Runs its effect against the reader's environment, not the race token,
/// so a lost race keeps the pending computation for the next read.
struct EffectIterator<A> {
    effect: Effect<A>,
    state: EffectState<A>,
}

#[async_trait]
impl<A: Value> SourceIterator<A> for EffectIterator<A> {
    async fn ready_to_read(&mut self, env: &Environment, token: &CancellationScope) -> Result<bool> {
        loop {
            match &mut self.state {
                EffectState::Idle => self.state = EffectState::Running(self.effect.run_async(env)),
                EffectState::Running(pending) => {
                    let outcome = tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(common::scope_cancelled()),
                        outcome = pending => outcome,
                    };
                    match outcome {
                        Ok(value) => self.state = EffectState::Ready(value),
                        Err(error) => {
                            self.state = EffectState::Done;
                            return Err(error);
                        }
                    }
                }
                EffectState::Ready(_) => return Ok(true),
                EffectState::Done => return Ok(false),
            }
        }
    }

    fn read(&mut self) -> Option<A> {
        match std::mem::replace(&mut self.state, EffectState::Done) {
            EffectState::Ready(value) => Some(value),
            other => {
                self.state = other;
                None
            }
        }
    }
}

struct ProducerIterator<A> {
    produce: Arc<dyn Fn(Sink<A>) -> Effect<()> + Send + Sync>,
    running: Option<(Channel<A>, CancellationScope)>,
}

impl<A: Value> ProducerIterator<A> {
    fn start(&self, env: &Environment) -> (Channel<A>, CancellationScope) {
        let channel = match env.config().channel_capacity {
            Some(capacity) => Channel::bounded(capacity),
            None => Channel::unbounded(),
        };
        let producer_env = env.local_cancel();
        let producer =
            (self.produce)(Sink::channel_with_backpressure(channel.clone())).run_async(&producer_env);

        debug!(capacity = ?channel.capacity(), "Starting source producer");
        let writer = channel.clone();
        env.executor().spawn(
            async move {
                // The producer may already have completed or failed the channel itself.
                let _ = match producer.await {
                    Ok(()) => writer.complete(),
                    Err(error) => writer.fail(error),
                };
            }
            .boxed(),
        );
        (channel, producer_env.cancellation().clone())
    }
}

#[async_trait]
impl<A: Value> SourceIterator<A> for ProducerIterator<A> {
    async fn ready_to_read(&mut self, env: &Environment, token: &CancellationScope) -> Result<bool> {
        let channel = match &self.running {
            Some((channel, _)) => channel.clone(),
            None => {
                let running = self.start(env);
                let channel = running.0.clone();
                self.running = Some(running);
                channel
            }
        };
        channel.ready_to_read(token).await
    }

    fn read(&mut self) -> Option<A> {
        self.running.as_ref().and_then(|(channel, _)| channel.try_read())
    }
}

impl<A> Drop for ProducerIterator<A> {
    fn drop(&mut self) {
        if let Some((_, scope)) = &self.running {
            scope.cancel();
        }
    }
}

struct MapIterator<A, B> {
    inner: Box<dyn SourceIterator<A>>,
    f: Arc<dyn Fn(A) -> B + Send + Sync>,
}

#[async_trait]
impl<A: Value, B: Value> SourceIterator<B> for MapIterator<A, B> {
    async fn ready_to_read(&mut self, env: &Environment, token: &CancellationScope) -> Result<bool> {
        self.inner.ready_to_read(env, token).await
    }

    fn read(&mut self) -> Option<B> {
        self.inner.read().map(|item| (self.f)(item))
    }
}

struct FilterIterator<A> {
    inner: Box<dyn SourceIterator<A>>,
    predicate: Arc<dyn Fn(&A) -> bool + Send + Sync>,
    buffered: Option<A>,
}

#[async_trait]
impl<A: Value> SourceIterator<A> for FilterIterator<A> {
    async fn ready_to_read(&mut self, env: &Environment, token: &CancellationScope) -> Result<bool> {
        while self.buffered.is_none() {
            if !self.inner.ready_to_read(env, token).await? {
                return Ok(false);
            }
            self.buffered = self.inner.read().filter(|item| (self.predicate)(item));
        }
        Ok(true)
    }

    fn read(&mut self) -> Option<A> {
        self.buffered.take()
    }
}

struct TakeIterator<A> {
    inner: Box<dyn SourceIterator<A>>,
    remaining: usize,
}

#[async_trait]
impl<A: Value> SourceIterator<A> for TakeIterator<A> {
    async fn ready_to_read(&mut self, env: &Environment, token: &CancellationScope) -> Result<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        self.inner.ready_to_read(env, token).await
    }

    fn read(&mut self) -> Option<A> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.inner.read();
        if item.is_some() {
            self.remaining -= 1;
        }
        item
    }
}
