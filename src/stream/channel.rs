//! Multi-writer queue with a one-way terminal state

use crate::error::{common, EffectError, Result};
use crate::runtime::CancellationScope;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::trace;

/// Lifecycle of a channel; `Completed` and `Failed` are final
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    Open,
    Completed,
    Failed(EffectError),
}

impl ChannelStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChannelStatus::Open)
    }
}

struct ChannelState<A> {
    queue: VecDeque<A>,
    status: ChannelStatus,
}

struct ChannelInner<A> {
    state: Mutex<ChannelState<A>>,
    notify: Notify,
    capacity: Option<usize>,
}

/// Queue shared by any number of writers and readers
///
/// `post` never blocks: posting to a terminal channel fails with a closed
/// error, posting to a full bounded channel fails with a full error.
/// `write` instead waits for a reader to make room. Items buffered before
/// completion are still delivered after it.
pub struct Channel<A> {
    inner: Arc<ChannelInner<A>>,
}

impl<A> Clone for Channel<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A> Channel<A> {
    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                state: Mutex::new(ChannelState {
                    queue: VecDeque::new(),
                    status: ChannelStatus::Open,
                }),
                notify: Notify::new(),
                capacity,
            }),
        }
    }

    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    /// A channel holding at most `capacity` unread items (at least one)
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity.max(1)))
    }

    fn state(&self) -> MutexGuard<'_, ChannelState<A>> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn post(&self, value: A) -> Result<()> {
        {
            let mut state = self.state();
            if state.status.is_terminal() {
                return Err(common::channel_closed());
            }
            if let Some(capacity) = self.inner.capacity {
                if state.queue.len() >= capacity {
                    return Err(common::channel_full(capacity));
                }
            }
            state.queue.push_back(value);
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Enqueue `value`, waiting while a bounded channel is full
    ///
    /// Fails with a closed error once the channel is terminal, including
    /// when it turns terminal while waiting.
    pub async fn write(&self, value: A, token: &CancellationScope) -> Result<()> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.status.is_terminal() {
                    return Err(common::channel_closed());
                }
                let has_room = self
                    .inner
                    .capacity
                    .map_or(true, |capacity| state.queue.len() < capacity);
                if has_room {
                    state.queue.push_back(value);
                    drop(state);
                    self.inner.notify.notify_waiters();
                    return Ok(());
                }
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(common::scope_cancelled()),
                _ = &mut notified => {}
            }
        }
    }

    /// Mark the channel completed; fails if it is already terminal
    pub fn complete(&self) -> Result<()> {
        self.finish(ChannelStatus::Completed)
    }

    /// Mark the channel failed; readers see `error` once the buffer drains
    pub fn fail(&self, error: EffectError) -> Result<()> {
        self.finish(ChannelStatus::Failed(error))
    }

    fn finish(&self, status: ChannelStatus) -> Result<()> {
        {
            let mut state = self.state();
            if state.status.is_terminal() {
                return Err(common::channel_closed());
            }
            trace!(status = ?status, buffered = state.queue.len(), "Channel finished");
            state.status = status;
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    pub fn status(&self) -> ChannelStatus {
        self.state().status.clone()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity
    }

    /// Number of buffered, unread items
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dequeue a buffered item without waiting
    pub fn try_read(&self) -> Option<A> {
        let value = self.state().queue.pop_front();
        if value.is_some() && self.inner.capacity.is_some() {
            // Writers waiting for room
            self.inner.notify.notify_waiters();
        }
        value
    }

    /// Wait until an item is buffered or the channel is terminal
    ///
    /// `Ok(true)` when an item is available, `Ok(false)` once the channel is
    /// completed and drained, the channel's error once it has failed and
    /// drained. Nothing is consumed, so dropping the future loses nothing.
    pub async fn ready_to_read(&self, token: &CancellationScope) -> Result<bool> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state();
                if !state.queue.is_empty() {
                    return Ok(true);
                }
                match &state.status {
                    ChannelStatus::Open => {}
                    ChannelStatus::Completed => return Ok(false),
                    ChannelStatus::Failed(error) => return Err(error.clone()),
                }
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(common::scope_cancelled()),
                _ = &mut notified => {}
            }
        }
    }

    /// Wait for and dequeue the next item; `None` once completed and drained
    pub async fn read(&self, token: &CancellationScope) -> Result<Option<A>> {
        while self.ready_to_read(token).await? {
            if let Some(value) = self.try_read() {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

impl<A> std::fmt::Debug for Channel<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Channel")
            .field("buffered", &state.queue.len())
            .field("status", &state.status)
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::time::Duration;

    #[test]
    fn test_terminal_state_is_final() {
        let channel = Channel::unbounded();
        channel.post(1).unwrap();
        channel.complete().unwrap();

        assert_eq!(channel.post(2).unwrap_err().code(), ErrorCode::CLOSED_CHANNEL);
        assert!(channel.complete().unwrap_err().is_closed());
        assert!(channel.fail(EffectError::failure("late")).is_err());
        assert_eq!(channel.status(), ChannelStatus::Completed);
        assert_eq!(channel.try_read(), Some(1));
    }

    #[test]
    fn test_bounded_channel_rejects_when_full() {
        let channel = Channel::bounded(2);
        channel.post('a').unwrap();
        channel.post('b').unwrap();

        let err = channel.post('c').unwrap_err();
        assert_eq!(err.code(), ErrorCode::CLOSED_CHANNEL_FULL);

        channel.try_read();
        channel.post('c').unwrap();
        assert_eq!(channel.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_write_waits_for_room_in_full_channel() {
        let channel = Channel::bounded(1);
        let token = CancellationScope::new();
        channel.write(1, &token).await.unwrap();

        let writer = channel.clone();
        let pending = tokio::spawn(async move {
            let token = CancellationScope::new();
            writer.write(2, &token).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());
        assert_eq!(channel.len(), 1);

        assert_eq!(channel.try_read(), Some(1));
        tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(channel.try_read(), Some(2));
    }

    #[tokio::test]
    async fn test_write_fails_when_channel_closes_or_scope_cancels() {
        let token = CancellationScope::new();
        let closed = Channel::unbounded();
        closed.complete().unwrap();
        assert_eq!(
            closed.write(1, &token).await.unwrap_err().code(),
            ErrorCode::CLOSED_CHANNEL
        );

        let full = Channel::bounded(1);
        full.post(1).unwrap();
        token.cancel();
        assert!(full.write(2, &token).await.unwrap_err().is_cancelled());
        assert_eq!(full.len(), 1);
    }

    #[tokio::test]
    async fn test_ready_to_read_reports_drained_terminal_states() {
        let token = CancellationScope::new();

        let completed = Channel::unbounded();
        completed.post(5).unwrap();
        completed.complete().unwrap();
        assert_eq!(completed.read(&token).await.unwrap(), Some(5));
        assert!(!completed.ready_to_read(&token).await.unwrap());

        let failed = Channel::<i32>::unbounded();
        failed.fail(EffectError::failure("upstream broke")).unwrap();
        assert_eq!(
            failed.ready_to_read(&token).await.unwrap_err().message(),
            "upstream broke"
        );
    }

    #[tokio::test]
    async fn test_ready_to_read_wakes_on_post() {
        let channel = Channel::unbounded();
        let writer = channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.post("hello").unwrap();
        });

        let token = CancellationScope::new();
        let value = tokio::time::timeout(Duration::from_secs(1), channel.read(&token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(value, Some("hello"));
    }

    #[tokio::test]
    async fn test_ready_to_read_observes_cancellation() {
        let channel = Channel::<u8>::unbounded();
        let token = CancellationScope::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = channel.ready_to_read(&token).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
