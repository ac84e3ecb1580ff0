//! Background schedulers that fibers and producer sources are dispatched onto

use crate::error::{EffectError, ErrorCode, Result};
use futures::future::BoxFuture;
use futures::task::{waker_ref, ArcWake};
use once_cell::sync::OnceCell;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use tokio::runtime::{Handle, Runtime};
use tracing::debug;

/// Something that can run a detached task to completion
pub trait Executor: Send + Sync + 'static {
    fn spawn(&self, task: BoxFuture<'static, ()>);

    /// Runtime whose timers and I/O drivers blocking runs should enter
    fn runtime_handle(&self) -> Option<Handle> {
        None
    }
}

static SHARED_RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Process-wide multi-thread runtime used when no runtime is current
fn shared_runtime() -> Result<&'static Runtime> {
    SHARED_RUNTIME.get_or_try_init(|| {
        debug!("Starting shared effect runtime");
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("effio-shared")
            .build()
            .map_err(|e| {
                EffectError::exception_with_code(
                    ErrorCode::CONFIG_RUNTIME_BUILD,
                    "failed to start shared runtime",
                    e,
                )
            })
    })
}

/// Executor backed by a tokio runtime handle
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// The current runtime, or the shared one outside any runtime
    pub fn current() -> Result<Self> {
        match Handle::try_current() {
            Ok(handle) => Ok(Self::new(handle)),
            Err(_) => Ok(Self::new(shared_runtime()?.handle().clone())),
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Executor for TokioExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }

    fn runtime_handle(&self) -> Option<Handle> {
        Some(self.handle.clone())
    }
}

struct ManualTask {
    future: Mutex<Option<BoxFuture<'static, ()>>>,
    queue: Weak<ManualQueue>,
}

impl ArcWake for ManualTask {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        if let Some(queue) = arc_self.queue.upgrade() {
            queue.ready().push_back(arc_self.clone());
        }
    }
}

#[derive(Default)]
struct ManualQueue {
    ready: Mutex<VecDeque<Arc<ManualTask>>>,
}

impl ManualQueue {
    fn ready(&self) -> MutexGuard<'_, VecDeque<Arc<ManualTask>>> {
        match self.ready.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Deterministic executor that only makes progress when stepped
///
/// Spawned tasks are queued; `step` polls the oldest ready task once. A task
/// that returns `Pending` is re-queued when its waker fires.
#[derive(Clone, Default)]
pub struct ManualExecutor {
    queue: Arc<ManualQueue>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll the next ready task; returns false when nothing was ready
    pub fn step(&self) -> bool {
        let task = self.queue.ready().pop_front();
        let Some(task) = task else {
            return false;
        };

        let mut slot = match task.future.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut future) = slot.take() {
            let waker = waker_ref(&task);
            let mut cx = Context::from_waker(&waker);
            if let Poll::Pending = future.as_mut().poll(&mut cx) {
                *slot = Some(future);
            }
        }
        true
    }

    /// Step until no task is ready; returns the number of polls performed
    pub fn run_until_stalled(&self) -> usize {
        let mut steps = 0;
        while self.step() {
            steps += 1;
        }
        steps
    }

    /// Number of tasks waiting to be polled
    pub fn pending(&self) -> usize {
        self.queue.ready().len()
    }
}

impl Executor for ManualExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        let task = Arc::new(ManualTask {
            future: Mutex::new(Some(task)),
            queue: Arc::downgrade(&self.queue),
        });
        self.queue.ready().push_back(task);
    }
}

impl std::fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_manual_executor_runs_only_when_stepped() {
        let executor = ManualExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            executor.spawn(
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                .boxed(),
            );
        }

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(executor.pending(), 3);

        assert!(executor.step());
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert_eq!(executor.run_until_stalled(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!executor.step());
    }

    #[test]
    fn test_manual_executor_requeues_woken_tasks() {
        let executor = ManualExecutor::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();
        let seen = Arc::new(AtomicUsize::new(0));

        let observed = seen.clone();
        executor.spawn(
            async move {
                if let Ok(value) = rx.await {
                    observed.store(value as usize, Ordering::SeqCst);
                }
            }
            .boxed(),
        );

        executor.run_until_stalled();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(executor.pending(), 0);

        tx.send(7).unwrap();
        assert_eq!(executor.pending(), 1);
        executor.run_until_stalled();
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_tokio_executor_outside_runtime_uses_shared_runtime() {
        let executor = TokioExecutor::current().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        executor.spawn(
            async move {
                let _ = tx.send(42);
            }
            .boxed(),
        );
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap(), 42);
    }
}
