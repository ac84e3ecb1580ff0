//! The environment threaded through every effect evaluation

use super::cancel::CancellationScope;
use super::clock::{Clock, SystemClock};
use super::executor::{Executor, TokioExecutor};
use super::resources::ResourceRegistry;
use crate::app::config::RuntimeConfig;
use crate::error::{common, Result};
use std::sync::Arc;
use std::time::Duration;

/// Cancellation scope, resource registry, and the collaborators effects run against
///
/// Cloning is cheap and shares everything. Derived environments
/// ([`Environment::local_cancel`], [`Environment::uncancellable`]) share the
/// registry, executor, clock, and configuration but carry their own scope.
#[derive(Clone)]
pub struct Environment {
    cancellation: CancellationScope,
    resources: ResourceRegistry,
    executor: Arc<dyn Executor>,
    clock: Arc<dyn Clock>,
    config: Arc<RuntimeConfig>,
}

impl Environment {
    /// Environment on the current tokio runtime (or the shared one) with the system clock
    pub fn new() -> Result<Self> {
        Ok(Self::with_executor(Arc::new(TokioExecutor::current()?)))
    }

    pub fn with_executor(executor: Arc<dyn Executor>) -> Self {
        Self {
            cancellation: CancellationScope::new(),
            resources: ResourceRegistry::new(),
            executor,
            clock: Arc::new(SystemClock),
            config: Arc::new(RuntimeConfig::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Child environment with an independent cancellation scope
    ///
    /// Cancelling the parent cancels the child; cancelling the child leaves
    /// the parent untouched.
    pub fn local_cancel(&self) -> Self {
        Self {
            cancellation: self.cancellation.child(),
            ..self.clone()
        }
    }

    /// Environment detached from this one's cancellation, used for release actions
    pub fn uncancellable(&self) -> Self {
        Self {
            cancellation: CancellationScope::new(),
            ..self.clone()
        }
    }

    pub fn cancellation(&self) -> &CancellationScope {
        &self.cancellation
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn check_cancelled(&self) -> Result<()> {
        self.cancellation.check()
    }

    /// Cancel this environment's scope and its descendants
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Sleep on the environment's clock, waking early with `Cancelled`
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.check_cancelled()?;
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(common::scope_cancelled()),
            _ = self.clock.sleep(duration) => Ok(()),
        }
    }

    /// Dispose everything acquired through this environment's registry
    pub fn release_all(&self) -> Result<()> {
        self.resources.release_all()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("cancellation", &self.cancellation)
            .field("resources", &self.resources)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::clock::VirtualClock;
    use crate::runtime::executor::ManualExecutor;

    fn manual_env() -> Environment {
        Environment::with_executor(Arc::new(ManualExecutor::new()))
    }

    #[test]
    fn test_local_cancel_is_isolated_from_parent() {
        let env = manual_env();
        let local = env.local_cancel();

        local.cancel();
        assert!(local.is_cancelled());
        assert!(!env.is_cancelled());
    }

    #[test]
    fn test_parent_cancel_reaches_local() {
        let env = manual_env();
        let local = env.local_cancel();

        env.cancel();
        assert!(local.check_cancelled().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_local_cancel_shares_registry() {
        let env = manual_env();
        let local = env.local_cancel();
        local
            .resources()
            .acquire(Arc::new(|| -> Result<()> { Ok(()) }));
        assert_eq!(env.resources().len(), 1);
    }

    #[test]
    fn test_uncancellable_ignores_parent() {
        let env = manual_env();
        env.cancel();
        assert!(!env.uncancellable().is_cancelled());
    }

    #[test]
    fn test_sleep_uses_environment_clock() {
        let clock = VirtualClock::new();
        let env = manual_env().with_clock(Arc::new(clock.clone()));

        futures::executor::block_on(env.sleep(Duration::from_secs(3))).unwrap();
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn test_sleep_fails_when_cancelled() {
        let env = manual_env().with_clock(Arc::new(VirtualClock::new()));
        env.cancel();
        let err = futures::executor::block_on(env.sleep(Duration::from_secs(1))).unwrap_err();
        assert!(err.is_cancelled());
    }
}
