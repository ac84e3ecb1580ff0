//! Runtime initialization and top-level execution
//!
//! A [`Runtime`] owns a multi-threaded tokio runtime built from a
//! [`RuntimeConfig`] and runs effects to completion on it, each against a
//! fresh [`Environment`].

use crate::app::config::RuntimeConfig;
use crate::effect::{settle, Effect, Value};
use crate::error::{EffectError, ErrorCode, Result};
use crate::runtime::{Environment, Executor, TokioExecutor};
use std::sync::Arc;
use tracing::debug;

/// Owned tokio runtime plus the configuration every environment receives
pub struct Runtime {
    runtime: tokio::runtime::Runtime,
    executor: Arc<TokioExecutor>,
    config: RuntimeConfig,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all().thread_name(config.thread_name.clone());
        if let Some(threads) = config.worker_threads {
            builder.worker_threads(threads);
        }

        let runtime = builder.build().map_err(|e| {
            EffectError::exception_with_code(
                ErrorCode::CONFIG_RUNTIME_BUILD,
                "failed to build effect runtime",
                e,
            )
        })?;
        debug!(
            worker_threads = ?config.worker_threads,
            thread_name = %config.thread_name,
            "Effect runtime started"
        );

        let executor = Arc::new(TokioExecutor::new(runtime.handle().clone()));
        Ok(Self {
            runtime,
            executor,
            config,
        })
    }

    /// A fresh root environment bound to this runtime
    pub fn environment(&self) -> Environment {
        let executor: Arc<dyn Executor> = self.executor.clone();
        Environment::with_executor(executor).with_config(self.config.clone())
    }

    /// Run `effect` to completion, then release everything it acquired
    ///
    /// Must not be called from within an async context.
    pub fn execute<A: Value>(&self, effect: &Effect<A>) -> Result<A> {
        let env = self.environment();
        let result = self.runtime.block_on(effect.run_async(&env));
        settle(result, env.release_all())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn handle(&self) -> &tokio::runtime::Handle {
        self.runtime.handle()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .finish()
    }
}
