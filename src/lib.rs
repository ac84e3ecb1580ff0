//! # Effio
//!
//! A deferred-effect runtime: computations are described first and run later
//! against an environment that carries cancellation, resources, an executor,
//! and a clock.
//!
//! ## Usage
//!
//! ```
//! use effio::{Effect, EffectError, Schedule};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let attempts = Arc::new(AtomicUsize::new(0));
//! let counter = attempts.clone();
//! let flaky = Effect::lift_sync(move |_| {
//!     if counter.fetch_add(1, Ordering::SeqCst) < 2 {
//!         Err(EffectError::failure("not yet"))
//!     } else {
//!         Ok("done")
//!     }
//! });
//!
//! let policy = Schedule::spaced(Duration::from_millis(1)) & Schedule::recurs(5);
//! assert_eq!(flaky.retry(policy).execute_async().await.unwrap(), "done");
//! assert_eq!(attempts.load(Ordering::SeqCst), 3);
//! # });
//! ```
//!
//! ## Modules
//!
//! - `effect` - The effect type, its combinators, bracket, fork, repeat and retry
//! - `runtime` - Environment, cancellation scopes, resource registry, executors and clocks
//! - `schedule` - Delay policies driving repeat and retry
//! - `stream` - Sources, sinks, channels, and the first-ready-wins merge
//! - `error` - The error taxonomy and error codes
//! - `app` - Configuration, logging setup, and a runtime owning its executor
pub mod app;
pub mod effect;
pub mod error;
pub mod runtime;
pub mod schedule;
pub mod stream;

pub use app::{init_logging, init_tracing, Runtime, RuntimeConfig};
pub use effect::{Acquired, Effect, FiberId, ForkHandle, Value};
pub use error::{EffectError, ErrorCode, ErrorExt, Result};
pub use runtime::{CancellationScope, Clock, Environment, Executor, ResourceId};
pub use schedule::{BackoffStrategy, Schedule, ScheduleConfig};
pub use stream::{Channel, ChannelStatus, Choice, Sink, Source, SourceIterator};

/// Everything needed to build and run effects
pub mod prelude {
    pub use crate::effect::{Effect, ForkHandle, Value};
    pub use crate::error::{common, EffectError, ErrorExt, Result};
    pub use crate::runtime::Environment;
    pub use crate::schedule::Schedule;
    pub use crate::stream::{Channel, Choice, Sink, Source};
}
