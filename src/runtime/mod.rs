//! Execution environment and its collaborators
//!
//! - `cancel` - hierarchical cooperative cancellation scopes
//! - `resources` - ordered registry of disposable handles
//! - `clock` - time and delay providers
//! - `executor` - background schedulers for fibers and producers
//! - `env` - the `Environment` threaded through every evaluation

pub mod cancel;
pub mod clock;
pub mod env;
pub mod executor;
pub mod resources;

pub use cancel::CancellationScope;
pub use clock::{Clock, SystemClock, VirtualClock};
pub use env::Environment;
pub use executor::{Executor, ManualExecutor, TokioExecutor};
pub use resources::{Disposable, ResourceId, ResourceRegistry};
