use super::{EffectError, ErrorCode};
use std::time::Duration;

/// Extension trait for convenient error conversion
pub trait ErrorExt<T> {
    /// Convert to EffectError with context
    fn to_effect(self, context: impl Into<String>) -> Result<T, EffectError>;

    /// Convert to EffectError with specific error type
    fn to_failure(self, message: impl Into<String>) -> Result<T, EffectError>;
    fn to_release_error(self, message: impl Into<String>) -> Result<T, EffectError>;
}

impl<T, E> ErrorExt<T> for Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn to_effect(self, context: impl Into<String>) -> Result<T, EffectError> {
        self.map_err(|e| EffectError::from_exception(e).with_context(context.into()))
    }

    fn to_failure(self, message: impl Into<String>) -> Result<T, EffectError> {
        self.map_err(|e| EffectError::failure(message).with_cause(EffectError::from_exception(e)))
    }

    fn to_release_error(self, message: impl Into<String>) -> Result<T, EffectError> {
        self.map_err(|e| {
            EffectError::failure_with_code(ErrorCode::RESOURCE_RELEASE_FAILED, message)
                .with_cause(EffectError::from_exception(e))
        })
    }
}

/// Helper functions for common error scenarios
pub mod common {
    use super::*;

    /// Posting to, or completing, a channel that already reached a terminal state
    pub fn channel_closed() -> EffectError {
        EffectError::closed_with_code(ErrorCode::CLOSED_CHANNEL, "channel is closed")
    }

    /// Posting to a bounded channel at capacity
    pub fn channel_full(capacity: usize) -> EffectError {
        EffectError::closed_with_code(
            ErrorCode::CLOSED_CHANNEL_FULL,
            format!("channel is full (capacity {})", capacity),
        )
    }

    /// Posting to, or completing, a sink that already reached a terminal state
    pub fn sink_closed() -> EffectError {
        EffectError::closed_with_code(ErrorCode::CLOSED_SINK, "sink is closed")
    }

    /// Reading a merge of zero sources
    pub fn source_closed() -> EffectError {
        EffectError::closed_with_code(ErrorCode::CLOSED_SOURCE, "source closed: nothing to merge")
    }

    /// The surrounding cancellation scope was cancelled
    pub fn scope_cancelled() -> EffectError {
        EffectError::cancelled_with_code(ErrorCode::CANCELLED_SCOPE, "cancellation requested")
    }

    /// A fiber was cancelled through its handle
    pub fn fiber_cancelled(fiber: impl std::fmt::Display) -> EffectError {
        EffectError::cancelled_with_code(
            ErrorCode::CANCELLED_FIBER,
            format!("fiber {} was cancelled", fiber),
        )
    }

    /// Awaiting a fiber took longer than the fork timeout
    pub fn await_timeout(fiber: impl std::fmt::Display, timeout: Duration) -> EffectError {
        EffectError::timeout_with_code(
            ErrorCode::TIMEOUT_FIBER_AWAIT,
            format!("fiber {} did not finish in time", fiber),
            timeout,
        )
    }

    /// A fiber's task went away without recording an outcome
    pub fn fiber_lost(fiber: impl std::fmt::Display) -> EffectError {
        EffectError::closed_with_code(
            ErrorCode::CLOSED_FIBER_LOST,
            format!("fiber {} dropped before producing an outcome", fiber),
        )
    }
}

/// Macro for quick error creation with context
#[macro_export]
macro_rules! effect_error {
    (failure: $msg:expr) => {
        $crate::error::EffectError::failure($msg)
    };
    (failure: $msg:expr, $cause:expr) => {
        $crate::error::EffectError::failure($msg).with_cause($cause)
    };
    (cancelled: $msg:expr) => {
        $crate::error::EffectError::cancelled($msg)
    };
    (closed: $msg:expr) => {
        $crate::error::EffectError::closed($msg)
    };
    (exception: $source:expr) => {
        $crate::error::EffectError::from_exception($source)
    };
}
