use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod codes;
pub mod helpers;
pub mod serialization;


pub use codes::{describe_error_code, ErrorCode};
pub use helpers::{common, ErrorExt};
pub use serialization::SerializableError;

/// A host error kept behind an `Arc` so that it survives cloning.
pub type HostError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// The structured error shared by `Fail`, `Catch`, and every terminal outcome
///
/// Errors are cloneable: a `Fail` node can be run any number of times and a
/// fiber's outcome can be observed by every awaiting caller.
#[derive(Error, Debug, Clone)]
pub enum EffectError {
    #[error("[E{code:04}] {message}")]
    Failure {
        code: u16,
        message: String,
        #[source]
        cause: Option<Box<EffectError>>,
    },

    #[error("[E{code:04}] Cancelled: {message}")]
    Cancelled { code: u16, message: String },

    #[error("[E{code:04}] Timed out after {duration:?}: {message}")]
    Timeout {
        code: u16,
        message: String,
        duration: Duration,
    },

    #[error("[E{code:04}] Closed: {message}")]
    Closed { code: u16, message: String },

    #[error("[E{code:04}] {message}")]
    Exception {
        code: u16,
        message: String,
        #[source]
        source: HostError,
    },

    #[error("[E{code:04}] {} errors occurred: {}", .errors.len(), join_messages(.errors))]
    Aggregate { code: u16, errors: Vec<EffectError> },
}

fn join_messages(errors: &[EffectError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl EffectError {
    /// Create a computation failure with default code
    pub fn failure(message: impl Into<String>) -> Self {
        Self::failure_with_code(ErrorCode::FAILURE_GENERIC, message)
    }

    /// Create a computation failure with specific code
    pub fn failure_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Failure {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// Create a cancellation error with default code
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::cancelled_with_code(ErrorCode::CANCELLED_GENERIC, message)
    }

    /// Create a cancellation error with specific code
    pub fn cancelled_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Cancelled {
            code,
            message: message.into(),
        }
    }

    /// Create a timeout error with default code
    pub fn timeout(duration: Duration) -> Self {
        Self::timeout_with_code(ErrorCode::TIMEOUT_GENERIC, "operation timed out", duration)
    }

    /// Create a timeout error with specific code and message
    pub fn timeout_with_code(code: u16, message: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            code,
            message: message.into(),
            duration,
        }
    }

    /// Create a terminal-state violation with default code
    pub fn closed(message: impl Into<String>) -> Self {
        Self::closed_with_code(ErrorCode::CLOSED_GENERIC, message)
    }

    /// Create a terminal-state violation with specific code
    pub fn closed_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Closed {
            code,
            message: message.into(),
        }
    }

    /// Wrap a host error, keeping it downcastable
    ///
    /// An `EffectError` that went through the host boundary comes back as
    /// itself rather than as a wrapped exception.
    pub fn from_exception(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        match error.into().downcast::<EffectError>() {
            Ok(effect_error) => *effect_error,
            Err(other) => Self::from_host(Arc::from(other)),
        }
    }

    /// Wrap an already shared host error
    pub fn from_host(source: HostError) -> Self {
        if let Some(effect_error) = source.downcast_ref::<EffectError>() {
            return effect_error.clone();
        }
        Self::Exception {
            code: ErrorCode::EXCEPTION_GENERIC,
            message: source.to_string(),
            source,
        }
    }

    /// Wrap a host error under a specific code and message
    pub fn exception_with_code(
        code: u16,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Exception {
            code,
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Convert to a host error
    ///
    /// Wrapped host errors are handed back unchanged; every other variant is
    /// exposed as itself, so `from_host(e.to_exception()) == e`.
    pub fn to_exception(&self) -> HostError {
        match self {
            Self::Exception { source, .. } => Arc::clone(source),
            other => Arc::new(other.clone()),
        }
    }

    /// Combine a primary error with a secondary one, flattening aggregates
    pub fn aggregate(primary: EffectError, secondary: EffectError) -> Self {
        let mut errors = Vec::new();
        for error in [primary, secondary] {
            match error {
                Self::Aggregate { errors: inner, .. } => errors.extend(inner),
                single => errors.push(single),
            }
        }
        Self::Aggregate {
            code: ErrorCode::AGGREGATE,
            errors,
        }
    }

    /// Combine any number of errors; `None` when there is nothing to report
    pub fn aggregate_all(errors: impl IntoIterator<Item = EffectError>) -> Option<Self> {
        errors
            .into_iter()
            .fold(None, |acc, error| match acc {
                None => Some(error),
                Some(primary) => Some(Self::aggregate(primary, error)),
            })
    }

    /// Attach a cause; only failures carry a cause chain
    pub fn with_cause(mut self, cause: EffectError) -> Self {
        if let Self::Failure { cause: slot, .. } = &mut self {
            *slot = Some(Box::new(cause));
        }
        self
    }

    /// Add context to the error message
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Failure { message, .. }
            | Self::Cancelled { message, .. }
            | Self::Timeout { message, .. }
            | Self::Closed { message, .. }
            | Self::Exception { message, .. } => {
                *message = format!("{}: {}", message, context);
            }
            Self::Aggregate { .. } => {}
        }
        self
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Failure { code, .. }
            | Self::Cancelled { code, .. }
            | Self::Timeout { code, .. }
            | Self::Closed { code, .. }
            | Self::Exception { code, .. }
            | Self::Aggregate { code, .. } => *code,
        }
    }

    /// Get the bare message without code prefix
    pub fn message(&self) -> String {
        match self {
            Self::Failure { message, .. }
            | Self::Cancelled { message, .. }
            | Self::Timeout { message, .. }
            | Self::Closed { message, .. }
            | Self::Exception { message, .. } => message.clone(),
            Self::Aggregate { errors, .. } => join_messages(errors),
        }
    }

    /// Variant name, used for reporting
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Failure { .. } => "Failure",
            Self::Cancelled { .. } => "Cancelled",
            Self::Timeout { .. } => "Timeout",
            Self::Closed { .. } => "Closed",
            Self::Exception { .. } => "Exception",
            Self::Aggregate { .. } => "Aggregate",
        }
    }

    /// The cause chain of a failure, outermost first
    pub fn causes(&self) -> Vec<&EffectError> {
        let mut chain = Vec::new();
        let mut current = self;
        while let Self::Failure {
            cause: Some(cause), ..
        } = current
        {
            chain.push(cause.as_ref());
            current = cause.as_ref();
        }
        chain
    }

    /// Errors inside an aggregate, or the error itself
    pub fn errors(&self) -> Vec<&EffectError> {
        match self {
            Self::Aggregate { errors, .. } => errors.iter().collect(),
            single => vec![single],
        }
    }

    /// Cancellation is never a plain failure; an aggregate containing one counts too
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::Aggregate { errors, .. } => errors.iter().any(EffectError::is_cancelled),
            _ => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True for terminal-state violations; an aggregate must consist only of them
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Closed { .. } => true,
            Self::Aggregate { errors, .. } => {
                !errors.is_empty() && errors.iter().all(EffectError::is_closed)
            }
            _ => false,
        }
    }

    /// Downcast a wrapped host error
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Exception { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Failure { message, .. } => message.clone(),
            Self::Cancelled { message, .. } => format!("Cancelled: {}", message),
            Self::Timeout {
                message, duration, ..
            } => format!("Timed out after {:?}: {}", duration, message),
            Self::Closed { message, .. } => format!("Closed: {}", message),
            Self::Exception { message, .. } => format!("Unexpected error: {}", message),
            Self::Aggregate { errors, .. } => errors
                .iter()
                .map(EffectError::user_message)
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    /// Get a developer-friendly error message with full chain
    pub fn developer_message(&self) -> String {
        let mut out = self.to_string();
        for cause in self.causes() {
            out.push_str(&format!("\n  caused by: {}", cause));
        }
        if let Self::Exception { source, .. } = self {
            let mut next = source.source();
            while let Some(inner) = next {
                out.push_str(&format!("\n  caused by: {}", inner));
                next = inner.source();
            }
        }
        out
    }
}

impl PartialEq for EffectError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Failure {
                    code: a,
                    message: m,
                    cause: c,
                },
                Self::Failure {
                    code: b,
                    message: n,
                    cause: d,
                },
            ) => a == b && m == n && c == d,
            (
                Self::Timeout {
                    code: a,
                    message: m,
                    duration: x,
                },
                Self::Timeout {
                    code: b,
                    message: n,
                    duration: y,
                },
            ) => a == b && m == n && x == y,
            (Self::Aggregate { errors: a, .. }, Self::Aggregate { errors: b, .. }) => a == b,
            (Self::Cancelled { .. }, Self::Cancelled { .. })
            | (Self::Closed { .. }, Self::Closed { .. })
            | (Self::Exception { .. }, Self::Exception { .. }) => {
                self.code() == other.code() && self.message() == other.message()
            }
            _ => false,
        }
    }
}

/// Type alias for Results using EffectError
pub type Result<T> = std::result::Result<T, EffectError>;

// Conversion from common error types

impl From<std::io::Error> for EffectError {
    fn from(err: std::io::Error) -> Self {
        let message = format!("I/O error ({:?}): {}", err.kind(), err);
        EffectError::exception_with_code(ErrorCode::EXCEPTION_IO, message, err)
    }
}

impl From<anyhow::Error> for EffectError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<EffectError>() {
            Ok(effect_error) => effect_error,
            Err(other) => {
                let message = format!("{:#}", other);
                let boxed: Box<dyn std::error::Error + Send + Sync> = other.into();
                EffectError::Exception {
                    code: ErrorCode::EXCEPTION_ANYHOW,
                    message,
                    source: Arc::from(boxed),
                }
            }
        }
    }
}

impl From<serde_yaml::Error> for EffectError {
    fn from(err: serde_yaml::Error) -> Self {
        EffectError::exception_with_code(
            ErrorCode::CONFIG_INVALID_YAML,
            format!("Invalid YAML syntax: {}", err),
            err,
        )
    }
}

impl From<toml::de::Error> for EffectError {
    fn from(err: toml::de::Error) -> Self {
        EffectError::exception_with_code(
            ErrorCode::CONFIG_INVALID_TOML,
            format!("Invalid TOML syntax: {}", err),
            err,
        )
    }
}
