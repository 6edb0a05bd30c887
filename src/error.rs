//! Error types for the job framework.
//!
//! Mirrors the taxonomy in the component design: decode failures and
//! unrecognised job ids are terminal, handler errors participate in
//! retry/backoff, and driver errors are logged but never retried by the
//! core itself.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate's own (non-handler) operations.
pub type Result<T> = std::result::Result<T, JobFrameworkError>;

/// Errors raised by the registry, the driver contract, or the pool itself.
///
/// Handler-originated failures are represented separately by
/// [`HandlerError`] since the core must distinguish "retryable" from
/// "terminal" without inspecting the handler's own error type.
#[derive(Debug, Error)]
pub enum JobFrameworkError {
    /// `decode` was asked to look up a job name that was never registered.
    #[error("unrecognised job id: {0}")]
    UnrecognisedJobId(String),

    /// A registered decoder failed to parse the payload bytes.
    #[error("failed to decode job parameters for '{name}': {source}")]
    DecodeJobFailed {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// `register` was called twice for the same job name.
    #[error("job '{0}' is already registered")]
    DuplicateRegistration(String),

    /// A failure surfaced by the queue driver itself (push, pull, finish, ...).
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// The envelope buffer produced by a driver could not be parsed at all
    /// (distinct from `DecodeJobFailed`, which is a parameter-decode failure
    /// for an otherwise well-formed envelope).
    #[error("malformed job envelope: {0}")]
    MalformedEnvelope(String),
}

/// Errors raised by a `QueueDriver` implementation.
///
/// The core never retries a `DriverError` itself — per the spec, the driver
/// is expected to be the retry locus for its own I/O.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{0}")]
    Message(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    pub fn message(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }
}

/// The error type a job handler's `execute` returns.
///
/// Carries a `retryable` flag so a handler can opt a specific failure out
/// of the retry/backoff loop (e.g. a validation error that will never
/// succeed on replay) without needing a distinct error type, mirroring
/// `JobError::retryable()` / `JobError::fatal()` in comparable frameworks.
#[derive(Debug)]
pub struct HandlerError {
    message: String,
    retryable: bool,
    cancellation: bool,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HandlerError {
    /// A transient failure that should participate in retry/backoff.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
            cancellation: false,
            source: None,
        }
    }

    /// A permanent failure; the job is marked failed on the first attempt.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
            cancellation: false,
            source: None,
        }
    }

    /// The job observed a cancellation signal and stopped; terminal, with
    /// its own metric status distinct from `failed`.
    pub fn cancelled() -> Self {
        Self {
            message: "job cancelled".to_string(),
            retryable: false,
            cancellation: true,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn is_cancellation(&self) -> bool {
        self.cancellation
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_defaults() {
        let err = HandlerError::retryable("timeout");
        assert!(err.is_retryable());
        assert!(!err.is_cancellation());
    }

    #[test]
    fn fatal_is_not_retryable() {
        let err = HandlerError::fatal("bad input");
        assert!(!err.is_retryable());
    }

    #[test]
    fn cancelled_is_terminal_and_flagged() {
        let err = HandlerError::cancelled();
        assert!(!err.is_retryable());
        assert!(err.is_cancellation());
    }
}
