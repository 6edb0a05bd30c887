//! Core job types: identifiers, the producer-side request, the
//! driver-produced envelope, and the per-invocation context.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;

/// `Ok(())` on success; `Err(HandlerError)` otherwise. The framework only
/// inspects `HandlerError::is_retryable()` / `is_cancellation()` — anything
/// else about a failure is opaque to it.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Opaque string tag naming a job type; unique within a [`JobRegistry`](crate::jobs::registry::JobRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobIdentifier(pub String);

impl JobIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobIdentifier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobIdentifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Driver-assigned, stringifiable job id. Concrete drivers may use a UUID,
/// a database row id, or anything else that round-trips through `String`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a producer pushes onto the queue. The driver persists this and
/// returns a [`JobId`]; the core later receives it back wrapped in a
/// [`QueuedJob`] envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub name: JobIdentifier,
    /// Opaque, registry-decodable payload bytes.
    pub parameters: Vec<u8>,
    pub queued_at: DateTime<Utc>,
    pub attempts: u32,
    pub delay_until: Option<DateTime<Utc>>,
}

impl JobRequest {
    /// Build a fresh request with `attempts = 0` and no delay, queued now.
    pub fn new(name: impl Into<JobIdentifier>, parameters: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            parameters,
            queued_at: Utc::now(),
            attempts: 0,
            delay_until: None,
        }
    }

    pub fn with_delay_until(mut self, at: DateTime<Utc>) -> Self {
        self.delay_until = Some(at);
        self
    }

    /// Build the re-push used by the retry path: same name, payload, and
    /// original `queued_at`, with `attempts` incremented and a fresh delay.
    pub fn next_attempt(&self, delay_until: DateTime<Utc>) -> Self {
        Self {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            queued_at: self.queued_at,
            attempts: self.attempts + 1,
            delay_until: Some(delay_until),
        }
    }

    pub fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        self.delay_until.map(|d| d > now).unwrap_or(false)
    }
}

/// The envelope a [`QueueDriver`](crate::jobs::queue::QueueDriver) hands back
/// through its iterator. `buffer` is the registry-decodable encoding of a
/// [`JobRequest`] (see the registry's envelope format).
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: JobId,
    pub buffer: Vec<u8>,
}

/// Per-invocation capability bag passed to a handler's `execute` call.
/// Lifetime is exactly one `execute` call.
pub struct JobContext {
    job_name: JobIdentifier,
    attempt: u32,
    cancellation: CancellationToken,
}

impl JobContext {
    pub fn new(job_name: JobIdentifier, attempt: u32, cancellation: CancellationToken) -> Self {
        Self {
            job_name,
            attempt,
            cancellation,
        }
    }

    pub fn job_name(&self) -> &JobIdentifier {
        &self.job_name
    }

    /// Number of `execute` invocations already made for this logical job,
    /// including this one (0-based: 0 on the first attempt).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Cooperative cancellation signal observed on graceful shutdown.
    /// Long-running handlers should `select!` against this and return
    /// `HandlerError::cancelled()` when it fires.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn log_info(&self, message: &str) {
        tracing::info!(job = %self.job_name, attempt = self.attempt, "{message}");
    }

    pub fn log_warn(&self, message: &str) {
        tracing::warn!(job = %self.job_name, attempt = self.attempt, "{message}");
    }

    pub fn log_error(&self, message: &str) {
        tracing::error!(job = %self.job_name, attempt = self.attempt, "{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_attempt_preserves_identity_and_bumps_attempts() {
        let original = JobRequest::new("send_email", b"{}".to_vec());
        let delay = Utc::now();
        let retry = original.next_attempt(delay);

        assert_eq!(retry.name, original.name);
        assert_eq!(retry.parameters, original.parameters);
        assert_eq!(retry.queued_at, original.queued_at);
        assert_eq!(retry.attempts, 1);
        assert_eq!(retry.delay_until, Some(delay));
    }

    #[test]
    fn is_delayed_reflects_delay_until() {
        let now = Utc::now();
        let future = JobRequest::new("x", vec![]).with_delay_until(now + chrono::Duration::seconds(5));
        assert!(future.is_delayed(now));

        let past = JobRequest::new("x", vec![]).with_delay_until(now - chrono::Duration::seconds(5));
        assert!(!past.is_delayed(now));
    }
}
