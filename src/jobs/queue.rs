//! The queue driver contract and a thin producer-facing façade over it.
//!
//! Mirrors the teacher's `QueueBackend` trait shape (`jobs/queue.rs`): a
//! small `async_trait` interface kept dyn-safe by avoiding `Stream` in
//! favor of an explicit `next()` method, so drivers can be shared as
//! `Arc<dyn QueueDriver>` across the worker pool and scheduler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DriverError;
use crate::jobs::job::{JobId, JobRequest, QueuedJob};
use crate::metrics;

/// Capability set a queue implementation must provide. See the component
/// design for the guarantees expected of each operation (durability,
/// idempotence, at-least-once delivery).
#[async_trait]
pub trait QueueDriver: Send + Sync {
    /// Called exactly once, before the first `next()`.
    async fn on_init(&self) -> std::result::Result<(), DriverError>;

    /// Durable enqueue. Returns a stable, stringifiable id.
    async fn push(&self, request: JobRequest) -> std::result::Result<JobId, DriverError>;

    /// Pull the next ready envelope. Blocks until one is available.
    /// Returns `Ok(None)` only once `stop()` has been observed and the
    /// driver has finished draining — never speculatively.
    async fn next(&self) -> std::result::Result<Option<QueuedJob>, DriverError>;

    /// Mark a job as successfully completed. Idempotent.
    async fn finished(&self, id: &JobId) -> std::result::Result<(), DriverError>;

    /// Mark a job as terminally failed. Idempotent.
    async fn failed(&self, id: &JobId, error: &str) -> std::result::Result<(), DriverError>;

    /// Durable small key-value read, used by the scheduler for its cursor.
    async fn get_metadata(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, DriverError>;

    /// Durable small key-value write.
    async fn set_metadata(&self, key: &str, value: Vec<u8>) -> std::result::Result<(), DriverError>;

    /// Signal `next()` to stop accepting new jobs and begin draining.
    /// Called from the shutdown handler.
    fn stop(&self);

    /// Called once `next()` has returned `None` and all in-flight jobs
    /// have completed.
    async fn shutdown_gracefully(&self) -> std::result::Result<(), DriverError>;
}

/// Optional per-push overrides.
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Defer visibility to workers until this instant.
    pub delay_until: Option<DateTime<Utc>>,
}

impl PushOptions {
    pub fn delayed_until(at: DateTime<Utc>) -> Self {
        Self {
            delay_until: Some(at),
        }
    }
}

type PushHook = dyn Fn(&JobRequest) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync;

/// Producer-facing façade over an `Arc<dyn QueueDriver>`.
///
/// Carries an optional `on_push_job` hook invoked after every successful
/// push — a single closure rather than a middleware chain (see the Open
/// Questions record in the design notes), used by the bundled demo and
/// tests to observe pushes without touching the driver directly.
#[derive(Clone)]
pub struct JobQueue {
    driver: Arc<dyn QueueDriver>,
    on_push_job: Option<Arc<PushHook>>,
}

impl JobQueue {
    pub fn new(driver: Arc<dyn QueueDriver>) -> Self {
        Self {
            driver,
            on_push_job: None,
        }
    }

    /// Attach a hook run after every successful push, before `push()`
    /// returns the id to the caller.
    pub fn with_on_push_job<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(&JobRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_push_job = Some(Arc::new(move |req: &JobRequest| Box::pin(hook(req))));
        self
    }

    pub fn driver(&self) -> &Arc<dyn QueueDriver> {
        &self.driver
    }

    /// Enqueue a new job. Builds a fresh [`JobRequest`] with `attempts = 0`.
    pub async fn push(
        &self,
        name: impl Into<crate::jobs::job::JobIdentifier>,
        parameters: Vec<u8>,
        options: PushOptions,
    ) -> std::result::Result<JobId, DriverError> {
        let mut request = JobRequest::new(name, parameters);
        if let Some(delay_until) = options.delay_until {
            request = request.with_delay_until(delay_until);
        }

        let id = self.driver.push(request.clone()).await?;
        metrics::record_queued(request.name.as_str());

        if let Some(hook) = &self.on_push_job {
            hook(&request).await;
        }

        Ok(id)
    }
}
