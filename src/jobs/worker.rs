//! The worker pool: pulls envelopes off a [`QueueDriver`] and runs them
//! through the [`JobRegistry`] with bounded concurrency.
//!
//! Grounded on the teacher's `orchestrator::WorkerPool` / `WorkerPermit`
//! acquire-then-spawn idiom (`orchestrator/worker_pool.rs`): a
//! `tokio::sync::Semaphore` bounds in-flight work, a permit is held for
//! the lifetime of one job and released on drop. Shutdown uses
//! `tokio::select!` against a `CancellationToken` the way the teacher's
//! `jobs` module races its own shutdown signal against blocking work.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerPoolConfig;
use crate::error::{JobFrameworkError, Result};
use crate::jobs::backoff::BackoffPolicy;
use crate::jobs::job::{JobContext, JobRequest, QueuedJob};
use crate::jobs::queue::QueueDriver;
use crate::jobs::registry::JobRegistry;
use crate::metrics;

/// Runs registered job handlers against a driver with up to
/// `config.num_workers` concurrent in-flight executions.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    registry: Arc<JobRegistry>,
    driver: Arc<dyn QueueDriver>,
    backoff: BackoffPolicy,
    cancellation: CancellationToken,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        registry: Arc<JobRegistry>,
        driver: Arc<dyn QueueDriver>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            config,
            registry,
            driver,
            backoff,
            cancellation: CancellationToken::new(),
        }
    }

    /// Clone of the token that, when cancelled, triggers graceful
    /// shutdown: `driver.stop()` is called and no new envelopes are
    /// pulled, but in-flight jobs run to completion.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Drive the pool until the driver's iterator is exhausted (normally
    /// only after `stop()` has been observed), then call
    /// `shutdown_gracefully()`.
    pub async fn run(&self) -> Result<()> {
        self.driver.on_init().await.map_err(JobFrameworkError::Driver)?;
        metrics::record_worker_count(self.config.num_workers);

        let semaphore = Arc::new(Semaphore::new(self.config.num_workers.max(1)));
        let mut in_flight = JoinSet::new();

        loop {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let pulled = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    self.driver.stop();
                    drop(permit);
                    break;
                }
                pulled = self.driver.next() => pulled,
            };

            let job = match pulled.map_err(JobFrameworkError::Driver)? {
                Some(job) => job,
                None => {
                    drop(permit);
                    break;
                }
            };

            let registry = self.registry.clone();
            let driver = self.driver.clone();
            let backoff = self.backoff.clone();
            let cancellation = self.cancellation.clone();

            in_flight.spawn(async move {
                run_job(job, registry, driver, backoff, cancellation).await;
                drop(permit);
            });
        }

        while in_flight.join_next().await.is_some() {}

        self.driver
            .shutdown_gracefully()
            .await
            .map_err(JobFrameworkError::Driver)?;

        Ok(())
    }
}

fn parse_envelope(buffer: &[u8]) -> std::result::Result<JobRequest, JobFrameworkError> {
    serde_json::from_slice(buffer)
        .map_err(|err| JobFrameworkError::MalformedEnvelope(err.to_string()))
}

async fn run_job(
    job: QueuedJob,
    registry: Arc<JobRegistry>,
    driver: Arc<dyn QueueDriver>,
    backoff: BackoffPolicy,
    cancellation: CancellationToken,
) {
    let start = Instant::now();

    let request = match parse_envelope(&job.buffer) {
        Ok(request) => request,
        Err(err) => {
            warn_on_mark_failed(driver.failed(&job.id, &err.to_string()).await, &job.id);
            return;
        }
    };

    metrics::record_processing_start(request.name.as_str());
    let _processing_guard = ProcessingGuard {
        name: request.name.as_str().to_string(),
    };

    // Resolve the handler (name lookup) and decode its parameters before
    // anything else, including the delay check below: a malformed payload
    // must be caught and reported once, not re-queued on every poll until
    // its delay lapses.
    let invocable = match registry.decode(&request.name, request.parameters.clone()) {
        Ok(invocable) => invocable,
        Err(err) => {
            warn_on_mark_failed(driver.failed(&job.id, &err.to_string()).await, &job.id);
            metrics::record_terminal(request.name.as_str(), "failed", start.elapsed());
            return;
        }
    };

    let max_retry_count = invocable.max_retry_count();
    let decoded = match invocable.decode_parameters() {
        Ok(decoded) => decoded,
        Err(err) => {
            warn_on_mark_failed(driver.failed(&job.id, &err.to_string()).await, &job.id);
            metrics::record_terminal(request.name.as_str(), "failed", start.elapsed());
            return;
        }
    };

    let now = Utc::now();
    if request.is_delayed(now) {
        // Not yet due: re-push unchanged rather than holding a worker slot.
        if let Err(err) = driver.push(request.clone()).await {
            tracing::warn!(job_id = %job.id, error = %err, "failed to re-push delayed job");
        } else {
            metrics::record_queued(request.name.as_str());
        }
        return;
    }

    metrics::record_queued_for(request.name.as_str(), (now - request.queued_at).to_std().unwrap_or_default());

    let ctx = JobContext::new(request.name.clone(), request.attempts, cancellation);
    let outcome = decoded.invoke(ctx).await;

    match outcome {
        Ok(()) => {
            warn_on_mark_finished(driver.finished(&job.id).await, &job.id);
            metrics::record_terminal(request.name.as_str(), "succeeded", start.elapsed());
        }
        Err(handler_err) if handler_err.is_cancellation() => {
            warn_on_mark_failed(driver.failed(&job.id, &handler_err.to_string()).await, &job.id);
            metrics::record_terminal(request.name.as_str(), "cancelled", start.elapsed());
        }
        Err(handler_err) => {
            if handler_err.is_retryable() && request.attempts < max_retry_count {
                let next_attempt = request.attempts + 1;
                let mut rng = fastrand::Rng::new();
                let delay = backoff.delay_for_attempt(next_attempt, &mut rng);
                let delay_until = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

                let retry = request.next_attempt(delay_until);
                if let Err(err) = driver.push(retry).await {
                    tracing::warn!(job_id = %job.id, error = %err, "failed to re-push retrying job");
                } else {
                    metrics::record_queued(request.name.as_str());
                }
                metrics::record_terminal(request.name.as_str(), "retried", start.elapsed());
            } else {
                warn_on_mark_failed(driver.failed(&job.id, &handler_err.to_string()).await, &job.id);
                metrics::record_terminal(request.name.as_str(), "failed", start.elapsed());
            }
        }
    }
}

fn warn_on_mark_finished(result: std::result::Result<(), crate::error::DriverError>, id: &crate::jobs::job::JobId) {
    if let Err(err) = result {
        tracing::warn!(job_id = %id, error = %err, "driver failed to record job as finished");
    }
}

fn warn_on_mark_failed(result: std::result::Result<(), crate::error::DriverError>, id: &crate::jobs::job::JobId) {
    if let Err(err) = result {
        tracing::warn!(job_id = %id, error = %err, "driver failed to record job as failed");
    }
}

/// Ensures `jobs.meter{status=processing}` is decremented on every exit
/// path out of `run_job`, including early returns.
struct ProcessingGuard {
    name: String,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        metrics::record_processing_end(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::jobs::memory::InMemoryDriver;
    use crate::jobs::registry::JobDefinition;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_config(num_workers: usize) -> WorkerPoolConfig {
        WorkerPoolConfig {
            num_workers,
            name: "test-pool".to_string(),
        }
    }

    #[tokio::test]
    async fn successful_job_is_marked_finished() {
        let driver = Arc::new(InMemoryDriver::new());
        let driver_dyn: Arc<dyn QueueDriver> = driver.clone();
        let mut registry = JobRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        registry
            .register(JobDefinition::json(
                "noop",
                0,
                move |_params: serde_json::Value, _ctx: JobContext| {
                    let calls = calls_clone.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
            ))
            .unwrap();

        let id = driver_dyn
            .push(JobRequest::new("noop", b"{}".to_vec()))
            .await
            .unwrap();

        let pool = WorkerPool::new(
            test_config(2),
            Arc::new(registry),
            driver_dyn.clone(),
            BackoffPolicy::default(),
        );
        let token = pool.cancellation_token();

        let run_handle = tokio::spawn(async move { pool.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        run_handle.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(driver.status(&id), Some(crate::jobs::memory::JobStatus::Finished));
    }

    #[tokio::test]
    async fn retryable_failure_is_requeued_with_backoff() {
        let driver = Arc::new(InMemoryDriver::new());
        let driver_dyn: Arc<dyn QueueDriver> = driver.clone();
        let mut registry = JobRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        registry
            .register(JobDefinition::json(
                "flaky",
                3,
                move |_params: serde_json::Value, _ctx: JobContext| {
                    let calls = calls_clone.clone();
                    async move {
                        let attempt = calls.fetch_add(1, Ordering::SeqCst);
                        if attempt == 0 {
                            Err(HandlerError::retryable("transient"))
                        } else {
                            Ok(())
                        }
                    }
                },
            ))
            .unwrap();

        driver_dyn
            .push(JobRequest::new("flaky", b"{}".to_vec()))
            .await
            .unwrap();

        let pool = WorkerPool::new(
            test_config(1),
            Arc::new(registry),
            driver_dyn.clone(),
            BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(5)),
        );
        let token = pool.cancellation_token();

        let run_handle = tokio::spawn(async move { pool.run().await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        run_handle.await.unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
