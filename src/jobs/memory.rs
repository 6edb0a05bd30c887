//! In-memory reference [`QueueDriver`]: an mpsc channel for ready jobs, a
//! mutex-guarded binary heap for delayed jobs drained by a background
//! ticker, and a `DashMap` metadata KV.
//!
//! Generalizes the teacher's `InMemoryQueueBackend` (itself a `BinaryHeap`
//! priority queue) to also honor `delay_until` and the metadata KV the
//! scheduler needs — neither of which the teacher's original backend had.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};

use crate::error::DriverError;
use crate::jobs::job::{JobId, JobRequest, QueuedJob};
use crate::jobs::queue::QueueDriver;

const TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Terminal status recorded for a job id, observable via [`InMemoryDriver::status`].
/// Exists only to make driver-level invariants assertable in tests; a real
/// driver would persist this to its backing store instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Finished,
    Failed(String),
}

struct DelayedEntry {
    delay_until: chrono::DateTime<Utc>,
    job: QueuedJob,
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.delay_until == other.delay_until
    }
}
impl Eq for DelayedEntry {}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the earliest `delay_until` first.
        other.delay_until.cmp(&self.delay_until)
    }
}

/// A `QueueDriver` suitable for tests, doctests, and the bundled demo.
/// Not durable: all state is lost on process exit.
///
/// There is no separate background ticker task: `next()` drains due
/// delayed entries itself on every poll, which is enough for a reference
/// driver and avoids needing a `'static` self-reference to spawn one from
/// `on_init`.
pub struct InMemoryDriver {
    tx: mpsc::UnboundedSender<QueuedJob>,
    rx: Mutex<mpsc::UnboundedReceiver<QueuedJob>>,
    delayed: Mutex<BinaryHeap<DelayedEntry>>,
    metadata: DashMap<String, Vec<u8>>,
    status: DashMap<String, JobStatus>,
    stop: Arc<AtomicBool>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            delayed: Mutex::new(BinaryHeap::new()),
            metadata: DashMap::new(),
            status: DashMap::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Test/demo helper: inspect the recorded terminal status for an id.
    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.status.get(&id.0).map(|entry| entry.clone())
    }

    pub fn pending_delayed_count(&self) -> usize {
        // best-effort; only used by tests, a blocking lock is acceptable there
        self.delayed.try_lock().map(|heap| heap.len()).unwrap_or(0)
    }
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueDriver for InMemoryDriver {
    async fn on_init(&self) -> std::result::Result<(), DriverError> {
        Ok(())
    }

    async fn push(&self, request: JobRequest) -> std::result::Result<JobId, DriverError> {
        let id = JobId::new(uuid::Uuid::new_v4().to_string());
        let buffer = serde_json::to_vec(&request)
            .map_err(|err| DriverError::message(format!("failed to encode envelope: {err}")))?;
        let queued = QueuedJob {
            id: id.clone(),
            buffer,
        };

        let now = Utc::now();
        match request.delay_until {
            Some(delay_until) if delay_until > now => {
                self.delayed.lock().await.push(DelayedEntry {
                    delay_until,
                    job: queued,
                });
            }
            _ => {
                self.tx
                    .send(queued)
                    .map_err(|_| DriverError::message("in-memory driver receiver dropped"))?;
            }
        }

        Ok(id)
    }

    async fn next(&self) -> std::result::Result<Option<QueuedJob>, DriverError> {
        loop {
            self.drain_due_delayed().await;

            let mut rx = self.rx.lock().await;
            match rx.try_recv() {
                Ok(job) => return Ok(Some(job)),
                Err(mpsc::error::TryRecvError::Disconnected) => return Ok(None),
                Err(mpsc::error::TryRecvError::Empty) => {
                    if self.stop.load(AtomicOrdering::SeqCst) && self.delayed.lock().await.is_empty() {
                        return Ok(None);
                    }
                    drop(rx);
                    tokio::time::sleep(TICK_INTERVAL).await;
                }
            }
        }
    }

    async fn finished(&self, id: &JobId) -> std::result::Result<(), DriverError> {
        self.status.insert(id.0.clone(), JobStatus::Finished);
        Ok(())
    }

    async fn failed(&self, id: &JobId, error: &str) -> std::result::Result<(), DriverError> {
        self.status
            .insert(id.0.clone(), JobStatus::Failed(error.to_string()));
        Ok(())
    }

    async fn get_metadata(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, DriverError> {
        Ok(self.metadata.get(key).map(|v| v.clone()))
    }

    async fn set_metadata(&self, key: &str, value: Vec<u8>) -> std::result::Result<(), DriverError> {
        self.metadata.insert(key.to_string(), value);
        Ok(())
    }

    fn stop(&self) {
        self.stop.store(true, AtomicOrdering::SeqCst);
    }

    async fn shutdown_gracefully(&self) -> std::result::Result<(), DriverError> {
        Ok(())
    }
}

impl InMemoryDriver {
    async fn drain_due_delayed(&self) {
        let now = Utc::now();
        let mut delayed = self.delayed.lock().await;
        while let Some(top) = delayed.peek() {
            if top.delay_until > now {
                break;
            }
            let entry = delayed.pop().expect("peeked entry must pop");
            // Best-effort: if the receiver is gone the driver is shutting down.
            let _ = self.tx.send(entry.job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_next_round_trips_ready_job() {
        let driver = InMemoryDriver::new();
        driver.on_init().await.unwrap();

        let id = driver
            .push(JobRequest::new("send_email", b"{}".to_vec()))
            .await
            .unwrap();

        let job = driver.next().await.unwrap().expect("job should be ready");
        assert_eq!(job.id, id);
    }

    #[tokio::test]
    async fn delayed_job_is_not_delivered_until_due() {
        let driver = InMemoryDriver::new();
        driver.on_init().await.unwrap();

        let future = Utc::now() + chrono::Duration::milliseconds(60);
        driver
            .push(JobRequest::new("send_email", vec![]).with_delay_until(future))
            .await
            .unwrap();

        assert_eq!(driver.pending_delayed_count(), 1);

        let job = driver.next().await.unwrap().expect("job should arrive once due");
        let request: JobRequest = serde_json::from_slice(&job.buffer).unwrap();
        assert_eq!(request.name.as_str(), "send_email");
    }

    #[tokio::test]
    async fn finished_and_failed_record_status() {
        let driver = InMemoryDriver::new();
        let id = JobId::new("abc");

        driver.finished(&id).await.unwrap();
        assert_eq!(driver.status(&id), Some(JobStatus::Finished));

        driver.failed(&id, "boom").await.unwrap();
        assert_eq!(driver.status(&id), Some(JobStatus::Failed("boom".to_string())));
    }

    #[tokio::test]
    async fn metadata_roundtrips() {
        let driver = InMemoryDriver::new();
        assert_eq!(driver.get_metadata("jobScheduleLastDate").await.unwrap(), None);

        driver
            .set_metadata("jobScheduleLastDate", b"2026-01-01T00:00:00Z".to_vec())
            .await
            .unwrap();

        assert_eq!(
            driver.get_metadata("jobScheduleLastDate").await.unwrap(),
            Some(b"2026-01-01T00:00:00Z".to_vec())
        );
    }

    #[tokio::test]
    async fn stop_drains_then_returns_none() {
        let driver = InMemoryDriver::new();
        driver.on_init().await.unwrap();
        driver.stop();
        let result = driver.next().await.unwrap();
        assert!(result.is_none());
    }
}
