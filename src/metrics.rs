//! Metrics emitted on every job status transition.
//!
//! Thin wrapper functions around the `metrics` facade macros, following the
//! wrapper-function style of the teacher's `telemetry::metrics` module
//! without its Prometheus-exporter machinery (out of scope here — the
//! embedding application picks its own exporter).

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Record the worker pool's configured concurrency at startup.
pub fn record_worker_count(num_workers: usize) {
    gauge!("workers").set(num_workers as f64);
}

/// A job entered the `queued` state (initial push or re-push after retry).
pub fn record_queued(name: &str) {
    gauge!("jobs.meter", "status" => "queued", "name" => name.to_string()).increment(1.0);
}

/// A job left the `queued` state and entered `processing`.
pub fn record_processing_start(name: &str) {
    gauge!("jobs.meter", "status" => "queued", "name" => name.to_string()).decrement(1.0);
    gauge!("jobs.meter", "status" => "processing", "name" => name.to_string()).increment(1.0);
}

/// A job left the `processing` state, regardless of outcome.
pub fn record_processing_end(name: &str) {
    gauge!("jobs.meter", "status" => "processing", "name" => name.to_string()).decrement(1.0);
}

/// How long a job waited in the queue before its first execution started.
pub fn record_queued_for(name: &str, waited: Duration) {
    histogram!("jobs.queued_for_duration_seconds", "name" => name.to_string())
        .record(waited.as_secs_f64());
}

/// A terminal status transition: `succeeded`, `failed`, `cancelled`, or
/// `retried`. Increments the counter and records the execution duration.
pub fn record_terminal(name: &str, status: &'static str, duration: Duration) {
    counter!("jobs", "name" => name.to_string(), "status" => status).increment(1);
    histogram!("jobs.duration", "name" => name.to_string(), "status" => status)
        .record(duration.as_secs_f64());
}
