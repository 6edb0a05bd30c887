//! # jobforge
//!
//! A concurrent worker pool and cron-style scheduler for background jobs,
//! built against a pluggable [`jobs::queue::QueueDriver`].
//!
//! ## Architecture
//!
//! - **Registry**: maps job names to typed decoders/handlers; the crate's
//!   sole polymorphism seam.
//! - **Worker Pool**: drives bounded-concurrency execution with retry via
//!   re-enqueue and full-jitter backoff.
//! - **Scheduler**: fires recurring jobs onto the same queue, replaying
//!   missed firings from a persisted cursor on restart.
//! - **In-memory driver**: a `QueueDriver` implementation for tests, the
//!   bundled demo, and adopters without a production backend yet.
//! - **Telemetry**: `tracing`-based logging bootstrap and a `metrics`
//!   wrapper for job status transitions.

pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod telemetry;

pub use error::{DriverError, HandlerError, JobFrameworkError, Result};

/// Re-export of the commonly used types for building a job producer or
/// consumer without reaching into submodules.
pub mod prelude {
    pub use crate::config::{BackoffConfig, Config, SchedulerConfig, WorkerPoolConfig};
    pub use crate::error::{DriverError, HandlerError, JobFrameworkError, Result};
    pub use crate::jobs::backoff::BackoffPolicy;
    pub use crate::jobs::job::{JobContext, JobId, JobIdentifier, JobRequest, QueuedJob};
    pub use crate::jobs::memory::InMemoryDriver;
    pub use crate::jobs::queue::{JobQueue, PushOptions, QueueDriver};
    pub use crate::jobs::registry::{JobDefinition, JobRegistry};
    pub use crate::jobs::scheduler::{Accuracy, Recurrence, Scheduler};
    pub use crate::jobs::worker::WorkerPool;
}
