//! The job framework: registry, backoff policy, driver contract, the
//! in-memory reference driver, the worker pool, and the scheduler.

pub mod backoff;
pub mod job;
pub mod memory;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod worker;

pub use backoff::BackoffPolicy;
pub use job::{HandlerResult, JobContext, JobId, JobIdentifier, JobRequest, QueuedJob};
pub use memory::InMemoryDriver;
pub use queue::{JobQueue, PushOptions, QueueDriver};
pub use registry::{DecodedJob, Invocable, JobDefinition, JobRegistry};
pub use scheduler::{Accuracy, Recurrence, Scheduler};
pub use worker::WorkerPool;
