pub mod recurrence;
pub mod service;

pub use recurrence::Recurrence;
pub use service::{Accuracy, Scheduler};
