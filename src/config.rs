//! Configuration for the worker pool and scheduler.
//!
//! Follows the teacher's `Config::load()` pattern: plain `serde::Deserialize`
//! structs with field-level defaults, loadable from environment variables
//! through the `config` crate.

use serde::Deserialize;

/// Top-level configuration for a `jobforge` deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Config {
    /// Load configuration from environment variables prefixed `JOBFORGE__`,
    /// e.g. `JOBFORGE__WORKER_POOL__NUM_WORKERS=8`.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("JOBFORGE").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize().unwrap_or_else(|_| Config::default());
        Ok(cfg)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_pool: WorkerPoolConfig::default(),
            scheduler: SchedulerConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Configuration for [`crate::jobs::worker::WorkerPool`].
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerPoolConfig {
    /// Maximum concurrent in-flight job executions.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Name used in logs and metric labels for this pool.
    #[serde(default = "default_pool_name")]
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            name: default_pool_name(),
        }
    }
}

fn default_num_workers() -> usize {
    4
}

fn default_pool_name() -> String {
    "jobforge-worker-pool".to_string()
}

/// Configuration for [`crate::jobs::scheduler::Scheduler`].
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Whether the scheduler service should run at all.
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
        }
    }
}

fn default_scheduler_enabled() -> bool {
    true
}

/// Configuration for [`crate::jobs::backoff::BackoffPolicy`].
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_interval_ms: default_max_interval_ms(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_interval_ms() -> u64 {
    60_000
}
