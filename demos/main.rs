//! jobforge demo: registers a couple of jobs, starts the worker pool and
//! the scheduler side by side against the in-memory driver, and shuts
//! both down gracefully on Ctrl-C.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jobforge::prelude::*;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SendEmail {
    to: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    jobforge::telemetry::init_tracing(false);

    let config = Config::load().unwrap_or_default();

    let driver: Arc<dyn QueueDriver> = Arc::new(InMemoryDriver::new());
    let queue = JobQueue::new(driver.clone());

    let mut registry = JobRegistry::new();
    let sent = Arc::new(AtomicUsize::new(0));
    let sent_for_handler = sent.clone();

    registry.register(JobDefinition::json(
        "send_email",
        3,
        move |params: SendEmail, ctx: JobContext| {
            let sent = sent_for_handler.clone();
            async move {
                ctx.log_info(&format!("sending email to {}", params.to));
                sent.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        },
    ))?;

    let pool = WorkerPool::new(
        config.worker_pool.clone(),
        Arc::new(registry),
        driver.clone(),
        BackoffPolicy::from(&config.backoff),
    );

    let mut scheduler = Scheduler::new(queue.clone());
    scheduler.add_job(
        "send_email",
        serde_json::to_vec(&SendEmail {
            to: "digest@example.com".to_string(),
        })?,
        Recurrence::EveryMinute { second: 0 },
        Accuracy::Latest,
    );

    queue
        .push(
            "send_email",
            serde_json::to_vec(&SendEmail {
                to: "welcome@example.com".to_string(),
            })?,
            PushOptions::default(),
        )
        .await?;

    let pool_token = pool.cancellation_token();
    let scheduler_token = scheduler.cancellation_token();

    let pool_handle = tokio::spawn(async move { pool.run().await });
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = tokio::time::sleep(Duration::from_secs(5)) => {
            tracing::info!("demo timeout reached, shutting down");
        }
    }

    pool_token.cancel();
    scheduler_token.cancel();

    pool_handle.await??;
    scheduler_handle.await??;

    tracing::info!(emails_sent = sent.load(Ordering::SeqCst), "demo complete");

    Ok(())
}
