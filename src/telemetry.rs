//! Logging bootstrap.
//!
//! A reduced form of the teacher's `observability::init`: this crate only
//! owns the ambient concern of wiring `tracing-subscriber`, not exporting
//! to any particular backend (OTLP, Prometheus scrape, ...) — those are
//! the embedding application's job per the spec's scope.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize a process-global `tracing` subscriber.
///
/// `json` selects JSON-formatted output (suited to log aggregators) over
/// human-readable pretty output (suited to local development). Safe to
/// call once per process; a second call is a no-op error that callers may
/// ignore.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(err) = result {
        tracing::debug!("tracing subscriber already initialized: {err}");
    }
}
