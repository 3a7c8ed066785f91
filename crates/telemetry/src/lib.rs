//! Structured logging initialization and tracing-backed observers.

#![deny(unsafe_code)]

pub mod storage_observer;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

static INIT: OnceCell<()> = OnceCell::new();

/// Errors from telemetry wiring.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("subscriber setup failed: {0}")]
    Subscriber(String),
}

/// Initialize structured logging (JSON) with env filter. Idempotent.
/// Set RUST_LOG, e.g., "info,local_disk=debug".
pub fn init_json_logging() {
    INIT.get_or_init(|| {
        let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber).ok();
    });
}

/// Returns whether logging initialization has run.
pub fn is_initialized() -> bool {
    INIT.get().is_some()
}
