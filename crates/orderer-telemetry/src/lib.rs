//! # Orderer Telemetry
//!
//! Ambient observability for the orderer workspace.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` registry with an `EnvFilter` and a JSON
//!   or human-readable `fmt` layer
//! - **Metrics**: Prometheus counters, gauges and histograms for broadcast
//!   intake
//!
//! ## Usage
//!
//! ```rust,ignore
//! use orderer_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! let _guard = init_telemetry(&config).expect("Failed to init telemetry");
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `orderer` | Service name attached to log lines |
//! | `ORDERER_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `ORDERER_JSON_LOGS` | `true` in containers | Emit JSON formatted logs |
//! | `ORDERER_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    register_metrics, MetricsHandle, BROADCAST_MESSAGES, BROADCAST_SESSIONS,
    BROADCAST_SESSIONS_ACTIVE, BROADCAST_SUBMIT_DURATION,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and register metrics.
///
/// The returned guard keeps the metrics registry handle alive.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(config)?;

    Ok(TelemetryGuard { metrics })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    metrics: MetricsHandle,
}

impl TelemetryGuard {
    /// Metrics handle for exposition.
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}
