//! Prometheus metrics for broadcast intake.
//!
//! All metrics follow the naming convention: `orderer_broadcast_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Messages handled, by message kind and response status
    pub static ref BROADCAST_MESSAGES: CounterVec = CounterVec::new(
        Opts::new("orderer_broadcast_messages_total", "Broadcast messages answered"),
        &["kind", "status"]  // kind: normal/config_update/unknown
    ).expect("metric creation failed");

    /// Sessions currently being served
    pub static ref BROADCAST_SESSIONS_ACTIVE: Gauge = Gauge::new(
        "orderer_broadcast_sessions_active",
        "Number of broadcast sessions currently open"
    ).expect("metric creation failed");

    /// Finished sessions, by outcome
    pub static ref BROADCAST_SESSIONS: CounterVec = CounterVec::new(
        Opts::new("orderer_broadcast_sessions_total", "Broadcast sessions finished"),
        &["outcome"]  // outcome: hangup/rejected/transport_error/cancelled
    ).expect("metric creation failed");

    /// Time spent in consensus submission
    pub static ref BROADCAST_SUBMIT_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "orderer_broadcast_submit_duration_seconds",
            "Time spent handing messages to consensus"
        ).buckets(exponential_buckets(0.0001, 2.0, 16).expect("valid buckets")),
        &["kind"]
    ).expect("metric creation failed");
}

/// Handle onto the registered metrics.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    registry: Registry,
}

impl MetricsHandle {
    /// Encode all registered metrics in the Prometheus text format.
    pub fn gather_text(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }
}

/// Register all metrics with the global registry.
///
/// Calling this more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BROADCAST_MESSAGES.clone()),
        Box::new(BROADCAST_SESSIONS_ACTIVE.clone()),
        Box::new(BROADCAST_SESSIONS.clone()),
        Box::new(BROADCAST_SUBMIT_DURATION.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: REGISTRY.clone(),
    })
}

/// Record one answered message.
pub fn record_message(kind: &str, status: &str) {
    BROADCAST_MESSAGES.with_label_values(&[kind, status]).inc();
}

/// Record a finished session.
pub fn record_session(outcome: &str) {
    BROADCAST_SESSIONS.with_label_values(&[outcome]).inc();
}

/// Observe a submission duration in seconds.
pub fn observe_submit(kind: &str, seconds: f64) {
    BROADCAST_SUBMIT_DURATION
        .with_label_values(&[kind])
        .observe(seconds);
}

/// Keeps the active-session gauge raised while alive.
pub struct ActiveSessionGuard(());

impl ActiveSessionGuard {
    pub fn new() -> Self {
        BROADCAST_SESSIONS_ACTIVE.inc();
        Self(())
    }
}

impl Default for ActiveSessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ActiveSessionGuard {
    fn drop(&mut self) {
        BROADCAST_SESSIONS_ACTIVE.dec();
    }
}
