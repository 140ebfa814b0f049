//! Tracing, Prometheus metrics and OpenTelemetry export.

pub mod metrics;
pub mod tracing;

pub use metrics::{
    record_auth_attempt, record_request_latency, record_reservation_outcome, AuthOutcome,
    MetricsState,
};
pub use tracing::init_telemetry;
