//! Evermark Telemetry - Observability Infrastructure
//!
//! Structured tracing and Prometheus metrics for the API and the season job.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, EvermarkMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracer, LogFormat, TelemetryConfig};
