//! Prometheus Metrics Definitions
//!
//! Defines the Evermark metrics and exposes a /metrics endpoint for
//! Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Database operation latency buckets (seconds)
const DB_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0];

/// Aggregation run latency buckets (seconds)
const RUN_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance - initialized once on first use
pub static METRICS: Lazy<ApiResult<EvermarkMetrics>> = Lazy::new(EvermarkMetrics::new);

/// The registered metrics, or `None` if registration failed.
///
/// Registration failure is logged once and never fails a request.
pub fn metrics() -> Option<&'static EvermarkMetrics> {
    match METRICS.as_ref() {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            static LOGGED: std::sync::Once = std::sync::Once::new();
            LOGGED.call_once(|| tracing::error!(error = %e.message, "Metrics registration failed"));
            None
        }
    }
}

fn register_err(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Container for all Evermark metrics.
#[derive(Clone)]
pub struct EvermarkMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Database operation counter - labels: operation, entity, status
    pub db_operations_total: CounterVec,

    /// Database operation duration histogram - labels: operation, entity
    pub db_operation_duration_seconds: HistogramVec,

    /// Aggregation runs - labels: trigger, outcome
    pub aggregation_runs_total: CounterVec,

    /// Aggregation run duration - labels: trigger
    pub aggregation_duration_seconds: HistogramVec,

    pub leaderboard_entries_written_total: Counter,
    pub dangling_references_total: Counter,
    pub self_votes_excluded_total: Counter,
    pub votes_read_total: Counter,

    /// Season number derived at the last refresh
    pub current_season: Gauge,

    pub season_transitions_total: Counter,
}

impl EvermarkMetrics {
    /// Create and register all metrics with the default Prometheus registry.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "evermark_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| register_err("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "evermark_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| register_err("http_request_duration_seconds", e))?,

            db_operations_total: register_counter_vec!(
                "evermark_db_operations_total",
                "Total number of database operations",
                &["operation", "entity", "status"]
            )
            .map_err(|e| register_err("db_operations_total", e))?,

            db_operation_duration_seconds: register_histogram_vec!(
                "evermark_db_operation_duration_seconds",
                "Database operation duration in seconds",
                &["operation", "entity"],
                DB_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| register_err("db_operation_duration_seconds", e))?,

            aggregation_runs_total: register_counter_vec!(
                "evermark_aggregation_runs_total",
                "Leaderboard aggregation runs by trigger and outcome",
                &["trigger", "outcome"]
            )
            .map_err(|e| register_err("aggregation_runs_total", e))?,

            aggregation_duration_seconds: register_histogram_vec!(
                "evermark_aggregation_duration_seconds",
                "Leaderboard aggregation run duration in seconds",
                &["trigger"],
                RUN_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| register_err("aggregation_duration_seconds", e))?,

            leaderboard_entries_written_total: register_counter!(
                "evermark_leaderboard_entries_written_total",
                "Leaderboard entries written by committed runs"
            )
            .map_err(|e| register_err("leaderboard_entries_written_total", e))?,

            dangling_references_total: register_counter!(
                "evermark_dangling_references_total",
                "Votes skipped because their item no longer exists"
            )
            .map_err(|e| register_err("dangling_references_total", e))?,

            self_votes_excluded_total: register_counter!(
                "evermark_self_votes_excluded_total",
                "Votes excluded because the voter owns the item"
            )
            .map_err(|e| register_err("self_votes_excluded_total", e))?,

            votes_read_total: register_counter!(
                "evermark_votes_read_total",
                "Ledger votes read by aggregation runs"
            )
            .map_err(|e| register_err("votes_read_total", e))?,

            current_season: register_gauge!(
                "evermark_current_season",
                "Season number derived at the last refresh"
            )
            .map_err(|e| register_err("current_season", e))?,

            season_transitions_total: register_counter!(
                "evermark_season_transitions_total",
                "Season transitions handled by the refresh job"
            )
            .map_err(|e| register_err("season_transitions_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a database operation.
    pub fn record_db_operation(
        &self,
        operation: &str,
        entity: &str,
        success: bool,
        duration_secs: f64,
    ) {
        let status = if success { "success" } else { "error" };
        self.db_operations_total
            .with_label_values(&[operation, entity, status])
            .inc();
        self.db_operation_duration_seconds
            .with_label_values(&[operation, entity])
            .observe(duration_secs);
    }

    /// Record the outcome of one aggregation run.
    pub fn record_aggregation_run(&self, trigger: &str, outcome: &str, duration_secs: f64) {
        self.aggregation_runs_total
            .with_label_values(&[trigger, outcome])
            .inc();
        self.aggregation_duration_seconds
            .with_label_values(&[trigger])
            .observe(duration_secs);
    }

    /// Record the counts of a committed run.
    pub fn record_run_counts(
        &self,
        entries_written: usize,
        dangling: usize,
        self_votes: usize,
        votes_read: usize,
    ) {
        self.leaderboard_entries_written_total.inc_by(entries_written as f64);
        self.dangling_references_total.inc_by(dangling as f64);
        self.self_votes_excluded_total.inc_by(self_votes as f64);
        self.votes_read_total.inc_by(votes_read as f64);
    }

    pub fn set_current_season(&self, season: u32) {
        self.current_season.set(f64::from(season));
    }

    pub fn record_season_transition(&self) {
        self.season_transitions_total.inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    // Make sure the Evermark collectors are registered before gathering.
    let _ = metrics();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_http_request() -> Result<(), String> {
        let metrics = metrics().ok_or("metrics not registered")?;
        metrics.record_http_request("GET", "/leaderboard", 200, 0.015);
        Ok(())
    }

    #[test]
    fn test_record_aggregation_run() -> Result<(), String> {
        let metrics = metrics().ok_or("metrics not registered")?;
        let before = metrics.leaderboard_entries_written_total.get();
        metrics.record_aggregation_run("manual", "success", 0.2);
        metrics.record_run_counts(3, 1, 2, 10);
        assert!(metrics.leaderboard_entries_written_total.get() >= before + 3.0);
        Ok(())
    }

    #[test]
    fn test_current_season_gauge() -> Result<(), String> {
        let metrics = metrics().ok_or("metrics not registered")?;
        metrics.set_current_season(7);
        metrics.record_season_transition();
        Ok(())
    }
}
