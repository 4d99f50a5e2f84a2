//! Prometheus metrics for the peer search manager.
//!
//! Covers the search lifecycle (starts, finalizations by outcome, live
//! update coalescing, pruning), admission control, HTTP traffic and the
//! websocket transport.
//!
//! # Example
//! ```no_run
//! use peer_search_manager::metrics::{SEARCHES_FINALIZED_TOTAL};
//!
//! SEARCHES_FINALIZED_TOTAL.with_label_values(&["completed"]).inc();
//! ```

mod middleware;

pub use middleware::{MetricsLayer, MetricsService};

use lazy_static::lazy_static;
use once_cell::sync::OnceCell;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

const NAMESPACE: &str = "peer_search_manager";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Search Lifecycle Metrics
    // ============================================================================

    pub static ref SEARCHES_STARTED_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("searches_started_total", "Total number of searches dispatched")
            .namespace(NAMESPACE)
    ).expect("Failed to create SEARCHES_STARTED_TOTAL metric");

    /// Labels: outcome (completed, faulted, cancelled, rejected)
    pub static ref SEARCHES_FINALIZED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("searches_finalized_total", "Total number of finalized searches")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create SEARCHES_FINALIZED_TOTAL metric");

    pub static ref SEARCHES_ACTIVE: IntGauge = IntGauge::with_opts(
        Opts::new("searches_active", "Number of searches in flight")
            .namespace(NAMESPACE)
    ).expect("Failed to create SEARCHES_ACTIVE metric");

    /// Buckets: 0.1 .. 600 seconds
    pub static ref SEARCH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("search_duration_seconds", "Time from start to finalization")
            .namespace(NAMESPACE)
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0])
    ).expect("Failed to create SEARCH_DURATION_SECONDS metric");

    pub static ref SEARCH_RESPONSES_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("search_responses_total", "Total number of peer responses persisted")
            .namespace(NAMESPACE)
    ).expect("Failed to create SEARCH_RESPONSES_TOTAL metric");

    /// Labels: disposition (published, coalesced)
    pub static ref SEARCH_LIVE_UPDATES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("search_live_updates_total", "Response-driven live updates by disposition")
            .namespace(NAMESPACE),
        &["disposition"]
    ).expect("Failed to create SEARCH_LIVE_UPDATES_TOTAL metric");

    pub static ref SEARCHES_PRUNED_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("searches_pruned_total", "Total number of searches removed by pruning")
            .namespace(NAMESPACE)
    ).expect("Failed to create SEARCHES_PRUNED_TOTAL metric");

    /// Labels: decision (admitted, rejected)
    pub static ref ADMISSION_DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("admission_decisions_total", "Search API admission decisions")
            .namespace(NAMESPACE),
        &["decision"]
    ).expect("Failed to create ADMISSION_DECISIONS_TOTAL metric");

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    // ============================================================================
    // WebSocket Metrics
    // ============================================================================

    pub static ref WS_ACTIVE_CONNECTIONS: IntGauge = IntGauge::with_opts(
        Opts::new("ws_active_connections", "Number of open websocket connections")
            .namespace(NAMESPACE)
    ).expect("Failed to create WS_ACTIVE_CONNECTIONS metric");

    pub static ref WS_EVENTS_BROADCAST: IntCounter = IntCounter::with_opts(
        Opts::new("ws_events_broadcast_total", "Total number of events published")
            .namespace(NAMESPACE)
    ).expect("Failed to create WS_EVENTS_BROADCAST metric");

    pub static ref WS_EVENTS_DELIVERED: IntCounter = IntCounter::with_opts(
        Opts::new("ws_events_delivered_total", "Total number of events queued to connections")
            .namespace(NAMESPACE)
    ).expect("Failed to create WS_EVENTS_DELIVERED metric");
}

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Register every metric with [`PROMETHEUS_REGISTRY`].
///
/// Safe to call more than once; registration happens on the first call.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    INITIALIZED.get_or_try_init(register_all)?;
    Ok(())
}

fn register_all() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(SEARCHES_STARTED_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCHES_FINALIZED_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCHES_ACTIVE.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_RESPONSES_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_LIVE_UPDATES_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCHES_PRUNED_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(ADMISSION_DECISIONS_TOTAL.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(WS_ACTIVE_CONNECTIONS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(WS_EVENTS_BROADCAST.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(WS_EVENTS_DELIVERED.clone()))?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Render the registry in the Prometheus text exposition format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_gather_metrics() {
        init_metrics().unwrap();
        SEARCHES_STARTED_TOTAL.inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("peer_search_manager_searches_started_total"));
    }

    #[test]
    fn test_labelled_counters() {
        SEARCHES_FINALIZED_TOTAL
            .with_label_values(&["cancelled"])
            .inc();
        assert!(
            SEARCHES_FINALIZED_TOTAL
                .with_label_values(&["cancelled"])
                .get()
                >= 1
        );
    }
}
