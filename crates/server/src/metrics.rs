//! Prometheus metrics for the indexer.
//!
//! Counters track lease acquisitions and crawl outcomes; the gauge and
//! histogram describe tag crawls in flight. The `/metrics` endpoint is
//! unauthenticated and should only be reachable by the scraper.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Lease metrics
pub static GLOBAL_LEASE_ACQUIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "modindex_global_lease_acquired_total",
        "Total number of times the all-repos lease was acquired",
    )
    .expect("metric creation failed")
});

pub static REPO_LEASE_ACQUIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "modindex_repo_lease_acquired_total",
        "Total number of repository leases acquired",
    )
    .expect("metric creation failed")
});

// Crawl outcome metrics
pub static REPOS_DISCOVERED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "modindex_repos_discovered_total",
        "Total number of repositories newly inserted into the catalog",
    )
    .expect("metric creation failed")
});

pub static REPOS_INDEXED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "modindex_repos_indexed_total",
        "Total number of repository tag crawls completed",
    )
    .expect("metric creation failed")
});

pub static TAGS_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("modindex_tags_stored_total", "Total number of tags stored")
        .expect("metric creation failed")
});

pub static TAGS_SKIPPED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "modindex_tags_skipped_total",
            "Total number of tags not stored or stored without a date, by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static FORGE_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "modindex_forge_errors_total",
            "Total forge errors by crawl operation",
        ),
        &["operation"],
    )
    .expect("metric creation failed")
});

pub static BACKOFF_WAITS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "modindex_backoff_waits_total",
        "Total number of backoff pauses taken after forge errors",
    )
    .expect("metric creation failed")
});

// Current state gauges
pub static ACTIVE_CRAWLS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "modindex_active_crawls",
        "Current number of tag crawls in progress",
    )
    .expect("metric creation failed")
});

// Timing metrics
pub static CRAWL_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "modindex_crawl_duration_seconds",
            "Time taken to crawl the tags of one repository",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests and embedded routers can call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(GLOBAL_LEASE_ACQUIRED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REPO_LEASE_ACQUIRED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REPOS_DISCOVERED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REPOS_INDEXED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TAGS_STORED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TAGS_SKIPPED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(FORGE_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BACKOFF_WAITS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ACTIVE_CRAWLS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CRAWL_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a forge error against the crawl operation that hit it.
pub fn record_forge_error(operation: &str) {
    FORGE_ERRORS.with_label_values(&[operation]).inc();
}

/// Record tags left out of (or degraded in) a stored crawl.
pub fn record_tags_skipped(reason: &str, count: usize) {
    if count > 0 {
        TAGS_SKIPPED
            .with_label_values(&[reason])
            .inc_by(count as u64);
    }
}
