//! Prometheus metrics for the Keel server.
//!
//! Exposes counters for profile mutations, CDN lock activity and conditional
//! request outcomes.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no profile names, usernames or CDN names, but they do expose
//! aggregate activity. Restrict the endpoint to scraper addresses at the
//! network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{self, Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Profile metrics
pub static PROFILE_MUTATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "keel_profile_mutations_total",
            "Total number of successful profile mutations by operation",
        ),
        &["operation"],
    )
    .expect("metric creation failed")
});

pub static PARAMETER_ASSOCIATIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "keel_parameter_associations_total",
        "Total number of profile-parameter associations created",
    )
    .expect("metric creation failed")
});

// Lock metrics
pub static LOCK_ACQUISITIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "keel_cdn_lock_acquisitions_total",
            "Total number of CDN locks acquired by kind",
        ),
        &["kind"],
    )
    .expect("metric creation failed")
});

pub static LOCK_REJECTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "keel_cdn_lock_rejections_total",
        "Total number of mutations rejected by another user's hard lock",
    )
    .expect("metric creation failed")
});

// Conditional request metrics
pub static PRECONDITION_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "keel_precondition_failures_total",
        "Total number of writes rejected with 412 Precondition Failed",
    )
    .expect("metric creation failed")
});

pub static NOT_MODIFIED_RESPONSES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "keel_not_modified_responses_total",
        "Total number of reads answered with 304 Not Modified",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(PROFILE_MUTATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PARAMETER_ASSOCIATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LOCK_ACQUISITIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LOCK_REJECTIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PRECONDITION_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(NOT_MODIFIED_RESPONSES.clone()))
            .expect("metric registration failed");
    });
}

/// Handler for the /metrics endpoint.
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

/// Record a successful profile mutation.
pub fn record_profile_mutation(operation: &str) {
    PROFILE_MUTATIONS.with_label_values(&[operation]).inc();
}

/// Record an acquired CDN lock.
pub fn record_lock_acquired(soft: bool) {
    let kind = if soft { "soft" } else { "hard" };
    LOCK_ACQUISITIONS.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // Panics if any metric creation failed.
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_profile_mutation_counter() {
        let before = PROFILE_MUTATIONS.with_label_values(&["copy"]).get();
        record_profile_mutation("copy");
        assert_eq!(PROFILE_MUTATIONS.with_label_values(&["copy"]).get(), before + 1);
    }
}
