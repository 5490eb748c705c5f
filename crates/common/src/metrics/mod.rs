//! Metrics and observability utilities
//!
//! Publication pipeline counters and histograms with standardized naming
//! conventions. Exporter installation is left to the embedding process.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all DataForge metrics
pub const METRICS_PREFIX: &str = "dataforge";

/// Histogram buckets for whole-pipeline publication latency (in seconds)
/// External registries dominate; multi-file bags can take minutes.
pub const PUBLICATION_BUCKETS: &[f64] = &[
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 1m
    300.0, // 5m
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Publication metrics
    describe_counter!(
        format!("{}_publications_total", METRICS_PREFIX),
        Unit::Count,
        "Publication attempts by identifier scheme and outcome"
    );

    describe_histogram!(
        format!("{}_publication_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end publication latency in seconds"
    );

    // Packaging metrics
    describe_counter!(
        format!("{}_bag_builds_total", METRICS_PREFIX),
        Unit::Count,
        "Bag archives (re)built"
    );

    describe_histogram!(
        format!("{}_bag_size_bytes", METRICS_PREFIX),
        Unit::Bytes,
        "Size of built bag archives"
    );

    describe_counter!(
        format!("{}_manifest_checksum_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Manifest entries emitted without a checksum"
    );

    // External services
    describe_counter!(
        format!("{}_identifier_mint_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Failed identifier registrations"
    );

    describe_counter!(
        format!("{}_registration_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Failed assessment registry calls"
    );

    // Lineage
    describe_counter!(
        format!("{}_lineage_operations_total", METRICS_PREFIX),
        Unit::Count,
        "Version, copy and chain-delete operations"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record a publication attempt
pub struct PublicationMetrics {
    start: Instant,
    publish_type: String,
}

impl PublicationMetrics {
    /// Start tracking a publication
    pub fn start(publish_type: &str) -> Self {
        Self {
            start: Instant::now(),
            publish_type: publish_type.to_string(),
        }
    }

    /// Record completion with `outcome` ("published" or an error kind)
    pub fn finish(self, outcome: &str) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_publications_total", METRICS_PREFIX),
            "type" => self.publish_type.clone(),
            "outcome" => outcome.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_publication_duration_seconds", METRICS_PREFIX),
            "type" => self.publish_type
        )
        .record(duration);
    }
}

/// Helper to record a bag build
pub fn record_bag_build(size_bytes: u64) {
    counter!(format!("{}_bag_builds_total", METRICS_PREFIX)).increment(1);
    histogram!(format!("{}_bag_size_bytes", METRICS_PREFIX)).record(size_bytes as f64);
}

pub fn record_checksum_miss() {
    counter!(format!("{}_manifest_checksum_misses_total", METRICS_PREFIX)).increment(1);
}

pub fn record_mint_failure(scheme: &str) {
    counter!(
        format!("{}_identifier_mint_failures_total", METRICS_PREFIX),
        "scheme" => scheme.to_string()
    )
    .increment(1);
}

/// `stage` is the failing call: "auth" or "register"
pub fn record_registration_failure(stage: &str) {
    counter!(
        format!("{}_registration_failures_total", METRICS_PREFIX),
        "stage" => stage.to_string()
    )
    .increment(1);
}

pub fn record_lineage(operation: &str) {
    counter!(
        format!("{}_lineage_operations_total", METRICS_PREFIX),
        "operation" => operation.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publication_buckets() {
        let mut prev = 0.0;
        for &bucket in PUBLICATION_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every helper is a no-op
        let metrics = PublicationMetrics::start("doi");
        metrics.finish("published");
        record_bag_build(1024);
        record_checksum_miss();
        record_mint_failure("minid");
        record_registration_failure("auth");
        record_lineage("version");
    }
}
