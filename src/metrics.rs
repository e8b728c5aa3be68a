//! Metrics for the contact pipeline
//!
//! Recording goes through the `metrics` facade; without an installed recorder
//! every call is a no-op, so library users and tests pay nothing.

use std::fmt;
use std::net::SocketAddr;
use tracing::{info, warn};

/// Every metric name used in the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Normalize metrics
    NormalizeContactsProcessed,
    NormalizeChanges,
    NormalizeRejections,

    // Batch metrics
    BatchRunsStarted,
    BatchRunsCompleted,
    BatchesProcessed,
    BatchesFailed,
    BatchSimilarityGroups,
    BatchDuration,
    BatchPauseWaits,

    // Store metrics
    StoreCacheHits,
    StoreCacheMisses,
    StorePagesFetched,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::NormalizeContactsProcessed => "contacts_normalize_contacts_processed_total",
            MetricName::NormalizeChanges => "contacts_normalize_changes_total",
            MetricName::NormalizeRejections => "contacts_normalize_rejections_total",
            MetricName::BatchRunsStarted => "contacts_batch_runs_started_total",
            MetricName::BatchRunsCompleted => "contacts_batch_runs_completed_total",
            MetricName::BatchesProcessed => "contacts_batch_batches_processed_total",
            MetricName::BatchesFailed => "contacts_batch_batches_failed_total",
            MetricName::BatchSimilarityGroups => "contacts_batch_similarity_groups_total",
            MetricName::BatchDuration => "contacts_batch_duration_seconds",
            MetricName::BatchPauseWaits => "contacts_batch_pause_waits_total",
            MetricName::StoreCacheHits => "contacts_store_cache_hits_total",
            MetricName::StoreCacheMisses => "contacts_store_cache_misses_total",
            MetricName::StorePagesFetched => "contacts_store_pages_fetched_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a tokio runtime. Failures are logged, not fatal.
pub fn init_metrics(addr: SocketAddr) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed: {}", e),
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn contacts_processed(count: usize) {
        ::metrics::counter!(MetricName::NormalizeContactsProcessed.as_str()).increment(count as u64);
    }

    pub fn changes_recorded(count: usize) {
        ::metrics::counter!(MetricName::NormalizeChanges.as_str()).increment(count as u64);
    }

    pub fn rejections_recorded(count: usize) {
        ::metrics::counter!(MetricName::NormalizeRejections.as_str()).increment(count as u64);
    }
}

pub mod batch {
    use super::MetricName;

    pub fn run_started() {
        ::metrics::counter!(MetricName::BatchRunsStarted.as_str()).increment(1);
    }

    pub fn run_completed(duration_secs: f64) {
        ::metrics::counter!(MetricName::BatchRunsCompleted.as_str()).increment(1);
        ::metrics::histogram!(MetricName::BatchDuration.as_str()).record(duration_secs);
    }

    pub fn batch_processed(groups: usize) {
        ::metrics::counter!(MetricName::BatchesProcessed.as_str()).increment(1);
        ::metrics::counter!(MetricName::BatchSimilarityGroups.as_str()).increment(groups as u64);
    }

    pub fn batch_failed() {
        ::metrics::counter!(MetricName::BatchesFailed.as_str()).increment(1);
    }

    pub fn pause_wait() {
        ::metrics::counter!(MetricName::BatchPauseWaits.as_str()).increment(1);
    }
}

pub mod store {
    use super::MetricName;

    pub fn cache_hit() {
        ::metrics::counter!(MetricName::StoreCacheHits.as_str()).increment(1);
    }

    pub fn cache_miss() {
        ::metrics::counter!(MetricName::StoreCacheMisses.as_str()).increment(1);
    }

    pub fn page_fetched() {
        ::metrics::counter!(MetricName::StorePagesFetched.as_str()).increment(1);
    }
}
