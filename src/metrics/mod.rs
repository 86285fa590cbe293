//! Metrics Adapter (spec.md §4.2): queries a Prometheus-compatible backend
//! and hands back typed results instead of the Python prototype's
//! duck-typed dict-or-list responses (REDESIGN FLAGS item 2).

mod client;
mod query;

pub use client::PrometheusMetrics;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ClusterCapacity, ResourceBenchmarks, RevisionMetrics, THROUGHPUT_FLOOR};

/// One labeled sample from a Prometheus vector result.
#[derive(Debug, Clone, PartialEq)]
pub struct PromSample {
    pub labels: HashMap<String, String>,
    pub value: f64,
}

/// Result of a single PromQL query, tagged by shape rather than duck-typed.
/// A query that returns no series collapses to `Scalar(0.0)` or
/// `Vector(vec![])` depending on which variant the caller expected
/// (spec.md §4.2 "absent/empty metrics collapse to zero").
#[derive(Debug, Clone, PartialEq)]
pub enum PromQueryResult {
    Scalar(f64),
    Vector(Vec<PromSample>),
}

impl PromQueryResult {
    pub fn as_scalar(&self) -> f64 {
        match self {
            PromQueryResult::Scalar(v) => *v,
            PromQueryResult::Vector(samples) => samples.first().map(|s| s.value).unwrap_or(0.0),
        }
    }

    pub fn as_vector(&self) -> &[PromSample] {
        match self {
            PromQueryResult::Vector(samples) => samples,
            PromQueryResult::Scalar(_) => &[],
        }
    }
}

/// Un-derived, still-aggregate per-revision measurements straight out of the
/// metrics backend: not yet divided by replica count, and throughput not yet
/// normalized against latency (spec.md §4.4.d — that derivation is the
/// Observer's job, not the adapter's).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawRevisionMetrics {
    pub successful_requests: f64,
    /// Total request rate regardless of response code; used only to derive
    /// the display-only `success_rate` (spec.md §3 supplement), never fed
    /// into the optimizer.
    pub total_requests: f64,
    pub request_latency_sum: f64,
    pub activator_latency_sum: f64,
    pub queued_requests: f64,
    pub target_concurrency_per_pod: f64,
    pub cpu: f64,
    pub memory: f64,
    pub disk_read: f64,
    pub disk_write: f64,
    pub network_downlink: f64,
    pub network_uplink: f64,
    pub gpu: f64,
}

/// Raw cluster-wide measurements, with the configured master/control-plane
/// node excluded from every aggregate (spec.md §4.2). CPU, memory, and GPU
/// are already expressed as *available* capacity (the backend is queried
/// for idle/headroom directly); disk and network are live usage *rates* that
/// still need to be subtracted from a benchmarked ceiling (spec.md §3) to
/// become available capacity — that subtraction is the Observer's job via
/// [`apply_benchmarks`], since the benchmark ceilings live in the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClusterUsage {
    pub cpu_available: f64,
    pub memory_available: f64,
    pub disk_read_rate: f64,
    pub disk_write_rate: f64,
    pub network_uplink_rate: f64,
    pub network_downlink_rate: f64,
    pub gpu_available: f64,
}

/// Combines a raw [`ClusterUsage`] sample with benchmarked ceilings to
/// produce the [`ClusterCapacity`] the Optimizer plans against (spec.md §3,
/// §4.2: `max_disk_{read|write}` / `max_network_{uplink|downlink}` minus the
/// live rate, floored at zero since a ceiling can be stale relative to a
/// usage spike).
pub fn apply_benchmarks(usage: &ClusterUsage, benchmarks: &ResourceBenchmarks) -> ClusterCapacity {
    ClusterCapacity {
        cpu: usage.cpu_available,
        memory: usage.memory_available,
        disk_read: (benchmarks.max_disk_read - usage.disk_read_rate).max(0.0),
        disk_write: (benchmarks.max_disk_write - usage.disk_write_rate).max(0.0),
        network_uplink: (benchmarks.max_network_uplink - usage.network_uplink_rate).max(0.0),
        network_downlink: (benchmarks.max_network_downlink - usage.network_downlink_rate).max(0.0),
        gpu: usage.gpu_available,
    }
}

/// Everything the Observer needs from the metrics backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsAdapter: Send + Sync {
    /// Cluster-wide raw measurements over `window` (spec.md §4.2, "queries
    /// are issued over a configurable observation window"); combine with
    /// [`ResourceBenchmarks`] via [`apply_benchmarks`] to get available
    /// capacity.
    async fn cluster_usage(&self, window: &str) -> Result<ClusterUsage>;

    /// Raw (un-derived) per-revision measurements for every revision of
    /// `service_name`, keyed by revision name. Revisions absent from the
    /// query result are simply absent from the map; callers apply
    /// per-replica derivation (spec.md §4.4.d) and capacity imputation.
    async fn revision_metrics(
        &self,
        service_name: &str,
        revision_names: &[String],
        window: &str,
    ) -> Result<HashMap<String, RawRevisionMetrics>>;

    /// In-flight (concurrent) request count per revision, plus the
    /// cross-revision total.
    async fn in_flight_requests(
        &self,
        service_name: &str,
        revision_names: &[String],
    ) -> Result<crate::types::InFlightRequests>;
}

/// `successful_requests / total_requests`, zero-guarded (spec.md §3
/// supplement). Purely a display/logging quantity — mirrors the Python
/// prototype's `eq_success_rate`, which is computed and logged but never
/// wired into the optimizer's fitness function or persisted to the cache.
pub fn success_rate(raw: &RawRevisionMetrics) -> f64 {
    if raw.total_requests > 0.0 {
        (raw.successful_requests / raw.total_requests).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Derives per-replica [`RevisionMetrics`] from a raw aggregate sample and
/// the revision's current replica count (spec.md §4.4.d):
///
/// - `normalized_throughput` divides successful requests by total
///   (request + activator) latency, then by replica count; it is clamped to
///   [`THROUGHPUT_FLOOR`] when the numerator is zero but the revision is
///   live (latency data exists), and left at zero when no latency data
///   exists at all (truly degenerate — the caller should skip caching this
///   revision in that case).
/// - `throughput`, `successful_requests`, `latency`, `latency_per_request`,
///   and every per-pod resource field are divided by `current_replica`.
/// - `queued_requests`, `target_concurrency_per_pod`, and `current_replica`
///   are preserved unchanged.
pub fn derive_revision_metrics(
    raw: &RawRevisionMetrics,
    current_replica: u32,
    default_target_concurrency: f64,
) -> RevisionMetrics {
    let replicas = current_replica as f64;
    let latency_denom = raw.request_latency_sum + raw.activator_latency_sum;

    let throughput_aggregate = if latency_denom > 0.0 {
        raw.successful_requests / latency_denom
    } else {
        0.0
    };

    let mut normalized_throughput = if replicas > 0.0 {
        throughput_aggregate / replicas
    } else {
        0.0
    };
    if normalized_throughput <= 0.0 && latency_denom > 0.0 {
        normalized_throughput = THROUGHPUT_FLOOR;
    }

    let latency_per_request = if raw.successful_requests > 0.0 {
        raw.request_latency_sum / raw.successful_requests
    } else {
        0.0
    };

    let per_replica = |v: f64| if replicas > 0.0 { v / replicas } else { 0.0 };

    let target_concurrency_per_pod = if raw.target_concurrency_per_pod > 0.0 {
        raw.target_concurrency_per_pod
    } else {
        default_target_concurrency
    };

    RevisionMetrics {
        throughput: per_replica(throughput_aggregate),
        normalized_throughput,
        successful_requests: per_replica(raw.successful_requests),
        latency: per_replica(raw.request_latency_sum),
        latency_per_request: per_replica(latency_per_request),
        queued_requests: raw.queued_requests,
        target_concurrency_per_pod,
        cpu: per_replica(raw.cpu),
        memory: per_replica(raw.memory),
        disk_read: per_replica(raw.disk_read),
        disk_write: per_replica(raw.disk_write),
        network_downlink: per_replica(raw.network_downlink),
        network_uplink: per_replica(raw.network_uplink),
        gpu: per_replica(raw.gpu),
        current_replica,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_per_replica_quantities() {
        let raw = RawRevisionMetrics {
            successful_requests: 100.0,
            request_latency_sum: 40.0,
            activator_latency_sum: 10.0,
            queued_requests: 3.0,
            target_concurrency_per_pod: 0.0,
            cpu: 400.0,
            memory: 200.0,
            ..Default::default()
        };

        let m = derive_revision_metrics(&raw, 4, 10.0);
        assert_eq!(m.current_replica, 4);
        assert_eq!(m.cpu, 100.0);
        assert_eq!(m.memory, 50.0);
        assert_eq!(m.queued_requests, 3.0);
        assert_eq!(m.target_concurrency_per_pod, 10.0);
        // throughput_aggregate = 100 / 50 = 2.0; normalized = 2.0 / 4 = 0.5
        assert!((m.normalized_throughput - 0.5).abs() < 1e-9);
    }

    #[test]
    fn clamps_floor_when_live_but_no_successful_requests() {
        let raw = RawRevisionMetrics {
            successful_requests: 0.0,
            request_latency_sum: 5.0,
            activator_latency_sum: 0.0,
            ..Default::default()
        };
        let m = derive_revision_metrics(&raw, 2, 10.0);
        assert_eq!(m.normalized_throughput, THROUGHPUT_FLOOR);
    }

    #[test]
    fn stays_zero_when_no_latency_data_at_all() {
        let raw = RawRevisionMetrics::default();
        let m = derive_revision_metrics(&raw, 2, 10.0);
        assert_eq!(m.normalized_throughput, 0.0);
    }

    #[test]
    fn success_rate_is_zero_guarded() {
        let raw = RawRevisionMetrics::default();
        assert_eq!(success_rate(&raw), 0.0);
    }

    #[test]
    fn success_rate_divides_successful_by_total() {
        let raw = RawRevisionMetrics {
            successful_requests: 90.0,
            total_requests: 100.0,
            ..Default::default()
        };
        assert!((success_rate(&raw) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn apply_benchmarks_subtracts_live_rate_from_ceiling() {
        let usage = ClusterUsage {
            cpu_available: 4000.0,
            memory_available: 8192.0,
            disk_read_rate: 100.0,
            disk_write_rate: 600.0,
            network_uplink_rate: 50.0,
            network_downlink_rate: 50.0,
            gpu_available: 80.0,
        };
        let benchmarks = ResourceBenchmarks::default();
        let capacity = apply_benchmarks(&usage, &benchmarks);
        assert_eq!(capacity.cpu, 4000.0);
        assert_eq!(capacity.disk_read, 400.0);
        // write rate exceeds the benchmark ceiling; floored at zero, not negative
        assert_eq!(capacity.disk_write, 0.0);
        assert_eq!(capacity.network_uplink, 950.0);
        assert_eq!(capacity.gpu, 80.0);
    }
}
