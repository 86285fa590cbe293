//! Core data model shared by the Observer, Optimizer, and the adapters:
//! Service/Revision identity, derived per-tick metrics, cluster capacity,
//! in-flight request snapshots, and optimizer run bookkeeping.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether a revision carries an accelerator (e.g. GPU) workload. Derived by
/// matching the revision name against the configured GPU marker substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevisionCapability {
    Standard,
    GpuBearing,
}

impl RevisionCapability {
    pub fn is_gpu_bearing(self) -> bool {
        matches!(self, RevisionCapability::GpuBearing)
    }
}

/// A specific deployed variant of a Service, as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub name: String,
    pub replica_count: ReplicaCount,
    pub traffic_percent: u32,
    pub capability: RevisionCapability,
}

/// Replica count as reported by the platform; `Unknown` when the underlying
/// deployment object is absent (spec.md §4.1 `replica_count`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaCount {
    Known(u32),
    Unknown,
}

impl ReplicaCount {
    pub fn unwrap_or_zero(self) -> u32 {
        match self {
            ReplicaCount::Known(n) => n,
            ReplicaCount::Unknown => 0,
        }
    }
}

/// A logical name grouping one or more equivalent revisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub revisions: Vec<Revision>,
}

impl Service {
    /// True when every revision currently has zero replicas (spec.md §4.4.b):
    /// the tick should skip this service entirely.
    pub fn all_revisions_idle(&self) -> bool {
        self.revisions
            .iter()
            .all(|r| r.replica_count.unwrap_or_zero() == 0)
    }
}

/// Derived, per-replica metrics for one revision at one observer tick.
/// All resource fields are non-negative and already divided by
/// `current_replica` (spec.md §3 invariants).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RevisionMetrics {
    pub throughput: f64,
    pub normalized_throughput: f64,
    pub successful_requests: f64,
    pub latency: f64,
    pub latency_per_request: f64,
    pub queued_requests: f64,
    pub target_concurrency_per_pod: f64,
    pub cpu: f64,
    pub memory: f64,
    pub disk_read: f64,
    pub disk_write: f64,
    pub network_downlink: f64,
    pub network_uplink: f64,
    pub gpu: f64,
    pub current_replica: u32,
}

/// Floor applied to `normalized_throughput` whenever a revision is observed
/// live but its measurement would otherwise collapse to zero or negative
/// (spec.md §3, §4.4.d).
pub const THROUGHPUT_FLOOR: f64 = 1e-14;

/// Available cluster-wide resource capacity for one observer tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ClusterCapacity {
    pub cpu: f64,
    pub memory: f64,
    pub disk_read: f64,
    pub disk_write: f64,
    pub network_uplink: f64,
    pub network_downlink: f64,
    pub gpu: f64,
}

impl ClusterCapacity {
    /// Iterates `(resource name, capacity)` pairs in a stable order; used by
    /// the Optimizer's fitness function and by capacity imputation.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("cpu", self.cpu),
            ("memory", self.memory),
            ("disk_read", self.disk_read),
            ("disk_write", self.disk_write),
            ("network_uplink", self.network_uplink),
            ("network_downlink", self.network_downlink),
            ("gpu", self.gpu),
        ]
        .into_iter()
    }

    /// Per-replica usage of a named resource, read off a `RevisionMetrics`
    /// in the same order as `iter`.
    pub fn usage_of(metrics: &RevisionMetrics, resource: &str) -> f64 {
        match resource {
            "cpu" => metrics.cpu,
            "memory" => metrics.memory,
            "disk_read" => metrics.disk_read,
            "disk_write" => metrics.disk_write,
            "network_uplink" => metrics.network_uplink,
            "network_downlink" => metrics.network_downlink,
            "gpu" => metrics.gpu,
            _ => 0.0,
        }
    }
}

/// Per-service in-flight request snapshot: revision -> concurrent requests,
/// plus the cross-revision total (spec.md §3 `InFlightRequests`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InFlightRequests {
    pub per_revision: HashMap<String, f64>,
    pub total: f64,
}

/// Benchmarked resource ceilings for the metrics the cluster can't report
/// availability for directly (spec.md §3 `ClusterCapacity`: "subtracting
/// measured live usage from benchmarked ceilings for disk/network").
/// Persisted at `max_resource_benchmarks`; falls back to these documented
/// defaults when the cache has never been populated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResourceBenchmarks {
    pub max_disk_read: f64,
    pub max_disk_write: f64,
    pub max_network_uplink: f64,
    pub max_network_downlink: f64,
}

impl Default for ResourceBenchmarks {
    /// 500 MiB/s disk, 1000 Mbps network — conservative single-node ceilings
    /// used until a real benchmarking run overwrites them in the cache.
    fn default() -> Self {
        Self {
            max_disk_read: 500.0,
            max_disk_write: 500.0,
            max_network_uplink: 1000.0,
            max_network_downlink: 1000.0,
        }
    }
}

/// Advisory record of the most recent Optimizer run for one service,
/// persisted at `<service>_optimizer_process` (spec.md §4.6). Purely
/// informational: the in-process `OptimizerScheduler` is the actual
/// source of truth for which run is live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizerRunRecord {
    pub run_id: String,
    pub committed_at: chrono::DateTime<chrono::Utc>,
}

/// Small positive epsilon the regression detector compares `throughput_prev`
/// against (spec.md §4.4.h, §8 boundary: `throughput_prev <= eps` never
/// fires the Optimizer).
pub const REGRESSION_EPS: f64 = 1e-9;
