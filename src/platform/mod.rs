//! Platform Adapter (spec.md §4.1): the only module that talks to the
//! Knative-style Service/Revision custom resources. Everything above this
//! layer works in terms of [`crate::types::Service`] and
//! [`crate::types::Revision`], never raw CRD structs.

mod client;
mod crd;

pub use client::KubePlatform;
pub use crd::{Revision as RevisionCrd, Service as ServiceCrd, ServiceStatus, TrafficTarget};

use crate::error::Result;
use crate::types::Service;
use async_trait::async_trait;

/// Tri-state node readiness (spec.md §4.1 `node_ready`): a node can be
/// reported ready, not ready, or not found at all (e.g. already drained).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeReadiness {
    Ready,
    NotReady,
    NotFound,
}

/// Coarse pod lifecycle phase used by capacity imputation (spec.md §4.4.d).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Running,
    Pending,
    Other,
    Unknown,
}

/// Everything the Observer and Optimizer need from the serving platform.
/// Abstracted behind a trait so tests can substitute a `mockall` mock
/// instead of a live cluster.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Lists every Service the controller is configured to manage, each with
    /// its revisions populated and sorted (spec.md §4.1: numeric-suffix
    /// ascending, non-numeric suffixes last).
    async fn list_services(&self) -> Result<Vec<Service>>;

    /// Current replica count for one revision's underlying Deployment, or
    /// `Unknown` if the platform reports none.
    async fn replica_count(&self, revision_name: &str) -> Result<crate::types::ReplicaCount>;

    /// Readiness of the named node.
    async fn node_ready(&self, node_name: &str) -> Result<NodeReadiness>;

    /// Readiness of the node backing `revision_name`'s pod(s): resolves the
    /// pod's `node_name` and delegates to [`PlatformAdapter::node_ready`].
    /// `NotFound` when the revision has no pod scheduled at all (spec.md
    /// §4.4.d GPU degenerate check).
    async fn revision_node_ready(&self, revision_name: &str) -> Result<NodeReadiness>;

    /// Aggregate phase for every pod backing a revision: `Running` if any
    /// pod is Running, else the first observed phase, else `Unknown` if no
    /// pods exist at all (spec.md §4.1 `pod_phase`).
    async fn pod_phase(&self, revision_name: &str) -> Result<PodPhase>;

    /// Applies a new traffic split. `weights` must sum to 100 and contain no
    /// negative entries; adapters enforce this before issuing the patch and
    /// return [`crate::error::ScaleWaveError::Consistency`] otherwise. A
    /// single retry is attempted on a 409 Conflict (concurrent platform
    /// autoscaler write), per spec.md §7.
    async fn apply_traffic_split(
        &self,
        service_name: &str,
        weights: &[(String, u32)],
    ) -> Result<()>;
}
