//! Error kinds shared across the Platform Adapter, Metrics Adapter, State
//! Cache, and Optimizer (spec.md §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScaleWaveError {
    /// The platform CLI/API rejected a read or write (spec.md §4.1, §7).
    #[error("platform error: {0}")]
    Platform(String),

    /// A metrics query failed outright (as opposed to returning an empty
    /// result, which adapters treat as zero/absent per spec.md §4.2).
    #[error("metrics error: {0}")]
    Metrics(String),

    /// The State Cache get/set failed.
    #[error("cache error: {0}")]
    Cache(String),

    /// An `apply_traffic_split` argument failed the sum-to-100,
    /// non-negative invariant (spec.md §4.1 contract, §7: fatal for the
    /// current Optimizer run).
    #[error("consistency error: traffic split does not sum to 100 and non-negative: {0}")]
    Consistency(String),

    /// This Optimizer run was preempted by a successor run for the same
    /// service (spec.md §4.6); the run exits silently.
    #[error("optimizer run preempted")]
    Preempted,
}

pub type Result<T> = std::result::Result<T, ScaleWaveError>;
