//! Controller configuration (spec.md §6 Configuration table). Loaded from
//! CLI flags with documented defaults; an optional `--config-file` (YAML)
//! overrides the whole set at once, the way the teacher's `Check` command
//! accepts a config file path for a different purpose (the kubeconfig).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one ScaleWave controller instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Range-query window passed to the Metrics Adapter (spec.md §4.2).
    #[serde(default = "default_observer_frequency")]
    pub observer_frequency: String,

    /// Inter-tick sleep while any service is in panic mode.
    #[serde(default = "default_panic_timer_secs")]
    pub panic_timer_secs: u64,

    /// Inter-tick sleep while no service is in panic mode.
    #[serde(default = "default_stable_timer_secs")]
    pub stable_timer_secs: u64,

    /// Fallback `target_concurrency_per_pod` when the platform does not
    /// report one for a revision.
    pub target_concurrency_per_pod: f64,

    /// Per-tick traffic-change cap used by smoothing (spec.md §4.5).
    #[serde(default = "default_adjustment_factor")]
    pub adjustment_factor: f64,

    /// Substring that marks a revision name as GPU-bearing.
    pub gpu_revision_marker: String,

    /// `instance` label value excluded from cluster aggregates.
    pub master_node_instance: String,

    /// Fraction of previous throughput below which the Optimizer fires.
    #[serde(default = "default_regression_threshold")]
    pub regression_threshold: f64,

    /// Ratio of current-tick to previous-tick total requests that marks a
    /// tick as panic.
    #[serde(default = "default_panic_factor")]
    pub panic_factor: f64,

    /// Divisor applied to a GPU-tagged revision's smoothed weight
    /// (REDESIGN FLAGS / SPEC_FULL.md §9(b); default matches the Python
    /// prototype's hard-coded `/ 8`).
    #[serde(default = "default_gpu_damping_divisor")]
    pub gpu_damping_divisor: u32,

    /// Delay after spawning an optimizer run before it reads the cache, so
    /// the Observer's freshly-written entries are visible.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Upper bound on any single Platform or Metrics Adapter call (spec.md
    /// §5 "Timeouts"); a call that exceeds this surfaces as a normal adapter
    /// error rather than hanging the tick or optimizer run indefinitely.
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,

    /// Prometheus-compatible query endpoint, e.g. `http://localhost:9090`.
    pub prometheus_url: String,

    /// Redis-compatible cache connection string, e.g. `redis://localhost:6379`.
    pub cache_url: String,

    /// Path to a kubeconfig file; `None` infers in-cluster or default context.
    pub kubeconfig_path: Option<String>,

    /// Namespace to restrict revision discovery to; `None` means all namespaces.
    pub namespace: Option<String>,
}

fn default_observer_frequency() -> String {
    "1m".to_string()
}
fn default_panic_timer_secs() -> u64 {
    6
}
fn default_stable_timer_secs() -> u64 {
    30
}
fn default_adjustment_factor() -> f64 {
    0.25
}
fn default_regression_threshold() -> f64 {
    0.95
}
fn default_panic_factor() -> f64 {
    1.5
}
fn default_gpu_damping_divisor() -> u32 {
    8
}
fn default_settle_delay_ms() -> u64 {
    1500
}
fn default_adapter_timeout_secs() -> u64 {
    10
}

impl AppConfig {
    pub fn panic_timer(&self) -> Duration {
        Duration::from_secs(self.panic_timer_secs)
    }

    pub fn stable_timer(&self) -> Duration {
        Duration::from_secs(self.stable_timer_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    /// Loads and merges a YAML config file over CLI-derived defaults; fields
    /// absent from the file keep the value already set on `self`.
    pub fn merge_from_file(mut self, path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let overrides: PartialAppConfig = serde_yaml::from_str(&contents)?;
        overrides.apply(&mut self);
        Ok(self)
    }
}

/// Mirrors `AppConfig` with every field optional, for partial file overrides.
#[derive(Debug, Clone, Default, Deserialize)]
struct PartialAppConfig {
    observer_frequency: Option<String>,
    panic_timer_secs: Option<u64>,
    stable_timer_secs: Option<u64>,
    target_concurrency_per_pod: Option<f64>,
    adjustment_factor: Option<f64>,
    gpu_revision_marker: Option<String>,
    master_node_instance: Option<String>,
    regression_threshold: Option<f64>,
    panic_factor: Option<f64>,
    gpu_damping_divisor: Option<u32>,
    settle_delay_ms: Option<u64>,
    adapter_timeout_secs: Option<u64>,
    prometheus_url: Option<String>,
    cache_url: Option<String>,
    kubeconfig_path: Option<String>,
    namespace: Option<String>,
}

impl PartialAppConfig {
    fn apply(self, base: &mut AppConfig) {
        if let Some(v) = self.observer_frequency {
            base.observer_frequency = v;
        }
        if let Some(v) = self.panic_timer_secs {
            base.panic_timer_secs = v;
        }
        if let Some(v) = self.stable_timer_secs {
            base.stable_timer_secs = v;
        }
        if let Some(v) = self.target_concurrency_per_pod {
            base.target_concurrency_per_pod = v;
        }
        if let Some(v) = self.adjustment_factor {
            base.adjustment_factor = v;
        }
        if let Some(v) = self.gpu_revision_marker {
            base.gpu_revision_marker = v;
        }
        if let Some(v) = self.master_node_instance {
            base.master_node_instance = v;
        }
        if let Some(v) = self.regression_threshold {
            base.regression_threshold = v;
        }
        if let Some(v) = self.panic_factor {
            base.panic_factor = v;
        }
        if let Some(v) = self.gpu_damping_divisor {
            base.gpu_damping_divisor = v;
        }
        if let Some(v) = self.settle_delay_ms {
            base.settle_delay_ms = v;
        }
        if let Some(v) = self.adapter_timeout_secs {
            base.adapter_timeout_secs = v;
        }
        if let Some(v) = self.prometheus_url {
            base.prometheus_url = v;
        }
        if let Some(v) = self.cache_url {
            base.cache_url = v;
        }
        if self.kubeconfig_path.is_some() {
            base.kubeconfig_path = self.kubeconfig_path;
        }
        if self.namespace.is_some() {
            base.namespace = self.namespace;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            observer_frequency: default_observer_frequency(),
            panic_timer_secs: default_panic_timer_secs(),
            stable_timer_secs: default_stable_timer_secs(),
            target_concurrency_per_pod: 49.0,
            adjustment_factor: default_adjustment_factor(),
            gpu_revision_marker: "-00004".to_string(),
            master_node_instance: "10.0.0.1:9100".to_string(),
            regression_threshold: default_regression_threshold(),
            panic_factor: default_panic_factor(),
            gpu_damping_divisor: default_gpu_damping_divisor(),
            settle_delay_ms: default_settle_delay_ms(),
            adapter_timeout_secs: default_adapter_timeout_secs(),
            prometheus_url: "http://localhost:9090".to_string(),
            cache_url: "redis://localhost:6379".to_string(),
            kubeconfig_path: None,
            namespace: None,
        }
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = base_config();
        assert_eq!(cfg.panic_timer_secs, 6);
        assert_eq!(cfg.stable_timer_secs, 30);
        assert_eq!(cfg.adjustment_factor, 0.25);
        assert_eq!(cfg.regression_threshold, 0.95);
        assert_eq!(cfg.panic_factor, 1.5);
        assert_eq!(cfg.gpu_damping_divisor, 8);
    }

    #[test]
    fn merge_from_file_overrides_only_present_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalewave.yaml");
        std::fs::write(&path, "panic_timer_secs: 9\nadjustment_factor: 0.5\n").unwrap();

        let cfg = base_config()
            .merge_from_file(path.to_str().unwrap())
            .unwrap();

        assert_eq!(cfg.panic_timer_secs, 9);
        assert_eq!(cfg.adjustment_factor, 0.5);
        // untouched fields keep their base value
        assert_eq!(cfg.stable_timer_secs, 30);
        assert_eq!(cfg.gpu_revision_marker, "-00004");
    }
}
