use clap::{Parser, Subcommand};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(author, version, about = "Autoscaling and traffic-split controller for equivalent Knative revisions", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the Observer loop (periodic sampling + regression detection +
    /// in-process Optimizer scheduling). Long-lived; never exits on a
    /// transient per-service error.
    Run {
        #[command(flatten)]
        controller: ControllerArgs,
    },
    /// Run a single Optimizer pass for one service and exit. Useful for
    /// manual traffic-split recomputation or debugging the search/smoothing
    /// pipeline without waiting for a regression trigger.
    Optimize {
        /// Service name to optimize.
        service: String,

        #[command(flatten)]
        controller: ControllerArgs,
    },
}

#[derive(clap::Args)]
pub struct ControllerArgs {
    /// Range-query window passed to the Metrics Adapter.
    #[arg(long, default_value = "1m")]
    pub observer_frequency: String,

    /// Inter-tick sleep (seconds) while any service is in panic mode.
    #[arg(long, default_value_t = 6)]
    pub panic_timer_secs: u64,

    /// Inter-tick sleep (seconds) while no service is in panic mode.
    #[arg(long, default_value_t = 30)]
    pub stable_timer_secs: u64,

    /// Fallback target concurrency per pod when the platform reports none.
    #[arg(long)]
    pub target_concurrency_per_pod: f64,

    /// Per-tick traffic-change cap (0..1) used by smoothing.
    #[arg(long, default_value_t = 0.25)]
    pub adjustment_factor: f64,

    /// Substring in a revision name that marks it GPU-bearing.
    #[arg(long)]
    pub gpu_revision_marker: String,

    /// `instance` label value to exclude from cluster aggregates.
    #[arg(long)]
    pub master_node_instance: String,

    /// Fraction of previous throughput below which the Optimizer fires.
    #[arg(long, default_value_t = 0.95)]
    pub regression_threshold: f64,

    /// Ratio of current-tick to previous-tick total requests that marks a tick as panic.
    #[arg(long, default_value_t = 1.5)]
    pub panic_factor: f64,

    /// Divisor applied to a GPU-tagged revision's smoothed traffic weight.
    #[arg(long, default_value_t = 8)]
    pub gpu_damping_divisor: u32,

    /// Delay (ms) after launching an optimizer run before it reads the cache.
    #[arg(long, default_value_t = 1500)]
    pub settle_delay_ms: u64,

    /// Per-call timeout (seconds) for any Platform or Metrics Adapter call.
    #[arg(long, default_value_t = 10)]
    pub adapter_timeout_secs: u64,

    /// Prometheus-compatible query endpoint.
    #[arg(long, default_value = "http://localhost:9090")]
    pub prometheus_url: String,

    /// Redis-compatible State Cache connection string.
    #[arg(long, default_value = "redis://localhost:6379")]
    pub cache_url: String,

    /// Kubeconfig file path; unset infers in-cluster or the default context.
    #[arg(long)]
    pub kubeconfig_path: Option<String>,

    /// Namespace to restrict revision discovery to; unset means all namespaces.
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// YAML file overriding any of the above options.
    #[arg(long)]
    pub config_file: Option<String>,
}

impl ControllerArgs {
    /// Builds an `AppConfig`, applying `--config-file` overrides last.
    pub fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let config = AppConfig {
            observer_frequency: self.observer_frequency,
            panic_timer_secs: self.panic_timer_secs,
            stable_timer_secs: self.stable_timer_secs,
            target_concurrency_per_pod: self.target_concurrency_per_pod,
            adjustment_factor: self.adjustment_factor,
            gpu_revision_marker: self.gpu_revision_marker,
            master_node_instance: self.master_node_instance,
            regression_threshold: self.regression_threshold,
            panic_factor: self.panic_factor,
            gpu_damping_divisor: self.gpu_damping_divisor,
            settle_delay_ms: self.settle_delay_ms,
            adapter_timeout_secs: self.adapter_timeout_secs,
            prometheus_url: self.prometheus_url,
            cache_url: self.cache_url,
            kubeconfig_path: self.kubeconfig_path,
            namespace: self.namespace,
        };

        match self.config_file {
            Some(path) => config.merge_from_file(&path),
            None => Ok(config),
        }
    }
}
