//! Observer (spec.md §4.4): the long-lived sampling loop. Each tick
//! discovers services, derives per-revision metrics, persists them to the
//! State Cache, detects throughput regressions, and schedules an Optimizer
//! run when one fires. Ticks run with a panic/stable interval gate based on
//! request-volume growth.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use log::{error, info, warn};

use crate::cache::{keys, StateCache};
use crate::config::AppConfig;
use crate::metrics::{apply_benchmarks, success_rate, MetricsAdapter};
use crate::platform::PlatformAdapter;
use crate::registry::OptimizerScheduler;
use crate::types::{InFlightRequests, ResourceBenchmarks, Service};

/// Runs the Observer loop until `cancel` fires. Every per-service error is
/// logged and skipped; the loop itself never aborts on one (spec.md §7).
pub async fn run<C>(
    platform: Arc<dyn PlatformAdapter>,
    metrics: Arc<dyn MetricsAdapter>,
    cache: Arc<C>,
    scheduler: Arc<OptimizerScheduler<C>>,
    config: Arc<AppConfig>,
    cancel: tokio_util::sync::CancellationToken,
) where
    C: StateCache + 'static,
{
    let mut previous_total_requests: f64 = 0.0;

    loop {
        if cancel.is_cancelled() {
            info!("observer loop stopping");
            return;
        }

        let services = match platform.list_services().await {
            Ok(s) => s,
            Err(e) => {
                error!("failed to list services: {e}");
                tokio::time::sleep(config.stable_timer()).await;
                continue;
            }
        };

        if let Err(e) = refresh_cluster_capacity(&*metrics, &*cache, &config.observer_frequency).await {
            error!("failed to refresh cluster capacity: {e}");
        }

        let tick_futures = services.into_iter().map(|service| {
            let platform = platform.clone();
            let metrics = metrics.clone();
            let cache = cache.clone();
            let scheduler = scheduler.clone();
            let config = config.clone();
            async move {
                if service.all_revisions_idle() {
                    return 0.0;
                }
                match tick_one_service(&service, &*platform, &*metrics, &*cache, &scheduler, &config).await {
                    Ok(total) => total,
                    Err(e) => {
                        error!("observer tick failed for service {}: {e}", service.name);
                        0.0
                    }
                }
            }
        });

        let totals = join_all(tick_futures).await;
        let current_total: f64 = totals.into_iter().sum();

        let panic_mode = is_panic_mode(current_total, previous_total_requests, config.panic_factor);
        previous_total_requests = current_total;

        let sleep_for = if panic_mode {
            warn!("request volume jumped to {current_total}, entering panic-mode tick interval");
            config.panic_timer()
        } else {
            config.stable_timer()
        };

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = cancel.cancelled() => {
                info!("observer loop stopping mid-sleep");
                return;
            }
        }
    }
}

/// Whether this tick's total in-flight requests jumped enough over the
/// previous tick's to warrant the shorter panic-mode sleep interval
/// (spec.md §4.4 panic/stable timers). Never fires on the very first tick,
/// since there is no prior total to compare against.
fn is_panic_mode(current_total: f64, previous_total: f64, panic_factor: f64) -> bool {
    previous_total > 0.0 && current_total >= panic_factor * previous_total.max(0.0)
}

/// Refreshes `available_cluster_resources` once per tick (spec.md §3, §4.3):
/// reads the benchmarked disk/network ceilings from the cache (seeding the
/// documented defaults on first run), combines them with a fresh usage
/// sample, and writes the result for the Optimizer to read back.
async fn refresh_cluster_capacity<C: StateCache>(
    metrics: &dyn MetricsAdapter,
    cache: &C,
    window: &str,
) -> crate::error::Result<()> {
    let benchmarks: ResourceBenchmarks = match cache.get_json(keys::MAX_RESOURCE_BENCHMARKS).await? {
        Some(b) => b,
        None => {
            let defaults = ResourceBenchmarks::default();
            cache.set_json(keys::MAX_RESOURCE_BENCHMARKS, &defaults).await?;
            defaults
        }
    };

    let usage = metrics.cluster_usage(window).await?;
    let capacity = apply_benchmarks(&usage, &benchmarks);
    cache
        .set_json(keys::AVAILABLE_CLUSTER_RESOURCES, &capacity)
        .await?;
    Ok(())
}

/// One service's share of the tick: fetch metrics, persist derived state,
/// check for regression, and kick off an Optimizer run if warranted.
/// Returns this service's total in-flight requests, folded into the
/// cluster-wide panic-mode gate.
async fn tick_one_service<C: StateCache>(
    service: &Service,
    _platform: &dyn PlatformAdapter,
    metrics: &dyn MetricsAdapter,
    cache: &C,
    scheduler: &OptimizerScheduler<C>,
    config: &AppConfig,
) -> crate::error::Result<f64> {
    let revision_names: Vec<String> = service.revisions.iter().map(|r| r.name.clone()).collect();

    let raw_metrics = metrics
        .revision_metrics(&service.name, &revision_names, &config.observer_frequency)
        .await?;
    let in_flight = metrics
        .in_flight_requests(&service.name, &revision_names)
        .await?;

    // Start from the existing cache entry so a revision that is transiently
    // degenerate this tick keeps its last-known-good sample instead of
    // vanishing from the map (mirrors the Python original's service_history
    // merge-before-write in observer.py).
    let mut cacheable: HashMap<String, crate::types::RevisionMetrics> = cache
        .get_json(&keys::service(&service.name))
        .await?
        .unwrap_or_default();

    // Derive per-replica metrics for every revision currently carrying
    // replicas (spec.md §4.4.d); revisions at zero replicas contribute
    // nothing to throughput_now and are never cached.
    let mut throughput_now = 0.0;
    for revision in &service.revisions {
        let replicas = revision.replica_count.unwrap_or_zero();
        if replicas == 0 {
            continue;
        }
        let raw = raw_metrics.get(&revision.name).copied().unwrap_or_default();
        let derived = crate::metrics::derive_revision_metrics(
            &raw,
            replicas,
            config.target_concurrency_per_pod,
        );
        throughput_now += derived.normalized_throughput;

        // Display-only: logged each tick, never cached or fed into the
        // optimizer's fitness function (spec.md §3 supplement).
        info!(
            "revision {} success_rate={:.4}",
            revision.name,
            success_rate(&raw)
        );

        // Skip the cache write for a genuinely degenerate sample (spec.md
        // §4.4.d): no latency data at all leaves normalized_throughput at
        // zero rather than the floor.
        if derived.normalized_throughput > 0.0 {
            cacheable.insert(revision.name.clone(), derived);
        }
    }

    cache.set_json(&keys::service(&service.name), &cacheable).await?;
    cache
        .set_json(&keys::requests(&service.name), &in_flight)
        .await?;

    let throughput_prev: f64 = cache
        .get_json(&keys::throughput_prev(&service.name))
        .await?
        .unwrap_or(0.0);

    if crate::optimizer::is_regression(throughput_prev, throughput_now, config.regression_threshold) {
        warn!(
            "throughput regression for {}: {throughput_prev} -> {throughput_now}, scheduling optimizer run",
            service.name
        );
        scheduler.trigger(service.clone()).await;
    }

    cache
        .set_json(&keys::throughput_prev(&service.name), &throughput_now)
        .await?;

    Ok(in_flight.total)
}

#[allow(dead_code)]
fn zero_in_flight() -> InFlightRequests {
    InFlightRequests::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_delegates_to_optimizer_module() {
        assert!(crate::optimizer::is_regression(10.0, 9.0, 0.95));
    }

    #[test]
    fn panic_mode_never_fires_on_first_tick() {
        assert!(!is_panic_mode(1000.0, 0.0, 1.5));
    }

    #[test]
    fn panic_mode_fires_when_total_jumps_past_factor() {
        assert!(is_panic_mode(150.0, 100.0, 1.5));
        assert!(!is_panic_mode(120.0, 100.0, 1.5));
    }
}
