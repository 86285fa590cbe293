//! Optimizer (spec.md §4.5): given a regression signal for one service,
//! searches for a replica-count vector under resource constraints and
//! commits a smoothed, GPU-damped traffic split.

mod ga;
mod shaping;

use std::collections::HashMap;

use log::info;
use rand::thread_rng;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::{keys, StateCache};
use crate::config::AppConfig;
use crate::error::{Result, ScaleWaveError};
use crate::platform::{NodeReadiness, PlatformAdapter, PodPhase};
use crate::types::{ClusterCapacity, InFlightRequests, RevisionMetrics, Service, THROUGHPUT_FLOOR};
use ga::RevisionGene;

/// Runs one Optimizer pass for `service` end to end: read the State Cache
/// state the Observer last wrote, impute capacity for idle/degenerate
/// revisions, search, shape, and commit. Cooperatively cancellable: checked
/// between each major phase so a preempting run (spec.md §4.6) can take over
/// promptly.
pub async fn run_optimizer(
    service: &Service,
    platform: &dyn PlatformAdapter,
    cache: &impl StateCache,
    config: &AppConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let run_id = Uuid::new_v4();
    info!("optimizer run {run_id} starting for service {}", service.name);

    if cancel.is_cancelled() {
        return Err(ScaleWaveError::Preempted);
    }

    // Brief pause so the Observer's most recent tick has landed in the cache
    // before this run reads it (spec.md §4.5).
    tokio::time::sleep(config.settle_delay()).await;

    let mut revision_metrics: HashMap<String, RevisionMetrics> = cache
        .get_json(&keys::service(&service.name))
        .await?
        .unwrap_or_default();
    let in_flight: InFlightRequests = cache
        .get_json(&keys::requests(&service.name))
        .await?
        .unwrap_or_default();
    let cluster_capacity: ClusterCapacity = cache
        .get_json(keys::AVAILABLE_CLUSTER_RESOURCES)
        .await?
        .unwrap_or_default();

    if cancel.is_cancelled() {
        return Err(ScaleWaveError::Preempted);
    }

    for revision in &service.revisions {
        let replicas = revision.replica_count.unwrap_or_zero();
        let entry = revision_metrics
            .entry(revision.name.clone())
            .or_insert_with(|| zero_metrics(replicas));
        entry.current_replica = replicas;

        let degenerate = is_degenerate(platform, revision, entry).await;
        if degenerate {
            impute_capacity(entry, &cluster_capacity);
        }
    }

    let genes: Vec<RevisionGene> = service
        .revisions
        .iter()
        .map(|r| {
            let m = revision_metrics.get(&r.name).cloned().unwrap_or_else(|| zero_metrics(0));
            RevisionGene {
                normalized_throughput: m.normalized_throughput,
                usage: ClusterCapacity {
                    cpu: m.cpu,
                    memory: m.memory,
                    disk_read: m.disk_read,
                    disk_write: m.disk_write,
                    network_uplink: m.network_uplink,
                    network_downlink: m.network_downlink,
                    gpu: m.gpu,
                },
                is_gpu: r.capability.is_gpu_bearing(),
                max_count: max_count(&m, &cluster_capacity, r.capability.is_gpu_bearing()),
            }
        })
        .collect();

    let total_current_replicas: u32 = service
        .revisions
        .iter()
        .map(|r| r.replica_count.unwrap_or_zero())
        .sum();
    let bound = max_rep_bound(
        &in_flight,
        revision_metrics
            .values()
            .map(|m| m.target_concurrency_per_pod)
            .fold(config.target_concurrency_per_pod, f64::max),
        total_current_replicas,
    );

    if cancel.is_cancelled() {
        return Err(ScaleWaveError::Preempted);
    }

    let mut rng = thread_rng();
    let solution = ga::search(&genes, &cluster_capacity, bound, &mut rng);

    let weighted: Vec<(String, f64)> = service
        .revisions
        .iter()
        .zip(&solution)
        .map(|(r, &count)| {
            let throughput = revision_metrics
                .get(&r.name)
                .map(|m| m.normalized_throughput)
                .unwrap_or(0.0);
            (r.name.clone(), throughput * count as f64)
        })
        .collect();

    let proposed = shaping::largest_remainder(&weighted, 100);

    let current: HashMap<String, u32> = service
        .revisions
        .iter()
        .map(|r| (r.name.clone(), r.traffic_percent))
        .collect();
    let proposed_map: HashMap<String, u32> = proposed.into_iter().collect();
    let smoothed = shaping::smooth(&current, &proposed_map, config.adjustment_factor);

    let gpu_revisions: Vec<String> = service
        .revisions
        .iter()
        .filter(|r| r.capability.is_gpu_bearing())
        .map(|r| r.name.clone())
        .collect();
    let final_split = shaping::dampen_gpu(smoothed, &gpu_revisions, config.gpu_damping_divisor);

    if cancel.is_cancelled() {
        return Err(ScaleWaveError::Preempted);
    }

    platform
        .apply_traffic_split(&service.name, &final_split)
        .await?;

    cache
        .set_json(
            &keys::optimizer_process(&service.name),
            &crate::types::OptimizerRunRecord {
                run_id: run_id.to_string(),
                committed_at: chrono::Utc::now(),
            },
        )
        .await?;

    info!("optimizer run {run_id} committed traffic split for service {}", service.name);
    Ok(())
}

fn zero_metrics(current_replica: u32) -> RevisionMetrics {
    RevisionMetrics {
        throughput: 0.0,
        normalized_throughput: 0.0,
        successful_requests: 0.0,
        latency: 0.0,
        latency_per_request: 0.0,
        queued_requests: 0.0,
        target_concurrency_per_pod: 0.0,
        cpu: 0.0,
        memory: 0.0,
        disk_read: 0.0,
        disk_write: 0.0,
        network_downlink: 0.0,
        network_uplink: 0.0,
        gpu: 0.0,
        current_replica,
    }
}

/// A revision is degenerate when it reports no resource usage at all, or
/// when it is GPU-bearing but its backing node isn't Ready or its pod isn't
/// Running (spec.md §4.4.d) — in both cases its sample can't be trusted for
/// capacity planning.
async fn is_degenerate(
    platform: &dyn PlatformAdapter,
    revision: &crate::types::Revision,
    metrics: &RevisionMetrics,
) -> bool {
    let all_zero = metrics.cpu == 0.0
        && metrics.memory == 0.0
        && metrics.disk_read == 0.0
        && metrics.disk_write == 0.0
        && metrics.network_uplink == 0.0
        && metrics.network_downlink == 0.0
        && metrics.gpu == 0.0;

    if all_zero {
        return true;
    }

    if revision.capability.is_gpu_bearing() {
        let phase_ok = matches!(
            platform.pod_phase(&revision.name).await,
            Ok(PodPhase::Running)
        );
        let node_ok = matches!(
            platform.revision_node_ready(&revision.name).await,
            Ok(NodeReadiness::Ready)
        );
        if !phase_ok || !node_ok {
            return true;
        }
    }

    false
}

/// Substitutes full cluster capacity for a degenerate revision's usage and
/// floors its normalized throughput (spec.md §4.4.d, `THROUGHPUT_FLOOR`).
fn impute_capacity(metrics: &mut RevisionMetrics, capacity: &ClusterCapacity) {
    metrics.cpu = capacity.cpu;
    metrics.memory = capacity.memory;
    metrics.disk_read = capacity.disk_read;
    metrics.disk_write = capacity.disk_write;
    metrics.network_uplink = capacity.network_uplink;
    metrics.network_downlink = capacity.network_downlink;
    metrics.gpu = capacity.gpu;
    metrics.normalized_throughput = metrics.normalized_throughput.max(THROUGHPUT_FLOOR);
}

/// Per-revision replica ceiling: the smallest `available / usage` ratio
/// across resources actually consumed, plus one unit of headroom, floored
/// and never below 1 (spec.md §4.5 `max_count`).
fn max_count(metrics: &RevisionMetrics, capacity: &ClusterCapacity, is_gpu: bool) -> u32 {
    let bound = capacity
        .iter()
        .filter(|(resource, _)| is_gpu || *resource != "gpu")
        .filter_map(|(resource, available)| {
            let usage = ClusterCapacity::usage_of(metrics, resource);
            if usage <= 0.0 {
                None
            } else {
                Some(available / usage)
            }
        })
        .fold(f64::INFINITY, f64::min);

    if !bound.is_finite() {
        return 1.max(1);
    }

    (bound.floor() as i64 + 1).max(1) as u32
}

/// Global replica ceiling derived from current concurrent request load
/// (spec.md §4.5 `max_rep_bound`).
fn max_rep_bound(in_flight: &InFlightRequests, target_concurrency_per_pod: f64, total_current_replicas: u32) -> u32 {
    let needed = if target_concurrency_per_pod > 0.0 {
        (in_flight.total / target_concurrency_per_pod).ceil()
    } else {
        0.0
    };
    let excess = (needed - total_current_replicas as f64).max(0.0);
    excess as u32 + 1
}

/// Whether `throughput_now` represents a regression against
/// `throughput_prev` worth waking the Optimizer for (spec.md §4.4.h).
pub fn is_regression(throughput_prev: f64, throughput_now: f64, regression_threshold: f64) -> bool {
    throughput_prev > crate::types::REGRESSION_EPS && throughput_now <= regression_threshold * throughput_prev
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regression_requires_prior_signal() {
        assert!(!is_regression(0.0, 0.0, 0.95));
        assert!(!is_regression(1e-12, 0.0, 0.95));
    }

    #[test]
    fn regression_fires_on_drop_past_threshold() {
        assert!(is_regression(100.0, 90.0, 0.95));
        assert!(!is_regression(100.0, 96.0, 0.95));
    }

    #[test]
    fn max_rep_bound_adds_headroom_unit() {
        let mut in_flight = InFlightRequests::default();
        in_flight.total = 100.0;
        assert_eq!(max_rep_bound(&in_flight, 20.0, 2), 4);
    }

    #[test]
    fn max_count_floors_and_adds_one() {
        let metrics = zero_metrics(0);
        let mut metrics = metrics;
        metrics.cpu = 2.0;
        let capacity = ClusterCapacity {
            cpu: 10.0,
            ..Default::default()
        };
        assert_eq!(max_count(&metrics, &capacity, false), 6);
    }

    #[test]
    fn max_count_is_one_when_ceiling_and_usage_are_all_zero() {
        // spec.md §9 scenario: a revision that uses nothing against a cluster
        // reporting zero available capacity everywhere — every `available /
        // usage` ratio is skipped (usage <= 0.0), so the bound never becomes
        // finite and falls back to the floor of 1, not a division by zero.
        let metrics = zero_metrics(0);
        let capacity = ClusterCapacity::default();
        assert_eq!(max_count(&metrics, &capacity, false), 1);
        assert_eq!(max_count(&metrics, &capacity, true), 1);
    }

    mod end_to_end {
        use super::*;
        use crate::cache::StateCache;
        use crate::platform::MockPlatformAdapter;
        use crate::types::{ReplicaCount, Revision, RevisionCapability};
        use async_trait::async_trait;
        use std::collections::HashMap as StdHashMap;
        use std::sync::Mutex;

        #[derive(Default)]
        struct FakeCache {
            store: Mutex<StdHashMap<String, String>>,
        }

        #[async_trait]
        impl StateCache for FakeCache {
            async fn get_json<T: serde::de::DeserializeOwned + Send>(
                &self,
                key: &str,
            ) -> Result<Option<T>> {
                let store = self.store.lock().unwrap();
                Ok(match store.get(key) {
                    Some(raw) => Some(serde_json::from_str(raw).unwrap()),
                    None => None,
                })
            }

            async fn set_json<T: serde::Serialize + Send + Sync>(
                &self,
                key: &str,
                value: &T,
            ) -> Result<()> {
                let mut store = self.store.lock().unwrap();
                store.insert(key.to_string(), serde_json::to_string(value).unwrap());
                Ok(())
            }

            async fn delete(&self, key: &str) -> Result<()> {
                self.store.lock().unwrap().remove(key);
                Ok(())
            }
        }

        fn config() -> AppConfig {
            AppConfig {
                observer_frequency: "1m".to_string(),
                panic_timer_secs: 6,
                stable_timer_secs: 30,
                target_concurrency_per_pod: 10.0,
                adjustment_factor: 0.25,
                gpu_revision_marker: "-gpu".to_string(),
                master_node_instance: "10.0.0.1:9100".to_string(),
                regression_threshold: 0.95,
                panic_factor: 1.5,
                gpu_damping_divisor: 8,
                settle_delay_ms: 0,
                adapter_timeout_secs: 10,
                prometheus_url: "http://localhost:9090".to_string(),
                cache_url: "redis://localhost:6379".to_string(),
                kubeconfig_path: None,
                namespace: None,
            }
        }

        fn service_with_two_revisions() -> Service {
            Service {
                name: "svc".to_string(),
                revisions: vec![
                    Revision {
                        name: "svc-00001".to_string(),
                        replica_count: ReplicaCount::Known(2),
                        traffic_percent: 50,
                        capability: RevisionCapability::Standard,
                    },
                    Revision {
                        name: "svc-00002".to_string(),
                        replica_count: ReplicaCount::Known(2),
                        traffic_percent: 50,
                        capability: RevisionCapability::Standard,
                    },
                ],
            }
        }

        #[tokio::test]
        async fn commits_a_traffic_split_summing_to_100() {
            let service = service_with_two_revisions();

            let mut platform = MockPlatformAdapter::new();
            platform
                .expect_pod_phase()
                .returning(|_| Ok(crate::platform::PodPhase::Running));
            platform
                .expect_revision_node_ready()
                .returning(|_| Ok(crate::platform::NodeReadiness::Ready));
            platform
                .expect_apply_traffic_split()
                .withf(|_, weights| weights.iter().map(|(_, w)| *w as i64).sum::<i64>() == 100)
                .returning(|_, _| Ok(()));

            let cache = FakeCache::default();

            let mut revision_metrics = StdHashMap::new();
            for (idx, name) in ["svc-00001", "svc-00002"].iter().enumerate() {
                revision_metrics.insert(
                    name.to_string(),
                    RevisionMetrics {
                        throughput: 10.0 + idx as f64,
                        normalized_throughput: 10.0 + idx as f64,
                        successful_requests: 10.0,
                        latency: 1.0,
                        latency_per_request: 0.1,
                        queued_requests: 0.0,
                        target_concurrency_per_pod: 10.0,
                        cpu: 1.0,
                        memory: 1.0,
                        disk_read: 0.0,
                        disk_write: 0.0,
                        network_downlink: 0.0,
                        network_uplink: 0.0,
                        gpu: 0.0,
                        current_replica: 2,
                    },
                );
            }
            cache
                .set_json(&keys::service(&service.name), &revision_metrics)
                .await
                .unwrap();
            cache
                .set_json(
                    &keys::requests(&service.name),
                    &InFlightRequests {
                        per_revision: StdHashMap::new(),
                        total: 20.0,
                    },
                )
                .await
                .unwrap();
            cache
                .set_json(
                    keys::AVAILABLE_CLUSTER_RESOURCES,
                    &ClusterCapacity {
                        cpu: 100.0,
                        memory: 100.0,
                        disk_read: 100.0,
                        disk_write: 100.0,
                        network_uplink: 100.0,
                        network_downlink: 100.0,
                        gpu: 0.0,
                    },
                )
                .await
                .unwrap();

            let cancel = CancellationToken::new();

            run_optimizer(&service, &platform, &cache, &config(), cancel)
                .await
                .expect("optimizer run should succeed");
        }
    }
}
