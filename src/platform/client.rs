//! `kube`-backed implementation of [`super::PlatformAdapter`].

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use log::warn;

use super::crd::{Revision as RevisionCrd, Service as ServiceCrd, TrafficTarget};
use super::{NodeReadiness, PlatformAdapter, PodPhase};
use crate::error::{Result, ScaleWaveError};
use crate::types::{ReplicaCount, Revision, RevisionCapability, Service};

/// Talks to a Knative-style serving platform over the Kubernetes API.
pub struct KubePlatform {
    client: Client,
    namespace: Option<String>,
    gpu_revision_marker: String,
    timeout: Duration,
}

impl KubePlatform {
    /// Connects using the given kubeconfig path, or in-cluster/default
    /// context configuration when `kubeconfig_path` is `None`, mirroring
    /// the way the teacher's client resolved its own `Client`.
    pub async fn connect(
        kubeconfig_path: Option<&str>,
        namespace: Option<String>,
        gpu_revision_marker: String,
    ) -> anyhow::Result<Self> {
        Self::connect_with_timeout(
            kubeconfig_path,
            namespace,
            gpu_revision_marker,
            Duration::from_secs(10),
        )
        .await
    }

    pub async fn connect_with_timeout(
        kubeconfig_path: Option<&str>,
        namespace: Option<String>,
        gpu_revision_marker: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = match kubeconfig_path {
            Some(path) => {
                let kubeconfig = kube::config::Kubeconfig::read_from(path)?;
                let options = kube::config::KubeConfigOptions::default();
                let config =
                    kube::Config::from_custom_kubeconfig(kubeconfig, &options).await?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };

        Ok(Self {
            client,
            namespace,
            gpu_revision_marker,
            timeout,
        })
    }

    /// Every platform call is bounded by the configured `adapter_timeout`
    /// (spec.md §5 "Timeouts"); an expired call surfaces as an ordinary
    /// `PlatformError` rather than hanging the tick or optimizer run.
    async fn with_timeout<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ScaleWaveError::Platform(format!("platform call timed out after {:?}", self.timeout)))?
    }

    fn services_api(&self) -> Api<ServiceCrd> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn revisions_api(&self) -> Api<RevisionCrd> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn deployments_api(&self) -> Api<Deployment> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn pods_api(&self) -> Api<Pod> {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Revisions belonging to `service_name`, matched by `configuration_name`
    /// label (Knative's own convention), sorted the way spec.md §4.1 asks:
    /// ascending by trailing numeric suffix, non-numeric suffixes last.
    async fn revisions_for(&self, service_name: &str) -> Result<Vec<Revision>> {
        let lp = ListParams::default()
            .labels(&format!("serving.knative.dev/configuration={service_name}"));
        let list = self
            .revisions_api()
            .list(&lp)
            .await
            .map_err(|e| ScaleWaveError::Platform(e.to_string()))?;

        let mut revisions: Vec<Revision> = Vec::with_capacity(list.items.len());
        for item in list.items {
            let Some(name) = item.metadata.name.clone() else {
                continue;
            };
            let replica_count = self.replica_count(&name).await.unwrap_or(ReplicaCount::Unknown);
            let capability = if name.contains(&self.gpu_revision_marker) {
                RevisionCapability::GpuBearing
            } else {
                RevisionCapability::Standard
            };
            revisions.push(Revision {
                name,
                replica_count,
                traffic_percent: 0,
                capability,
            });
        }

        revisions.sort_by(|a, b| compare_by_trailing_suffix(&a.name, &b.name));
        Ok(revisions)
    }
}

/// Ascending by trailing numeric suffix (`svc-00001` before `svc-00002`);
/// names without a numeric suffix sort after every numeric one, then
/// lexicographically among themselves.
fn compare_by_trailing_suffix(a: &str, b: &str) -> Ordering {
    fn trailing_number(name: &str) -> Option<u64> {
        let digits: String = name
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            return None;
        }
        digits.chars().rev().collect::<String>().parse().ok()
    }

    match (trailing_number(a), trailing_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[async_trait]
impl PlatformAdapter for KubePlatform {
    async fn list_services(&self) -> Result<Vec<Service>> {
        let lp = ListParams::default();
        let list = self
            .with_timeout(async { self.services_api().list(&lp).await.map_err(|e| ScaleWaveError::Platform(e.to_string())) })
            .await?;

        let mut services = Vec::with_capacity(list.items.len());
        for item in list.items {
            let Some(name) = item.metadata.name.clone() else {
                continue;
            };
            let mut revisions = self.revisions_for(&name).await?;

            if let Some(status) = item.status {
                apply_traffic_percentages(&mut revisions, &status.traffic);
            }

            services.push(Service { name, revisions });
        }

        Ok(services)
    }

    async fn replica_count(&self, revision_name: &str) -> Result<ReplicaCount> {
        let fetched = self
            .with_timeout(async {
                match self.deployments_api().get(revision_name).await {
                    Ok(deployment) => Ok(Some(deployment)),
                    Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
                    Err(e) => Err(ScaleWaveError::Platform(e.to_string())),
                }
            })
            .await?;

        Ok(match fetched {
            Some(deployment) => {
                let replicas = deployment
                    .status
                    .and_then(|s| s.replicas)
                    .unwrap_or(0)
                    .max(0) as u32;
                ReplicaCount::Known(replicas)
            }
            None => ReplicaCount::Unknown,
        })
    }

    async fn node_ready(&self, node_name: &str) -> Result<NodeReadiness> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        self.with_timeout(async {
            match nodes.get(node_name).await {
                Ok(node) => {
                    let ready = node
                        .status
                        .and_then(|s| s.conditions)
                        .into_iter()
                        .flatten()
                        .find(|c| c.type_ == "Ready")
                        .map(|c| c.status == "True")
                        .unwrap_or(false);
                    Ok(if ready {
                        NodeReadiness::Ready
                    } else {
                        NodeReadiness::NotReady
                    })
                }
                Err(kube::Error::Api(e)) if e.code == 404 => Ok(NodeReadiness::NotFound),
                Err(e) => Err(ScaleWaveError::Platform(e.to_string())),
            }
        })
        .await
    }

    async fn revision_node_ready(&self, revision_name: &str) -> Result<NodeReadiness> {
        let lp = ListParams::default()
            .labels(&format!("serving.knative.dev/revision={revision_name}"));
        let list = self
            .with_timeout(async { self.pods_api().list(&lp).await.map_err(|e| ScaleWaveError::Platform(e.to_string())) })
            .await?;

        let node_name = list
            .items
            .into_iter()
            .find_map(|p| p.spec.and_then(|s| s.node_name));

        match node_name {
            Some(node_name) => self.node_ready(&node_name).await,
            None => Ok(NodeReadiness::NotFound),
        }
    }

    async fn pod_phase(&self, revision_name: &str) -> Result<PodPhase> {
        let lp = ListParams::default()
            .labels(&format!("serving.knative.dev/revision={revision_name}"));
        let list = self
            .with_timeout(async { self.pods_api().list(&lp).await.map_err(|e| ScaleWaveError::Platform(e.to_string())) })
            .await?;

        if list.items.is_empty() {
            return Ok(PodPhase::Unknown);
        }

        let phases: Vec<Option<String>> = list
            .items
            .into_iter()
            .map(|p| p.status.and_then(|s| s.phase))
            .collect();

        if phases.iter().any(|p| p.as_deref() == Some("Running")) {
            return Ok(PodPhase::Running);
        }

        match phases.into_iter().flatten().next().as_deref() {
            Some("Pending") => Ok(PodPhase::Pending),
            Some(_) => Ok(PodPhase::Other),
            None => Ok(PodPhase::Unknown),
        }
    }

    async fn apply_traffic_split(
        &self,
        service_name: &str,
        weights: &[(String, u32)],
    ) -> Result<()> {
        let total: i64 = weights.iter().map(|(_, w)| *w as i64).sum();
        if total != 100 || weights.iter().any(|(_, w)| (*w as i64) < 0) {
            return Err(ScaleWaveError::Consistency(format!(
                "weights sum to {total}, expected 100 with no negative entries"
            )));
        }

        let traffic: Vec<TrafficTarget> = weights
            .iter()
            .map(|(revision, percent)| TrafficTarget {
                revision_name: Some(revision.clone()),
                configuration_name: None,
                percent: Some(*percent as i64),
                tag: None,
                latest_revision: Some(false),
            })
            .collect();

        let patch = serde_json::json!({
            "spec": { "traffic": traffic },
        });

        let first = tokio::time::timeout(
            self.timeout,
            self.services_api()
                .patch(service_name, &PatchParams::apply("scalewave"), &Patch::Merge(&patch)),
        )
        .await
        .map_err(|_| ScaleWaveError::Platform(format!("platform call timed out after {:?}", self.timeout)))?;

        match first {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                warn!("traffic split patch for {service_name} hit a 409 conflict, retrying once");
                tokio::time::timeout(
                    self.timeout,
                    self.services_api().patch(
                        service_name,
                        &PatchParams::apply("scalewave"),
                        &Patch::Merge(&patch),
                    ),
                )
                .await
                .map_err(|_| ScaleWaveError::Platform(format!("platform call timed out after {:?}", self.timeout)))?
                .map(|_| ())
                .map_err(|e| ScaleWaveError::Platform(e.to_string()))
            }
            Err(e) => Err(ScaleWaveError::Platform(e.to_string())),
        }
    }
}

/// Fills in `traffic_percent` on each revision from the Service's reported
/// traffic block, matching by revision name first and `configuration_name`
/// as a fallback (spec.md §9 Open Question (a)).
fn apply_traffic_percentages(revisions: &mut [Revision], traffic: &[TrafficTarget]) {
    for revision in revisions.iter_mut() {
        let percent = traffic
            .iter()
            .find(|t| t.revision_name.as_deref() == Some(revision.name.as_str()))
            .and_then(|t| t.percent)
            .unwrap_or(0);
        revision.traffic_percent = percent.max(0) as u32;
    }
}
