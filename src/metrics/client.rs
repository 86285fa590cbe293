//! `reqwest`-backed implementation of [`super::MetricsAdapter`], querying a
//! Prometheus-compatible `/api/v1/query` endpoint the way the Python
//! prototype used `prometheus_api_client.PrometheusConnect.custom_query`,
//! but returning a typed [`super::PromQueryResult`] instead of a raw dict.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{query, ClusterUsage, MetricsAdapter, PromQueryResult, PromSample, RawRevisionMetrics};
use crate::error::{Result, ScaleWaveError};
use crate::types::InFlightRequests;

pub struct PrometheusMetrics {
    http: reqwest::Client,
    base_url: String,
    master_node_instance: String,
    timeout: Duration,
}

impl PrometheusMetrics {
    pub fn new(base_url: String, master_node_instance: String) -> Self {
        Self::with_timeout(base_url, master_node_instance, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: String, master_node_instance: String, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            master_node_instance,
            timeout,
        }
    }

    /// Every query carries the configured `adapter_timeout` (spec.md §5
    /// "Timeouts"), surfacing an expired call as an ordinary `MetricsError`
    /// rather than hanging the caller.
    async fn query(&self, promql: &str) -> Result<PromQueryResult> {
        tokio::time::timeout(self.timeout, self.query_uncapped(promql))
            .await
            .map_err(|_| ScaleWaveError::Metrics(format!("query timed out after {:?}: {promql}", self.timeout)))?
    }

    async fn query_uncapped(&self, promql: &str) -> Result<PromQueryResult> {
        let response = self
            .http
            .get(format!("{}/api/v1/query", self.base_url))
            .query(&[("query", promql)])
            .send()
            .await
            .map_err(|e| ScaleWaveError::Metrics(e.to_string()))?;

        let body: PrometheusResponse = response
            .json()
            .await
            .map_err(|e| ScaleWaveError::Metrics(e.to_string()))?;

        if body.status != "success" {
            return Err(ScaleWaveError::Metrics(format!(
                "prometheus query failed: {promql}"
            )));
        }

        Ok(body.data.into_result())
    }

    async fn scalar(&self, promql: &str) -> Result<f64> {
        Ok(self.query(promql).await?.as_scalar())
    }
}

#[async_trait]
impl MetricsAdapter for PrometheusMetrics {
    async fn cluster_usage(&self, window: &str) -> Result<ClusterUsage> {
        let m = &self.master_node_instance;
        Ok(ClusterUsage {
            cpu_available: self
                .scalar(&query::cluster_cpu_available_millicores(m, window))
                .await?,
            memory_available: self.scalar(&query::cluster_memory_available_mib(m)).await?,
            disk_read_rate: self
                .scalar(&query::cluster_disk_read_mib_per_sec(m, window))
                .await?,
            disk_write_rate: self
                .scalar(&query::cluster_disk_write_mib_per_sec(m, window))
                .await?,
            network_uplink_rate: self
                .scalar(&query::cluster_network_transmit_mbps(m, window))
                .await?,
            network_downlink_rate: self
                .scalar(&query::cluster_network_receive_mbps(m, window))
                .await?,
            gpu_available: self
                .scalar(&query::cluster_gpu_available_percent(m, window))
                .await?,
        })
    }

    async fn revision_metrics(
        &self,
        service_name: &str,
        revision_names: &[String],
        window: &str,
    ) -> Result<HashMap<String, RawRevisionMetrics>> {
        let cpu = self.query(&query::revision_cpu_usage(service_name, window)).await?;
        let memory = self.query(&query::revision_memory_usage(service_name)).await?;
        let disk_read = self.query(&query::revision_disk_read(service_name, window)).await?;
        let disk_write = self.query(&query::revision_disk_write(service_name, window)).await?;
        let net_up = self.query(&query::revision_network_uplink(service_name, window)).await?;
        let net_down = self.query(&query::revision_network_downlink(service_name, window)).await?;
        let gpu = self.query(&query::revision_gpu_usage(service_name)).await?;
        let successful_requests = self.query(&query::revision_throughput(service_name, window)).await?;
        let total_requests = self
            .query(&query::revision_total_requests(service_name, window))
            .await?;
        let latency_sum = self.query(&query::revision_latency_sum(service_name, window)).await?;
        let activator_latency_sum = self
            .query(&query::revision_activator_latency_sum(service_name, window))
            .await?;
        let queued = self.query(&query::revision_queued_requests(service_name)).await?;
        let target_concurrency = self.query(&query::revision_target_concurrency(service_name)).await?;

        let mut out = HashMap::new();
        for name in revision_names {
            let lookup = |result: &PromQueryResult| -> f64 {
                sample_for_revision(result.as_vector(), name, revision_names).unwrap_or(0.0)
            };

            out.insert(
                name.clone(),
                RawRevisionMetrics {
                    successful_requests: lookup(&successful_requests),
                    total_requests: lookup(&total_requests),
                    request_latency_sum: lookup(&latency_sum),
                    activator_latency_sum: lookup(&activator_latency_sum),
                    queued_requests: lookup(&queued),
                    target_concurrency_per_pod: lookup(&target_concurrency),
                    cpu: lookup(&cpu),
                    memory: lookup(&memory),
                    disk_read: lookup(&disk_read),
                    disk_write: lookup(&disk_write),
                    network_downlink: lookup(&net_down),
                    network_uplink: lookup(&net_up),
                    gpu: lookup(&gpu),
                },
            );
        }

        Ok(out)
    }

    async fn in_flight_requests(
        &self,
        service_name: &str,
        revision_names: &[String],
    ) -> Result<InFlightRequests> {
        let result = self.query(&query::revision_in_flight(service_name)).await?;
        let mut per_revision = HashMap::new();
        let mut total = 0.0;
        for name in revision_names {
            let value = sample_for_revision(result.as_vector(), name, revision_names).unwrap_or(0.0);
            total += value;
            per_revision.insert(name.clone(), value);
        }
        Ok(InFlightRequests { per_revision, total })
    }
}

/// Resolves one revision's value out of a vector result: prefer an exact
/// `revision_name` label match (the platform's own identity label), and
/// fall back to the longest `pod` prefix match among the known revision
/// names when that label is absent (spec.md §9 Open Question (a)).
fn sample_for_revision(samples: &[PromSample], revision: &str, all_revisions: &[String]) -> Option<f64> {
    if let Some(sample) = samples
        .iter()
        .find(|s| s.labels.get("revision_name").map(String::as_str) == Some(revision))
    {
        return Some(sample.value);
    }

    samples
        .iter()
        .filter_map(|s| {
            let pod = s.labels.get("pod")?;
            let matched = all_revisions
                .iter()
                .filter(|candidate| pod.starts_with(candidate.as_str()))
                .max_by_key(|candidate| candidate.len())?;
            if matched == revision {
                Some(s.value)
            } else {
                None
            }
        })
        .next()
}

#[derive(Debug, Deserialize)]
struct PrometheusResponse {
    status: String,
    data: PrometheusData,
}

/// Prometheus's instant-query response shapes its `result` field
/// differently per `resultType`: a `vector` query returns an array of
/// `{metric, value}` objects, a bare `scalar` expression returns a single
/// `[timestamp, "value"]` pair instead. `result` is kept untyped here and
/// interpreted by `into_result` rather than forced into one `Deserialize`
/// shape.
#[derive(Debug, Deserialize)]
struct PrometheusData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

impl PrometheusData {
    fn into_result(self) -> PromQueryResult {
        match self.result_type.as_str() {
            "scalar" => PromQueryResult::Scalar(parse_sample_value(&self.result).unwrap_or(0.0)),
            _ => {
                let samples = self
                    .result
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|item| {
                        let labels = item.get("metric")?.as_object()?.iter().map(|(k, v)| {
                            (k.clone(), v.as_str().unwrap_or_default().to_string())
                        }).collect();
                        let value = parse_sample_value(item.get("value")?)?;
                        Some(PromSample { labels, value })
                    })
                    .collect();
                PromQueryResult::Vector(samples)
            }
        }
    }
}

/// Parses a Prometheus `[timestamp, "value"]` pair into just the value.
fn parse_sample_value(value: &serde_json::Value) -> Option<f64> {
    value.as_array()?.get(1)?.as_str()?.parse().ok()
}
