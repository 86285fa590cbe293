//! Typed custom resources for the Knative-style serving platform: `Service`
//! and `Revision`. Declared the way the rest of the `kube`-rs ecosystem
//! declares a CRD it doesn't own a generated client for: a plain struct
//! plus `#[derive(CustomResource)]`, rather than an untyped `DynamicObject`.
//!
//! ScaleWave only ever reads these objects and patches a `Service`'s traffic
//! block (spec.md §1 "does not create, delete, or version revisions").

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "serving.knative.dev",
    version = "v1",
    kind = "Service",
    namespaced,
    status = "ServiceStatus"
)]
pub struct ServiceSpec {
    /// Revision template; ScaleWave never reads or writes it.
    #[serde(default)]
    pub template: serde_json::Value,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct ServiceStatus {
    #[serde(default)]
    pub traffic: Vec<TrafficTarget>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "latestReadyRevisionName", default)]
    pub latest_ready_revision_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct TrafficTarget {
    #[serde(rename = "revisionName", default)]
    pub revision_name: Option<String>,
    #[serde(rename = "configurationName", default)]
    pub configuration_name: Option<String>,
    #[serde(default)]
    pub percent: Option<i64>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(rename = "latestRevision", default)]
    pub latest_revision: Option<bool>,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "serving.knative.dev",
    version = "v1",
    kind = "Revision",
    namespaced,
    status = "RevisionStatus"
)]
pub struct RevisionSpec {
    #[serde(default)]
    pub container_concurrency: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct RevisionStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "actualReplicas", default)]
    pub actual_replicas: Option<i32>,
}
