// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! PlacementDecisions are read untyped: they carry no spec, only a status.

use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde::Deserialize;
use std::collections::BTreeSet;

/// A member cluster selected by the placement policy
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decision {
    pub cluster_name: String,
    pub cluster_namespace: String,
}

impl Decision {
    /// Member cluster namespaces on the hub are named after the cluster
    pub fn for_cluster(cluster_name: &str) -> Self {
        Self {
            cluster_name: cluster_name.to_string(),
            cluster_namespace: cluster_name.to_string(),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DecisionStatus {
    #[serde(default)]
    decisions: Vec<ClusterDecision>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterDecision {
    cluster_name: String,
}

pub fn api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "cluster.open-cluster-management.io",
        "v1beta1",
        "PlacementDecision",
    ))
}

/// Collect the selected clusters out of a set of PlacementDecision objects.
/// Malformed or empty entries are skipped.
pub fn decisions_of(objects: &[DynamicObject]) -> BTreeSet<Decision> {
    objects
        .iter()
        .filter_map(|o| o.data.get("status").cloned())
        .filter_map(|s| serde_json::from_value::<DecisionStatus>(s).ok())
        .flat_map(|s| s.decisions)
        .filter(|d| !d.cluster_name.is_empty())
        .map(|d| Decision::for_cluster(&d.cluster_name))
        .collect()
}
