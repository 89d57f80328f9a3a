// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use crate::manifest::equality::merge_metadata;
use crate::manifest::Reconcilable;

/// Marker recording that the observability addon is installed on a member cluster
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "addon.open-cluster-management.io",
    version = "v1alpha1",
    kind = "ManagedClusterAddOn"
)]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAddOnSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_namespace: Option<String>,
}

impl Reconcilable for ManagedClusterAddOn {
    fn matches(&self, live: &Self) -> bool {
        self.spec == live.spec
    }

    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        updated.spec = self.spec.clone();
        updated
    }
}
