// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::{CustomResource, Resource};
use serde::{Deserialize, Serialize};

use crate::manifest::equality::merge_metadata;
use crate::manifest::{Manifest, Reconcilable};

/// A bundle of manifests applied on one member cluster by its work agent
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "work.open-cluster-management.io", version = "v1", kind = "ManifestWork")]
#[kube(namespaced)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkSpec {
    #[serde(default)]
    pub workload: ManifestsTemplate,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct ManifestsTemplate {
    #[serde(default)]
    pub manifests: Vec<serde_json::Value>,
}

impl ManifestWork {
    pub fn manifests(&self) -> &[serde_json::Value] {
        &self.spec.workload.manifests
    }

    pub fn is_terminating(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }
}

/// Same length, pairwise identity and pairwise kind-specific equality.
/// Anything that no longer parses as a manifest counts as drift.
fn bundles_equal(desired: &[serde_json::Value], live: &[serde_json::Value]) -> bool {
    desired.len() == live.len()
        && desired.iter().zip(live).all(|(d, l)| {
            match (Manifest::from_value(d.clone()), Manifest::from_value(l.clone())) {
                (Ok(d), Ok(l)) => same_identity(&d, &l) && d.semantically_equal(&l),
                _ => false,
            }
        })
}

fn same_identity(desired: &Manifest, live: &Manifest) -> bool {
    desired.api_version() == live.api_version()
        && desired.kind() == live.kind()
        && desired.name() == live.name()
        && desired.namespace() == live.namespace()
}

impl Reconcilable for ManifestWork {
    fn matches(&self, live: &Self) -> bool {
        bundles_equal(self.manifests(), live.manifests())
    }

    /// The whole spec is replaced; only identity survives
    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        updated.spec = self.spec.clone();
        updated
    }
}
