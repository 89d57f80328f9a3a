// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Diff-and-apply deployer.
//!
//! Each desired manifest is compared against its live counterpart with the
//! kind's own equality predicate, and written at most once per call.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{Api, DynamicObject, PostParams};
use kube::{Client, Resource, ResourceExt};
use std::fmt;
use tracing::{debug, error, info, instrument};

use crate::constants::annotations;
use crate::error::Result;
use crate::kubernetes::delete_if_exists;
use crate::manifest::{Manifest, Reconcilable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated => "updated",
            ApplyOutcome::Unchanged => "unchanged",
        };
        f.write_str(s)
    }
}

/// Whether a live object asks to be left alone
pub fn skips_update<K: ResourceExt>(live: &K) -> bool {
    live.annotations()
        .get(annotations::SKIP_CREATION_IF_EXIST)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Create `desired` if missing, otherwise update it when the kind's predicate
/// reports a difference. The write always starts from the live object.
pub async fn apply<K: Reconcilable>(api: &Api<K>, desired: &K) -> Result<ApplyOutcome> {
    let name = desired.name_any();

    let Some(live) = api.get_opt(&name).await? else {
        api.create(&PostParams::default(), desired).await?;
        return Ok(ApplyOutcome::Created);
    };

    if skips_update(&live) {
        debug!("{} is marked skip-creation-if-exist, leaving it", name);
        return Ok(ApplyOutcome::Unchanged);
    }

    if desired.matches(&live) {
        return Ok(ApplyOutcome::Unchanged);
    }

    api.replace(&name, &PostParams::default(), &desired.merge_onto(&live))
        .await?;
    Ok(ApplyOutcome::Updated)
}

#[derive(Clone)]
pub struct Deployer {
    client: Client,
    namespace: String,
}

impl Deployer {
    /// `namespace` is used for namespaced manifests that carry none
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn namespace_of(&self, manifest: &Manifest) -> String {
        manifest
            .namespace()
            .unwrap_or_else(|| self.namespace.clone())
    }

    fn namespaced<K>(&self, manifest: &Manifest) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace_of(manifest))
    }

    fn cluster<K>(&self) -> Api<K>
    where
        K: Resource<Scope = ClusterResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::all(self.client.clone())
    }

    /// Reconcile one desired manifest against the store
    #[instrument(skip(self, manifest), fields(manifest = %manifest))]
    pub async fn deploy(&self, manifest: &Manifest) -> Result<ApplyOutcome> {
        let outcome = match manifest {
            Manifest::Deployment(obj) => apply(&self.namespaced(manifest), obj).await,
            Manifest::StatefulSet(obj) => apply(&self.namespaced(manifest), obj).await,
            Manifest::Service(obj) => apply(&self.namespaced(manifest), obj).await,
            Manifest::Secret(obj) => apply(&self.namespaced(manifest), obj).await,
            Manifest::ConfigMap(obj) => apply(&self.namespaced(manifest), obj).await,
            Manifest::ServiceAccount(obj) => apply(&self.namespaced(manifest), obj).await,
            Manifest::Role(obj) => apply(&self.namespaced(manifest), obj).await,
            Manifest::RoleBinding(obj) => apply(&self.namespaced(manifest), obj).await,
            Manifest::ClusterRole(obj) => apply(&self.cluster(), obj).await,
            Manifest::ClusterRoleBinding(obj) => apply(&self.cluster(), obj).await,
            Manifest::Namespace(obj) => apply(&self.cluster(), obj).await,
            Manifest::Other(obj) => apply(&self.dynamic_api(manifest), obj).await,
        };

        match &outcome {
            Ok(ApplyOutcome::Unchanged) => debug!("{} unchanged", manifest),
            Ok(o) => info!("{} {}", manifest, o),
            Err(e) => error!("Failed to apply {}: {}", manifest, e),
        }
        outcome
    }

    /// Deploy every manifest in order, stopping at the first failure
    pub async fn deploy_all(&self, manifests: &[Manifest]) -> Result<Vec<ApplyOutcome>> {
        let mut outcomes = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            outcomes.push(self.deploy(manifest).await?);
        }
        let written = outcomes
            .iter()
            .filter(|o| **o != ApplyOutcome::Unchanged)
            .count();
        info!("Applied {} manifests, {} written", manifests.len(), written);
        Ok(outcomes)
    }

    /// Delete the live counterpart of `manifest` if there is one
    #[instrument(skip(self, manifest), fields(manifest = %manifest))]
    pub async fn undeploy(&self, manifest: &Manifest) -> Result<bool> {
        let name = manifest.name();
        match manifest {
            Manifest::Deployment(_) => delete_if_exists(&self.namespaced::<Deployment>(manifest), &name).await,
            Manifest::StatefulSet(_) => delete_if_exists(&self.namespaced::<StatefulSet>(manifest), &name).await,
            Manifest::Service(_) => delete_if_exists(&self.namespaced::<Service>(manifest), &name).await,
            Manifest::Secret(_) => delete_if_exists(&self.namespaced::<Secret>(manifest), &name).await,
            Manifest::ConfigMap(_) => delete_if_exists(&self.namespaced::<ConfigMap>(manifest), &name).await,
            Manifest::ServiceAccount(_) => delete_if_exists(&self.namespaced::<ServiceAccount>(manifest), &name).await,
            Manifest::Role(_) => delete_if_exists(&self.namespaced::<Role>(manifest), &name).await,
            Manifest::RoleBinding(_) => delete_if_exists(&self.namespaced::<RoleBinding>(manifest), &name).await,
            Manifest::ClusterRole(_) => delete_if_exists(&self.cluster::<ClusterRole>(), &name).await,
            Manifest::ClusterRoleBinding(_) => delete_if_exists(&self.cluster::<ClusterRoleBinding>(), &name).await,
            Manifest::Namespace(_) => delete_if_exists(&self.cluster::<Namespace>(), &name).await,
            Manifest::Other(_) => delete_if_exists(&self.dynamic_api(manifest), &name).await,
        }
    }

    fn dynamic_api(&self, manifest: &Manifest) -> Api<DynamicObject> {
        let resource = manifest.api_resource();
        if manifest.is_cluster_scoped() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), &self.namespace_of(manifest), &resource)
        }
    }
}
