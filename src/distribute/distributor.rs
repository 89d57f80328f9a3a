// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Placement-driven distribution of work bundles.
//!
//! One pass makes the set of clusters holding a bundle equal the current
//! decision set. Clusters are independent units: a failure on one is recorded
//! and the others still converge.

use futures::{stream, StreamExt};
use kube::api::{Api, DynamicObject, ListParams, PostParams};
use kube::{Client, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::constants::{labels, names};
use crate::deploy;
use crate::error::{ClusterFailure, OperatorError, Result};
use crate::kubernetes::delete_if_exists;
use crate::manifest::{Manifest, Reconcilable};
use crate::render::Renderer;
use crate::types::placement::{self, decisions_of};
use crate::types::{
    Decision, ManagedClusterAddOn, ManagedClusterAddOnSpec, ManifestWork,
    MultiClusterObservability,
};

use super::allowlist;
use super::bootstrap;
use super::bundle::{self, owner_labels, BundleContent, SharedInputs};
use super::hubinfo::{receive_endpoint, HubInfo};

/// What happened to one cluster's bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleOutcome {
    Created,
    Updated,
    Unchanged,
    /// The bundle is being deleted; try again on a later pass
    RetryLater,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DistributionReport {
    pub outcomes: BTreeMap<String, BundleOutcome>,
    pub removed: Vec<String>,
}

impl DistributionReport {
    /// Whether some cluster asked to be revisited
    pub fn needs_retry(&self) -> bool {
        self.outcomes.values().any(|o| *o == BundleOutcome::RetryLater)
    }
}

/// Selected clusters of the configured placement
#[instrument(skip(client, config))]
pub async fn load_decisions(client: &Client, config: &Config) -> Result<BTreeSet<Decision>> {
    let api: Api<DynamicObject> =
        Api::namespaced_with(client.clone(), &config.namespace, &placement::api_resource());
    let selector = format!("{}={}", labels::PLACEMENT, config.placement_name);
    let list = api.list(&ListParams::default().labels(&selector)).await?;
    Ok(decisions_of(&list.items))
}

#[derive(Clone)]
pub struct Distributor {
    client: Client,
    config: Arc<Config>,
    renderer: Renderer,
}

impl Distributor {
    pub fn new(client: Client, config: Arc<Config>, renderer: Renderer) -> Self {
        Self {
            client,
            config,
            renderer,
        }
    }

    fn markers(&self, namespace: &str) -> Api<ManagedClusterAddOn> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn works(&self, namespace: &str) -> Api<ManifestWork> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Cluster namespaces that currently hold an owned addon marker or bundle
    async fn observed_namespaces(&self) -> Result<BTreeSet<String>> {
        let params = ListParams::default().labels(&labels::owner_selector());
        let markers = Api::<ManagedClusterAddOn>::all(self.client.clone())
            .list(&params)
            .await?;
        let works = Api::<ManifestWork>::all(self.client.clone())
            .list(&params)
            .await?;

        Ok(markers
            .items
            .iter()
            .filter_map(|m| m.namespace())
            .chain(works.items.iter().filter_map(|w| w.namespace()))
            .collect())
    }

    async fn shared_inputs(&self, mco: &MultiClusterObservability) -> Result<SharedInputs> {
        let namespace = &self.config.namespace;
        let pull_secret_name = mco.spec.defaulted().image_pull_secret.unwrap_or_default();
        Ok(SharedInputs {
            allowlist: allowlist::load(&self.client, namespace).await?,
            certificates: bundle::load_certificates(&self.client, namespace).await?,
            pull_secret: bundle::load_pull_secret(&self.client, namespace, &pull_secret_name).await?,
        })
    }

    /// Converge bundles to `decisions`.
    ///
    /// Every cluster is attempted and stale clusters are always cleaned up.
    /// Per-cluster failures are collected into [`OperatorError::Distribution`].
    /// When a shared hub input cannot be read no cluster is synced, stale
    /// clusters are still removed, and that error is returned.
    #[instrument(skip(self, mco, decisions), fields(clusters = decisions.len()))]
    pub async fn distribute(
        &self,
        mco: &MultiClusterObservability,
        decisions: &BTreeSet<Decision>,
    ) -> Result<DistributionReport> {
        let observed = self.observed_namespaces().await?;
        let mut shared_error = None;
        let mut report = DistributionReport::default();
        let mut failures = Vec::new();

        // a hub input failure skips the per-cluster sync but not the cleanup
        let shared = if decisions.is_empty() {
            None
        } else {
            match self.shared_inputs(mco).await {
                Ok(shared) => Some(shared),
                Err(error) => {
                    error!("Shared hub inputs unavailable: {}", error);
                    shared_error = Some(error);
                    None
                }
            }
        };

        if let Some(shared) = shared.as_ref() {
            let results: Vec<(String, Result<BundleOutcome>)> = stream::iter(decisions.iter().cloned())
                .map(|decision| async move {
                    let outcome = self.sync_cluster(mco, &decision, shared).await;
                    (decision.cluster_name, outcome)
                })
                .buffer_unordered(self.config.distribution_concurrency.max(1))
                .collect()
                .await;

            for (cluster, result) in results {
                match result {
                    Ok(outcome) => {
                        report.outcomes.insert(cluster, outcome);
                    }
                    Err(error) => {
                        error!("Distribution to {} failed: {}", cluster, error);
                        failures.push(ClusterFailure { cluster, error });
                    }
                }
            }
        }

        let wanted: BTreeSet<&str> = decisions
            .iter()
            .map(|d| d.cluster_namespace.as_str())
            .collect();
        for namespace in observed.iter().filter(|ns| !wanted.contains(ns.as_str())) {
            match self.remove_cluster(namespace).await {
                Ok(()) => report.removed.push(namespace.clone()),
                Err(error) => {
                    error!("Cleanup of {} failed: {}", namespace, error);
                    failures.push(ClusterFailure {
                        cluster: namespace.clone(),
                        error,
                    });
                }
            }
        }

        if let Some(error) = shared_error {
            return Err(error);
        }
        if !failures.is_empty() {
            failures.sort_by(|a, b| a.cluster.cmp(&b.cluster));
            return Err(OperatorError::Distribution(failures));
        }
        info!(
            "Distributed to {} clusters, removed {}",
            report.outcomes.len(),
            report.removed.len()
        );
        Ok(report)
    }

    /// Bundle content for one cluster, computed fresh
    pub async fn build_work(
        &self,
        mco: &MultiClusterObservability,
        decision: &Decision,
        shared: &SharedInputs,
    ) -> Result<ManifestWork> {
        let addon = mco.spec.defaulted().addon();
        let access = bootstrap::acquire(&self.client, &decision.cluster_namespace).await?;
        let kubeconfig = access.kubeconfig(&self.config.hub_api_server, &decision.cluster_namespace)?;

        BundleContent {
            decision,
            hub_info: HubInfo {
                cluster_name: decision.cluster_name.clone(),
                endpoint: receive_endpoint(&self.config.hub_endpoint)?,
                enable_metrics: addon.enable_metrics,
                interval: addon.interval,
                delete_flag: false,
            },
            kubeconfig,
            shared,
            addon_manifests: self.renderer.render_addon(mco, decision)?,
        }
        .into_work()
    }

    #[instrument(skip(self, mco, shared), fields(cluster = %decision.cluster_name))]
    async fn sync_cluster(
        &self,
        mco: &MultiClusterObservability,
        decision: &Decision,
        shared: &SharedInputs,
    ) -> Result<BundleOutcome> {
        let namespace = &decision.cluster_namespace;

        let mut marker = ManagedClusterAddOn::new(
            names::ADDON,
            ManagedClusterAddOnSpec {
                install_namespace: Some(names::ADDON_NAMESPACE.to_string()),
            },
        );
        marker.metadata.namespace = Some(namespace.clone());
        marker.metadata.labels = Some(owner_labels());
        deploy::apply(&self.markers(namespace), &marker).await?;

        let desired = self.build_work(mco, decision, shared).await?;
        let works = self.works(namespace);
        let name = desired.name_any();

        let Some(live) = works.get_opt(&name).await? else {
            works.create(&PostParams::default(), &desired).await?;
            info!("Created work {}/{}", namespace, name);
            return Ok(BundleOutcome::Created);
        };

        if live.is_terminating() {
            warn!("Work {}/{} is terminating, retrying later", namespace, name);
            return Ok(BundleOutcome::RetryLater);
        }

        if desired.matches(&live) {
            debug!("Work {}/{} unchanged", namespace, name);
            return Ok(BundleOutcome::Unchanged);
        }

        works
            .replace(&name, &PostParams::default(), &desired.merge_onto(&live))
            .await?;
        info!("Updated work {}/{}", namespace, name);
        Ok(BundleOutcome::Updated)
    }

    /// Delete the bundle, marker and credentials of a deselected cluster
    #[instrument(skip(self))]
    async fn remove_cluster(&self, namespace: &str) -> Result<()> {
        let work_name = bundle::work_name(namespace);
        delete_if_exists(&self.works(namespace), &work_name).await?;
        delete_if_exists(&self.markers(namespace), names::ADDON).await?;
        bootstrap::revoke(&self.client, namespace).await?;
        info!("Removed observability from {}", namespace);
        Ok(())
    }

    /// Graceful removal of every bundle: flip the hub-info delete flag so the
    /// addon can clean up, then delete bundles and markers.
    #[instrument(skip(self))]
    pub async fn teardown(&self) -> Result<()> {
        let works = Api::<ManifestWork>::all(self.client.clone())
            .list(&ListParams::default().labels(&labels::owner_selector()))
            .await?;

        for work in works.items.iter().filter(|w| !w.is_terminating()) {
            let namespace = work.namespace().unwrap_or_default();
            let flagged = with_delete_flag(work)?;
            if flagged.manifests() != work.manifests() {
                self.works(&namespace)
                    .replace(&work.name_any(), &PostParams::default(), &flagged)
                    .await?;
                debug!("Set delete flag on {}/{}", namespace, work.name_any());
            }
        }

        for namespace in self.observed_namespaces().await? {
            self.remove_cluster(&namespace).await?;
        }
        Ok(())
    }
}

/// Copy of `work` whose hub-info secret carries `delete-flag: true`
fn with_delete_flag(work: &ManifestWork) -> Result<ManifestWork> {
    let mut flagged = work.clone();
    for value in flagged.spec.workload.manifests.iter_mut() {
        let is_hub_info = value.get("kind").and_then(|k| k.as_str()) == Some("Secret")
            && value.pointer("/metadata/name").and_then(|n| n.as_str())
                == Some(names::HUB_INFO_SECRET);
        if !is_hub_info {
            continue;
        }
        let Manifest::Secret(secret) = Manifest::from_value(value.clone())? else {
            continue;
        };
        let Some(mut info) = HubInfo::from_secret(&secret)? else {
            continue;
        };
        info.delete_flag = true;
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        *value = serde_json::to_value(info.to_secret(&namespace)?)?;
    }
    Ok(flagged)
}
