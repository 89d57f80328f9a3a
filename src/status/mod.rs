// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Status aggregation onto the MultiClusterObservability.

pub mod checks;
pub mod conditions;

use kube::api::{Api, PostParams};
use kube::{Client, ResourceExt};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::constants::requeue;
use crate::error::Result;
use crate::manifest::Manifest;
use crate::types::{Condition, MultiClusterObservability, MultiClusterObservabilityStatus};
pub use checks::Failure;

#[derive(Clone)]
pub struct StatusAggregator {
    client: Client,
    namespace: String,
}

impl StatusAggregator {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api(&self) -> Api<MultiClusterObservability> {
        Api::all(self.client.clone())
    }

    /// First failing check, in priority order
    async fn verdict(
        &self,
        mco: &MultiClusterObservability,
        hub_manifests: &[Manifest],
    ) -> Result<Option<Failure>> {
        let storage = mco.spec.storage_config.metric_object_storage.as_ref();
        if let Some(failure) = checks::check_object_storage(&self.client, &self.namespace, storage).await? {
            return Ok(Some(failure));
        }
        checks::check_workloads(&self.client, &self.namespace, hub_manifests).await
    }

    /// Conditions `mco` should carry given the current health
    pub async fn compute(
        &self,
        mco: &MultiClusterObservability,
        hub_manifests: &[Manifest],
    ) -> Result<Vec<Condition>> {
        let verdict = self.verdict(mco, hub_manifests).await?;
        Ok(conditions_for(mco, verdict))
    }

    /// Record Installing on an object that has no conditions yet.
    /// Returns whether the status was written.
    pub async fn mark_installing(&self, mco: &MultiClusterObservability) -> Result<bool> {
        if !mco.conditions().is_empty() {
            return Ok(false);
        }
        let installing = conditions::new_condition(
            conditions::INSTALLING,
            "Installing",
            "Installation is in progress",
            mco.metadata.generation,
        );
        self.write(mco, vec![installing]).await?;
        Ok(true)
    }

    /// Compute and persist conditions. Returns a requeue interval when the
    /// write lost twice to a concurrent writer or when Ready is not there yet.
    #[instrument(skip(self, mco, hub_manifests), fields(mco = %mco.name_any()))]
    pub async fn update(
        &self,
        mco: &MultiClusterObservability,
        hub_manifests: &[Manifest],
    ) -> Result<Option<Duration>> {
        let desired = self.compute(mco, hub_manifests).await?;
        if conditions::same_facts(&desired, mco.conditions()) {
            debug!("Status unchanged");
            return Ok(requeue_unless_ready(&desired));
        }
        self.write(mco, desired).await
    }

    /// Persist a Failed verdict decided by the caller, skipping the health
    /// checks. Used when the reconcile could not get far enough to run them.
    #[instrument(skip(self, mco), fields(mco = %mco.name_any(), reason = failure.reason))]
    pub async fn record_failure(
        &self,
        mco: &MultiClusterObservability,
        failure: Failure,
    ) -> Result<Option<Duration>> {
        let desired = conditions_for(mco, Some(failure));
        if conditions::same_facts(&desired, mco.conditions()) {
            debug!("Status unchanged");
            return Ok(requeue_unless_ready(&desired));
        }
        self.write(mco, desired).await
    }

    async fn write(
        &self,
        mco: &MultiClusterObservability,
        desired: Vec<Condition>,
    ) -> Result<Option<Duration>> {
        let name = mco.name_any();
        let api = self.api();
        let mut object = mco.clone();
        object.status = Some(MultiClusterObservabilityStatus {
            conditions: desired.clone(),
        });

        match api
            .replace_status(&name, &PostParams::default(), serde_json::to_vec(&object)?)
            .await
        {
            Ok(_) => {}
            Err(e) if crate::kubernetes::is_conflict(&e) => {
                // retry once on the latest identity
                let latest = api.get(&name).await?;
                object.metadata.resource_version = latest.metadata.resource_version;
                match api
                    .replace_status(&name, &PostParams::default(), serde_json::to_vec(&object)?)
                    .await
                {
                    Ok(_) => {}
                    Err(e) if crate::kubernetes::is_conflict(&e) => {
                        warn!("Status of {} still conflicting, requeueing", name);
                        return Ok(Some(requeue::CONFLICT));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }

        info!("Updated status of {}", name);
        Ok(requeue_unless_ready(&desired))
    }
}

fn conditions_for(mco: &MultiClusterObservability, verdict: Option<Failure>) -> Vec<Condition> {
    let generation = mco.metadata.generation;
    let mut list = mco.conditions().to_vec();

    match verdict {
        Some(failure) => conditions::set_outcome(
            &mut list,
            conditions::new_condition(conditions::FAILED, failure.reason, failure.message, generation),
        ),
        None => conditions::set_outcome(
            &mut list,
            conditions::new_condition(
                conditions::READY,
                "Ready",
                "Observability components are deployed and running",
                generation,
            ),
        ),
    }

    if mco.spec.addon().enable_metrics {
        conditions::remove(&mut list, conditions::METRICS_DISABLED);
    } else {
        conditions::set(
            &mut list,
            conditions::new_condition(
                conditions::METRICS_DISABLED,
                "MetricsDisabled",
                "Collection of metrics from managed clusters is disabled",
                generation,
            ),
        );
    }
    list
}

fn requeue_unless_ready(list: &[Condition]) -> Option<Duration> {
    conditions::find(list, conditions::READY)
        .is_none()
        .then_some(requeue::NOT_READY)
}
