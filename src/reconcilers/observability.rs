// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! MultiClusterObservability reconciler - drives the hub stack, the
//! per-cluster bundles and the status from one configuration object.

use futures::StreamExt;
use kube::api::{Api, DynamicObject, PostParams};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::reflector::Store;
use kube::runtime::{controller::Action, Controller};
use kube::{Client, ResourceExt};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::certs;
use crate::config::Config;
use crate::constants::{labels, requeue};
use crate::deploy::Deployer;
use crate::distribute::hubinfo::endpoint_host;
use crate::distribute::{load_decisions, Distributor};
use crate::error::{OperatorError, Result};
use crate::manifest::Manifest;
use crate::render::{Renderer, TemplateCorpus};
use crate::status::checks::reasons;
use crate::status::{Failure, StatusAggregator};
use crate::types::{placement, ManifestWork, MultiClusterObservability};

use super::finalizer::{add_finalizer, has_finalizer, remove_finalizer};

pub struct ObservabilityReconciler {
    client: Client,
    config: Arc<Config>,
    renderer: Renderer,
    deployer: Deployer,
    distributor: Distributor,
    aggregator: StatusAggregator,
}

impl ObservabilityReconciler {
    pub fn new(client: Client, config: Arc<Config>, corpus: Arc<TemplateCorpus>) -> Self {
        let renderer = Renderer::new(corpus, config.namespace.clone());
        Self {
            deployer: Deployer::new(client.clone(), config.namespace.clone()),
            distributor: Distributor::new(client.clone(), config.clone(), renderer.clone()),
            aggregator: StatusAggregator::new(client.clone(), config.namespace.clone()),
            renderer,
            config,
            client,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let mcos: Api<MultiClusterObservability> = Api::all(self.client.clone());
        let controller = Controller::new(mcos, WatcherConfig::default());

        let controller = if self.config.placement_enabled {
            let works: Api<ManifestWork> = Api::all(self.client.clone());
            let resource = placement::api_resource();
            let decisions: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), &self.config.namespace, &resource);
            let placement_selector =
                format!("{}={}", labels::PLACEMENT, self.config.placement_name);

            let work_store = controller.store();
            let decision_store = controller.store();
            controller
                .watches(
                    works,
                    WatcherConfig::default().labels(&labels::owner_selector()),
                    move |_| all_of(&work_store),
                )
                .watches_with(
                    decisions,
                    resource,
                    WatcherConfig::default().labels(&placement_selector),
                    move |_| all_of(&decision_store),
                )
        } else {
            info!("Placement disabled, running hub-only");
            controller
        };

        let context = Arc::new(self);
        controller
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled observability: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }

    /// Names the hub server certificate must be valid for
    fn server_dns_names(&self) -> Result<Vec<String>> {
        Ok(vec![
            format!("observability-observatorium-api.{}.svc", self.config.namespace),
            endpoint_host(&self.config.hub_endpoint)?,
        ])
    }

    /// Remove everything living outside the hub namespace
    async fn cleanup(&self, mco: &MultiClusterObservability) -> Result<()> {
        if self.config.placement_enabled {
            self.distributor.teardown().await?;
        }
        certs::cleanup(&self.client, &self.config.namespace).await?;

        match self.renderer.render_hub(mco) {
            Ok(manifests) => {
                // the hub namespace itself outlives the configuration object
                let cluster_scoped = manifests
                    .iter()
                    .filter(|m| m.is_cluster_scoped() && !matches!(m, Manifest::Namespace(_)));
                for manifest in cluster_scoped {
                    self.deployer.undeploy(manifest).await?;
                }
            }
            Err(e) => warn!("Skipping cluster-scoped cleanup, templates do not render: {}", e),
        }
        Ok(())
    }
}

/// Every cached configuration object, for watches on secondary kinds
fn all_of(
    store: &Store<MultiClusterObservability>,
) -> Vec<ObjectRef<MultiClusterObservability>> {
    store
        .state()
        .iter()
        .map(|mco| ObjectRef::from_obj(mco.as_ref()))
        .collect()
}

#[instrument(skip(mco, ctx), fields(mco = %mco.name_any()))]
pub(crate) async fn reconcile(
    mco: Arc<MultiClusterObservability>,
    ctx: Arc<ObservabilityReconciler>,
) -> Result<Action> {
    let name = mco.name_any();
    let api: Api<MultiClusterObservability> = Api::all(ctx.client.clone());

    if mco.is_deleting() {
        if has_finalizer(&mco) {
            info!("Tearing down observability for {}", name);
            ctx.cleanup(&mco).await?;
            remove_finalizer(&api, &mco).await?;
        }
        return Ok(Action::await_change());
    }

    let mut mco = (*mco).clone();
    if !has_finalizer(&mco) {
        mco = add_finalizer(&api, &mco).await?;
    }

    let defaulted = mco.spec.defaulted();
    if defaulted != mco.spec {
        mco.spec = defaulted;
        mco = api.replace(&name, &PostParams::default(), &mco).await?;
        info!("Filled defaults on {}", name);
    }

    if mco.is_paused() {
        info!("Reconcile of {} is paused", name);
        return Ok(Action::await_change());
    }

    if ctx.aggregator.mark_installing(&mco).await? {
        mco = api.get(&name).await?;
    }

    certs::ensure(&ctx.client, &ctx.config.namespace, ctx.server_dns_names()?).await?;

    let manifests = ctx.renderer.render_hub(&mco)?;
    ctx.deployer.deploy_all(&manifests).await?;

    let mut retry = None;
    let mut distribution_error = None;
    let mut blocked = None;
    if ctx.config.placement_enabled {
        let decisions = load_decisions(&ctx.client, &ctx.config).await?;
        match ctx.distributor.distribute(&mco, &decisions).await {
            Ok(report) if report.needs_retry() => retry = Some(requeue::RETRY_LATER),
            Ok(_) => {}
            Err(OperatorError::DependencyNotReady(what)) => {
                warn!("Distribution of {} waits on a hub input: {}", name, what);
                blocked = Some(Failure::new(reasons::DEPENDENCY_NOT_READY, what));
            }
            Err(e @ OperatorError::Distribution(_)) => distribution_error = Some(e),
            Err(e) => return Err(e),
        }
    }

    // status still reflects the hub when some clusters failed
    let status_requeue = match blocked {
        Some(failure) => ctx.aggregator.record_failure(&mco, failure).await?,
        None => ctx.aggregator.update(&mco, &manifests).await?,
    };
    if let Some(e) = distribution_error {
        return Err(e);
    }

    Ok(match [retry, status_requeue].into_iter().flatten().min() {
        Some(after) => Action::requeue(after),
        None => Action::await_change(),
    })
}

pub(crate) fn error_policy(
    mco: Arc<MultiClusterObservability>,
    error: &OperatorError,
    _ctx: Arc<ObservabilityReconciler>,
) -> Action {
    error!("Reconciliation of {} failed: {}", mco.name_any(), error);
    Action::requeue(requeue_after(error))
}

fn requeue_after(error: &OperatorError) -> Duration {
    if error.is_conflict() {
        requeue::CONFLICT
    } else {
        requeue::ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{certs as cert_names, names, FINALIZER};
    use crate::render::tests::{corpus, make_mco, object_storage_spec};
    use crate::test_utils::{core_path, group_path, secret_json, FakeApiServer};
    use serde_json::json;

    const MCOS: &str = "/apis/observability.lookout.dev/v1beta2/multiclusterobservabilities";
    const CERT_MANAGER: &str = "cert-manager.io/v1";
    const CLUSTER_ROLE_BINDINGS: &str = "/apis/rbac.authorization.k8s.io/v1/clusterrolebindings";

    fn mco_path() -> String {
        format!("{}/observability", MCOS)
    }

    fn setup(placement_enabled: bool) -> (FakeApiServer, Arc<ObservabilityReconciler>, String) {
        let server = FakeApiServer::new();
        let mut config = Config::for_tests();
        config.placement_enabled = placement_enabled;
        let hub = config.namespace.clone();
        server.seed(
            MCOS,
            serde_json::to_value(make_mco(object_storage_spec())).unwrap(),
        );
        let ctx = ObservabilityReconciler::new(server.client(), Arc::new(config), corpus());
        (server, Arc::new(ctx), hub)
    }

    fn fetch(server: &FakeApiServer) -> MultiClusterObservability {
        serde_json::from_value(server.get(&mco_path()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_first_reconcile_installs_hub_stack() {
        let (server, ctx, hub) = setup(false);

        let action = reconcile(Arc::new(fetch(&server)), ctx).await.unwrap();
        assert_eq!(action, Action::requeue(requeue::NOT_READY));

        let mco = fetch(&server);
        assert!(mco.finalizers().contains(&FINALIZER.to_string()));
        assert_eq!(mco.spec.storage_config.storage_class.as_deref(), Some("gp2"));
        assert_eq!(
            mco.conditions()
                .iter()
                .map(|c| c.reason.as_str())
                .collect::<Vec<_>>(),
            vec!["ObjectStorageSecretNotFound"]
        );

        assert_eq!(server.names(&group_path(CERT_MANAGER, &hub, "issuers")).len(), 2);
        assert_eq!(server.names(&group_path(CERT_MANAGER, &hub, "certificates")).len(), 3);
        assert_eq!(
            server.names(&group_path("apps/v1", &hub, "statefulsets")),
            vec!["observability-thanos-receive".to_string()]
        );
        assert_eq!(server.names(CLUSTER_ROLE_BINDINGS).len(), 1);
    }

    #[tokio::test]
    async fn test_second_reconcile_writes_nothing() {
        let (server, ctx, _) = setup(false);
        reconcile(Arc::new(fetch(&server)), ctx.clone()).await.unwrap();

        server.reset_requests();
        reconcile(Arc::new(fetch(&server)), ctx).await.unwrap();
        assert_eq!(server.writes(), 0);
    }

    #[tokio::test]
    async fn test_paused_stops_after_defaults() {
        let (server, ctx, hub) = setup(false);
        server.mutate(&mco_path(), |m| {
            m["metadata"]["annotations"] = json!({"observability.lookout.dev/pause": "true"});
        });

        let action = reconcile(Arc::new(fetch(&server)), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());

        let mco = fetch(&server);
        assert!(mco.finalizers().contains(&FINALIZER.to_string()));
        assert!(mco.spec.retention_config.is_some());
        assert!(mco.conditions().is_empty());
        assert!(server.names(&group_path("apps/v1", &hub, "deployments")).is_empty());
        assert!(server.names(&group_path(CERT_MANAGER, &hub, "issuers")).is_empty());
    }

    #[tokio::test]
    async fn test_deletion_cleans_up_then_releases() {
        let (server, ctx, hub) = setup(false);
        reconcile(Arc::new(fetch(&server)), ctx.clone()).await.unwrap();
        server.mutate(&mco_path(), |m| {
            m["metadata"]["deletionTimestamp"] = json!("2026-01-01T00:00:00Z");
        });

        let action = reconcile(Arc::new(fetch(&server)), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());

        assert!(server.get(&mco_path()).is_none());
        assert!(server.names(&group_path(CERT_MANAGER, &hub, "issuers")).is_empty());
        assert!(server.names(&group_path(CERT_MANAGER, &hub, "certificates")).is_empty());
        assert!(server.names(CLUSTER_ROLE_BINDINGS).is_empty());
    }

    fn seed_hub_inputs(server: &FakeApiServer, hub: &str) {
        server.seed(
            &core_path(hub, "configmaps"),
            json!({
                "apiVersion": "v1", "kind": "ConfigMap",
                "metadata": {"name": names::ALLOWLIST},
                "data": {(names::ALLOWLIST_KEY): "names:\n- up\n"}
            }),
        );
        server.seed(&core_path(hub, "secrets"), secret_json(cert_names::CA_SECRET, hub, &[("ca.crt", "CA")]));
        server.seed(
            &core_path(hub, "secrets"),
            secret_json(cert_names::CLIENT_SECRET, hub, &[("tls.crt", "CRT"), ("tls.key", "KEY")]),
        );
    }

    fn seed_decision(server: &FakeApiServer, hub: &str, cluster: &str) {
        server.seed(
            &group_path("cluster.open-cluster-management.io/v1beta1", hub, "placementdecisions"),
            json!({
                "apiVersion": "cluster.open-cluster-management.io/v1beta1",
                "kind": "PlacementDecision",
                "metadata": {"name": "observability-decision-1", "labels": {(labels::PLACEMENT): "observability"}},
                "status": {"decisions": [{"clusterName": cluster, "reason": ""}]}
            }),
        );
    }

    #[tokio::test]
    async fn test_placement_decision_gets_a_bundle() {
        let (server, ctx, hub) = setup(true);
        seed_hub_inputs(&server, &hub);
        seed_decision(&server, &hub, "cluster-a");
        server.seed(
            &core_path("cluster-a", "secrets"),
            secret_json(names::BOOTSTRAP_TOKEN_SECRET, "cluster-a", &[("token", "t"), ("ca.crt", "c")]),
        );

        reconcile(Arc::new(fetch(&server)), ctx).await.unwrap();
        assert_eq!(
            server.names(&group_path("work.open-cluster-management.io/v1", "cluster-a", "manifestworks")),
            vec!["cluster-a-observability".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failed_cluster_still_updates_status() {
        let (server, ctx, hub) = setup(true);
        seed_hub_inputs(&server, &hub);
        // no token secret for cluster-a, so its bootstrap cannot finish
        seed_decision(&server, &hub, "cluster-a");

        let err = reconcile(Arc::new(fetch(&server)), ctx).await.unwrap_err();
        assert!(matches!(err, OperatorError::Distribution(_)));
        assert_eq!(
            fetch(&server)
                .conditions()
                .iter()
                .map(|c| c.reason.as_str())
                .collect::<Vec<_>>(),
            vec!["ObjectStorageSecretNotFound"]
        );
    }

    #[tokio::test]
    async fn test_missing_hub_dependency_is_reported_as_failed() {
        let (server, ctx, hub) = setup(true);
        seed_decision(&server, &hub, "cluster-a");

        let action = reconcile(Arc::new(fetch(&server)), ctx).await.unwrap();
        assert_eq!(action, Action::requeue(requeue::NOT_READY));

        let mco = fetch(&server);
        assert_eq!(mco.conditions().len(), 1);
        assert_eq!(mco.conditions()[0].condition_type, "Failed");
        assert_eq!(mco.conditions()[0].reason, "DependencyNotReady");
        assert!(server
            .names(&group_path("work.open-cluster-management.io/v1", "cluster-a", "manifestworks"))
            .is_empty());
    }

    #[tokio::test]
    async fn test_error_policy_backs_off() {
        let (server, ctx, _) = setup(false);
        let mco = Arc::new(fetch(&server));

        let action = error_policy(mco.clone(), &OperatorError::DependencyNotReady("x".into()), ctx.clone());
        assert_eq!(action, Action::requeue(requeue::ERROR));

        let conflict = OperatorError::KubeError(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "modified".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        }));
        assert_eq!(error_policy(mco, &conflict, ctx), Action::requeue(requeue::CONFLICT));
    }
}
