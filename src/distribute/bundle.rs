// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Work bundle contents for one member cluster.

use k8s_openapi::api::core::v1::{Namespace, Secret};
use k8s_openapi::ByteString;
use kube::api::{Api, ObjectMeta};
use kube::Client;
use std::collections::BTreeMap;

use crate::constants::{certs, labels, names};
use crate::error::{OperatorError, Result};
use crate::manifest::Manifest;
use crate::types::{Decision, ManifestWork, ManifestWorkSpec, ManifestsTemplate};

use super::allowlist::MetricsAllowlist;
use super::hubinfo::HubInfo;

/// Name of the work bundle for a cluster
pub fn work_name(cluster: &str) -> String {
    format!("{}{}", cluster, names::WORK_SUFFIX)
}

pub fn owner_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(labels::OWNER.to_string(), labels::OWNER_VALUE.to_string())])
}

/// Hub-side inputs shared by every cluster in a distribution pass
#[derive(Debug, Clone)]
pub struct SharedInputs {
    pub allowlist: MetricsAllowlist,
    pub certificates: BTreeMap<String, ByteString>,
    pub pull_secret: Option<Secret>,
}

fn required_key(secret: &Secret, key: &str) -> Result<ByteString> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .filter(|v| !v.0.is_empty())
        .cloned()
        .ok_or_else(|| {
            OperatorError::DependencyNotReady(format!(
                "secret {} has no {}",
                secret.metadata.name.clone().unwrap_or_default(),
                key
            ))
        })
}

/// CA certificate plus the client leaf pair, copied from the hub
pub async fn load_certificates(
    client: &Client,
    namespace: &str,
) -> Result<BTreeMap<String, ByteString>> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let fetch = |name: &'static str| {
        let api = api.clone();
        async move {
            api.get_opt(name).await?.ok_or_else(|| {
                OperatorError::DependencyNotReady(format!("secret {}/{} not found", namespace, name))
            })
        }
    };

    let ca = fetch(certs::CA_SECRET).await?;
    let leaf = fetch(certs::CLIENT_SECRET).await?;
    Ok(BTreeMap::from([
        ("ca.crt".to_string(), required_key(&ca, "ca.crt")?),
        ("tls.crt".to_string(), required_key(&leaf, "tls.crt")?),
        ("tls.key".to_string(), required_key(&leaf, "tls.key")?),
    ]))
}

/// The hub's image pull secret, if it exists
pub async fn load_pull_secret(client: &Client, namespace: &str, name: &str) -> Result<Option<Secret>> {
    if name.is_empty() {
        return Ok(None);
    }
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    Ok(api.get_opt(name).await?)
}

fn secret(name: &str, type_: &str, data: BTreeMap<String, ByteString>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(names::ADDON_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(data),
        type_: Some(type_.to_string()),
        ..Default::default()
    }
}

/// Everything that goes into one cluster's bundle
pub struct BundleContent<'a> {
    pub decision: &'a Decision,
    pub hub_info: HubInfo,
    pub kubeconfig: String,
    pub shared: &'a SharedInputs,
    pub addon_manifests: Vec<Manifest>,
}

impl BundleContent<'_> {
    /// Ordered manifests: namespace, hub info, access credentials, pull
    /// secret, certificates, allow-list, then the rendered operator set
    pub fn manifests(self) -> Result<Vec<Manifest>> {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(names::ADDON_NAMESPACE.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let mut manifests = vec![
            Manifest::Namespace(namespace),
            Manifest::Secret(self.hub_info.to_secret(names::ADDON_NAMESPACE)?),
            Manifest::Secret(secret(
                names::ACCESS_SECRET,
                "Opaque",
                BTreeMap::from([(
                    names::ACCESS_KEY.to_string(),
                    ByteString(self.kubeconfig.into_bytes()),
                )]),
            )),
        ];

        if let Some(pull) = &self.shared.pull_secret {
            manifests.push(Manifest::Secret(secret(
                &pull.metadata.name.clone().unwrap_or_default(),
                pull.type_.as_deref().unwrap_or("kubernetes.io/dockerconfigjson"),
                pull.data.clone().unwrap_or_default(),
            )));
        }

        manifests.push(Manifest::Secret(secret(
            names::MANAGED_CLUSTER_CERTS,
            "Opaque",
            self.shared.certificates.clone(),
        )));
        manifests.push(Manifest::ConfigMap(
            self.shared.allowlist.to_config_map(names::ADDON_NAMESPACE)?,
        ));
        manifests.extend(self.addon_manifests);
        Ok(manifests)
    }

    pub fn into_work(self) -> Result<ManifestWork> {
        let cluster = self.decision.cluster_name.clone();
        let namespace = self.decision.cluster_namespace.clone();
        let manifests = self
            .manifests()?
            .iter()
            .map(Manifest::to_value)
            .collect::<Result<Vec<_>>>()?;

        let mut work = ManifestWork::new(
            &work_name(&cluster),
            ManifestWorkSpec {
                workload: ManifestsTemplate { manifests },
            },
        );
        work.metadata.namespace = Some(namespace);
        work.metadata.labels = Some(owner_labels());
        Ok(work)
    }
}
