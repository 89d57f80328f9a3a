// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Health checks feeding the Ready/Failed verdict.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;
use serde::Deserialize;

use crate::error::Result;
use crate::manifest::Manifest;
use crate::types::observability::ObjectStorageRef;

/// Why the stack is not ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: &'static str,
    pub message: String,
}

impl Failure {
    pub fn new(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

pub mod reasons {
    pub const OBJECT_STORAGE_SECRET_NOT_FOUND: &str = "ObjectStorageSecretNotFound";
    pub const OBJECT_STORAGE_CONF_INVALID: &str = "ObjectStorageConfInvalid";
    pub const DEPLOYMENT_NOT_FOUND: &str = "DeploymentNotFound";
    pub const DEPLOYMENT_NOT_READY: &str = "DeploymentNotReady";
    pub const STATEFULSET_NOT_FOUND: &str = "StatefulSetNotFound";
    pub const STATEFULSET_NOT_READY: &str = "StatefulSetNotReady";
    pub const DEPENDENCY_NOT_READY: &str = "DependencyNotReady";
}

#[derive(Deserialize, Default)]
struct ObjectStorageConf {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    config: BucketConf,
}

#[derive(Deserialize, Default)]
struct BucketConf {
    #[serde(default)]
    bucket: String,
    #[serde(default)]
    endpoint: String,
    #[serde(default)]
    access_key: String,
    #[serde(default)]
    secret_key: String,
}

/// Validate an object storage configuration document
pub fn validate_object_storage(raw: &[u8]) -> std::result::Result<(), String> {
    let conf: ObjectStorageConf =
        serde_yaml::from_slice(raw).map_err(|e| format!("not valid YAML: {}", e))?;
    let missing: Vec<&str> = [
        ("type", &conf.kind),
        ("bucket", &conf.config.bucket),
        ("endpoint", &conf.config.endpoint),
        ("access_key", &conf.config.access_key),
        ("secret_key", &conf.config.secret_key),
    ]
    .into_iter()
    .filter(|(_, v)| v.trim().is_empty())
    .map(|(k, _)| k)
    .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing {}", missing.join(", ")))
    }
}

/// Object storage secret exists, has the key, and the content is usable
pub async fn check_object_storage(
    client: &Client,
    namespace: &str,
    reference: Option<&ObjectStorageRef>,
) -> Result<Option<Failure>> {
    let Some(reference) = reference.filter(|r| !r.name.is_empty() && !r.key.is_empty()) else {
        return Ok(Some(Failure::new(
            reasons::OBJECT_STORAGE_CONF_INVALID,
            "metricObjectStorage is not configured",
        )));
    };

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let Some(secret) = secrets.get_opt(&reference.name).await? else {
        return Ok(Some(Failure::new(
            reasons::OBJECT_STORAGE_SECRET_NOT_FOUND,
            format!("Failed to get object storage secret {}", reference.name),
        )));
    };

    let Some(raw) = secret.data.as_ref().and_then(|d| d.get(&reference.key)) else {
        return Ok(Some(Failure::new(
            reasons::OBJECT_STORAGE_CONF_INVALID,
            format!("Secret {} has no key {}", reference.name, reference.key),
        )));
    };

    Ok(validate_object_storage(&raw.0).err().map(|e| {
        Failure::new(
            reasons::OBJECT_STORAGE_CONF_INVALID,
            format!("Invalid object storage configuration in {}: {}", reference.name, e),
        )
    }))
}

/// Every rendered Deployment and StatefulSet exists with at least one ready replica
pub async fn check_workloads(
    client: &Client,
    namespace: &str,
    expected: &[Manifest],
) -> Result<Option<Failure>> {
    for manifest in expected {
        let ns = manifest.namespace().unwrap_or_else(|| namespace.to_string());
        let name = manifest.name();
        let failure = match manifest {
            Manifest::Deployment(_) => {
                let api: Api<Deployment> = Api::namespaced(client.clone(), &ns);
                match api.get_opt(&name).await? {
                    None => Some(Failure::new(
                        reasons::DEPLOYMENT_NOT_FOUND,
                        format!("Deployment {} not found", name),
                    )),
                    Some(d) if ready_replicas(d.status.as_ref().and_then(|s| s.ready_replicas)) => None,
                    Some(_) => Some(Failure::new(
                        reasons::DEPLOYMENT_NOT_READY,
                        format!("Deployment {} is not ready", name),
                    )),
                }
            }
            Manifest::StatefulSet(_) => {
                let api: Api<StatefulSet> = Api::namespaced(client.clone(), &ns);
                match api.get_opt(&name).await? {
                    None => Some(Failure::new(
                        reasons::STATEFULSET_NOT_FOUND,
                        format!("StatefulSet {} not found", name),
                    )),
                    Some(s) if ready_replicas(s.status.as_ref().and_then(|st| st.ready_replicas)) => None,
                    Some(_) => Some(Failure::new(
                        reasons::STATEFULSET_NOT_READY,
                        format!("StatefulSet {} is not ready", name),
                    )),
                }
            }
            _ => None,
        };
        if failure.is_some() {
            return Ok(failure);
        }
    }
    Ok(None)
}

fn ready_replicas(ready: Option<i32>) -> bool {
    ready.unwrap_or(0) >= 1
}
