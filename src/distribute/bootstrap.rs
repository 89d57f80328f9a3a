// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Hub credentials for a member cluster's addon.
//!
//! Acquisition walks Role, RoleBinding, ServiceAccount and token Secret in the
//! cluster namespace. Every step is idempotent. If any step fails the whole
//! sequence is retried on the next reconcile.

use base64::Engine;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, instrument};

use crate::constants::{annotations, labels, names};
use crate::deploy;
use crate::error::{OperatorError, Result};
use crate::kubernetes::{delete_if_exists, is_already_exists};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    Role,
    RoleBinding,
    ServiceAccount,
    TokenSecret,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BootstrapStep::Role => "Role",
            BootstrapStep::RoleBinding => "RoleBinding",
            BootstrapStep::ServiceAccount => "ServiceAccount",
            BootstrapStep::TokenSecret => "TokenSecret",
        };
        f.write_str(s)
    }
}

/// Reason reported when the token controller has not filled the secret yet
pub const TOKEN_NOT_POPULATED: &str = "TokenNotPopulated";

/// A service account token together with the CA that signs the hub API
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub ca: Vec<u8>,
}

impl AccessToken {
    /// A kubeconfig scoped to `namespace` on the hub API server
    pub fn kubeconfig(&self, server: &str, namespace: &str) -> Result<String> {
        let ca = base64::engine::general_purpose::STANDARD.encode(&self.ca);
        let config = json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{
                "name": "hub",
                "cluster": {"server": server, "certificate-authority-data": ca}
            }],
            "users": [{
                "name": names::BOOTSTRAP_SERVICE_ACCOUNT,
                "user": {"token": self.token}
            }],
            "contexts": [{
                "name": "default",
                "context": {
                    "cluster": "hub",
                    "user": names::BOOTSTRAP_SERVICE_ACCOUNT,
                    "namespace": namespace
                }
            }],
            "current-context": "default"
        });
        Ok(serde_yaml::to_string(&config)?)
    }
}

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(BTreeMap::from([(
            labels::OWNER.to_string(),
            labels::OWNER_VALUE.to_string(),
        )])),
        ..Default::default()
    }
}

fn role(namespace: &str) -> Role {
    let rule = |groups: &[&str], resources: &[&str], verbs: &[&str]| PolicyRule {
        api_groups: Some(groups.iter().map(|s| s.to_string()).collect()),
        resources: Some(resources.iter().map(|s| s.to_string()).collect()),
        verbs: verbs.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    };
    Role {
        metadata: meta(names::BOOTSTRAP_ROLE, namespace),
        rules: Some(vec![
            rule(&[""], &["secrets", "configmaps"], &["get", "list", "watch"]),
            rule(
                &["addon.open-cluster-management.io"],
                &["managedclusteraddons", "managedclusteraddons/status"],
                &["get", "list", "watch", "update", "patch"],
            ),
        ]),
    }
}

fn role_binding(namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: meta(names::BOOTSTRAP_ROLE, namespace),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: names::BOOTSTRAP_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: names::BOOTSTRAP_SERVICE_ACCOUNT.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

fn service_account(namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(names::BOOTSTRAP_SERVICE_ACCOUNT, namespace),
        ..Default::default()
    }
}

fn token_secret(namespace: &str) -> Secret {
    let mut metadata = meta(names::BOOTSTRAP_TOKEN_SECRET, namespace);
    metadata.annotations = Some(BTreeMap::from([(
        annotations::SERVICE_ACCOUNT_NAME.to_string(),
        names::BOOTSTRAP_SERVICE_ACCOUNT.to_string(),
    )]));
    Secret {
        metadata,
        type_: Some("kubernetes.io/service-account-token".to_string()),
        ..Default::default()
    }
}

fn failed(step: BootstrapStep, namespace: &str) -> impl Fn(OperatorError) -> OperatorError + '_ {
    move |e| OperatorError::Bootstrap {
        step,
        namespace: namespace.to_string(),
        reason: e.to_string(),
    }
}

/// Run the bootstrap sequence in `namespace` and return the populated token
#[instrument(skip(client))]
pub async fn acquire(client: &Client, namespace: &str) -> Result<AccessToken> {
    deploy::apply(&Api::namespaced(client.clone(), namespace), &role(namespace))
        .await
        .map_err(failed(BootstrapStep::Role, namespace))?;
    deploy::apply(&Api::namespaced(client.clone(), namespace), &role_binding(namespace))
        .await
        .map_err(failed(BootstrapStep::RoleBinding, namespace))?;
    deploy::apply(&Api::namespaced(client.clone(), namespace), &service_account(namespace))
        .await
        .map_err(failed(BootstrapStep::ServiceAccount, namespace))?;

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = ensure_token_secret(&secrets, namespace)
        .await
        .map_err(failed(BootstrapStep::TokenSecret, namespace))?;

    let data = secret.data.unwrap_or_default();
    match (data.get("token"), data.get("ca.crt")) {
        (Some(token), Some(ca)) if !token.0.is_empty() && !ca.0.is_empty() => Ok(AccessToken {
            token: String::from_utf8_lossy(&token.0).into_owned(),
            ca: ca.0.clone(),
        }),
        _ => Err(OperatorError::Bootstrap {
            step: BootstrapStep::TokenSecret,
            namespace: namespace.to_string(),
            reason: TOKEN_NOT_POPULATED.to_string(),
        }),
    }
}

/// The token secret is owned by the token controller once created, so it is
/// only ever created, never updated.
async fn ensure_token_secret(secrets: &Api<Secret>, namespace: &str) -> Result<Secret> {
    if let Some(secret) = secrets.get_opt(names::BOOTSTRAP_TOKEN_SECRET).await? {
        return Ok(secret);
    }
    info!("Creating token secret in {}", namespace);
    match secrets.create(&PostParams::default(), &token_secret(namespace)).await {
        Ok(secret) => Ok(secret),
        Err(e) if is_already_exists(&e) => Ok(secrets.get(names::BOOTSTRAP_TOKEN_SECRET).await?),
        Err(e) => Err(e.into()),
    }
}

/// Remove everything `acquire` created in `namespace`
#[instrument(skip(client))]
pub async fn revoke(client: &Client, namespace: &str) -> Result<()> {
    delete_if_exists::<Secret>(&Api::namespaced(client.clone(), namespace), names::BOOTSTRAP_TOKEN_SECRET).await?;
    delete_if_exists::<ServiceAccount>(&Api::namespaced(client.clone(), namespace), names::BOOTSTRAP_SERVICE_ACCOUNT).await?;
    delete_if_exists::<RoleBinding>(&Api::namespaced(client.clone(), namespace), names::BOOTSTRAP_ROLE).await?;
    delete_if_exists::<Role>(&Api::namespaced(client.clone(), namespace), names::BOOTSTRAP_ROLE).await?;
    debug!("Revoked addon credentials in {}", namespace);
    Ok(())
}
