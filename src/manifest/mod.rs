// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kind-tagged desired manifests.
//!
//! Templates and work bundles carry untyped documents. They are lifted into a
//! [`Manifest`], a closed set of the kinds the operator reasons about plus an
//! untyped pass-through, so that per-kind behaviour is an exhaustive match.

pub mod equality;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ObjectMeta};
use kube::{Resource, ResourceExt};
use serde_json::Value;
use std::fmt;

use crate::error::{OperatorError, Result};
pub use equality::{derivative_eq, Reconcilable};

const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterIssuer",
    "ClusterManagementAddOn",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "ManagedCluster",
    "MutatingWebhookConfiguration",
    "Namespace",
    "PersistentVolume",
    "PriorityClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

/// Whether objects of `kind` live outside any namespace
pub fn is_cluster_scoped_kind(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

#[derive(Clone, Debug)]
pub enum Manifest {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    Service(Service),
    Secret(Secret),
    ConfigMap(ConfigMap),
    ServiceAccount(ServiceAccount),
    Role(Role),
    RoleBinding(RoleBinding),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    Namespace(Namespace),
    Other(DynamicObject),
}

/// Match on every variant, binding the inner object. Typed variants run
/// `$typed`, the untyped pass-through runs `$untyped`.
macro_rules! dispatch {
    ($manifest:expr, $obj:ident => $typed:expr, $dyn:ident => $untyped:expr) => {
        match $manifest {
            Manifest::Deployment($obj) => $typed,
            Manifest::StatefulSet($obj) => $typed,
            Manifest::Service($obj) => $typed,
            Manifest::Secret($obj) => $typed,
            Manifest::ConfigMap($obj) => $typed,
            Manifest::ServiceAccount($obj) => $typed,
            Manifest::Role($obj) => $typed,
            Manifest::RoleBinding($obj) => $typed,
            Manifest::ClusterRole($obj) => $typed,
            Manifest::ClusterRoleBinding($obj) => $typed,
            Manifest::Namespace($obj) => $typed,
            Manifest::Other($dyn) => $untyped,
        }
    };
    ($manifest:expr, $obj:ident => $body:expr) => {
        dispatch!($manifest, $obj => $body, $obj => $body)
    };
}

impl Manifest {
    /// Lift an untyped document into a typed manifest.
    pub fn from_value(value: Value) -> Result<Self> {
        let api_version = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| OperatorError::InvalidManifest("missing apiVersion".to_string()))?
            .to_string();
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| OperatorError::InvalidManifest("missing kind".to_string()))?
            .to_string();
        let has_name = value
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .is_some_and(|n| !n.is_empty());
        if !has_name {
            return Err(OperatorError::InvalidManifest(format!(
                "{} without metadata.name",
                kind
            )));
        }

        let manifest = match (api_version.as_str(), kind.as_str()) {
            ("apps/v1", "Deployment") => Manifest::Deployment(serde_json::from_value(value)?),
            ("apps/v1", "StatefulSet") => Manifest::StatefulSet(serde_json::from_value(value)?),
            ("v1", "Service") => Manifest::Service(serde_json::from_value(value)?),
            ("v1", "Secret") => Manifest::Secret(serde_json::from_value(value)?),
            ("v1", "ConfigMap") => Manifest::ConfigMap(serde_json::from_value(value)?),
            ("v1", "ServiceAccount") => Manifest::ServiceAccount(serde_json::from_value(value)?),
            ("v1", "Namespace") => Manifest::Namespace(serde_json::from_value(value)?),
            ("rbac.authorization.k8s.io/v1", "Role") => Manifest::Role(serde_json::from_value(value)?),
            ("rbac.authorization.k8s.io/v1", "RoleBinding") => {
                Manifest::RoleBinding(serde_json::from_value(value)?)
            }
            ("rbac.authorization.k8s.io/v1", "ClusterRole") => {
                Manifest::ClusterRole(serde_json::from_value(value)?)
            }
            ("rbac.authorization.k8s.io/v1", "ClusterRoleBinding") => {
                Manifest::ClusterRoleBinding(serde_json::from_value(value)?)
            }
            _ => Manifest::Other(serde_json::from_value(value)?),
        };
        Ok(manifest)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(dispatch!(self, obj => serde_json::to_value(obj)?))
    }

    pub fn kind(&self) -> String {
        dispatch!(self,
            obj => kind_of(obj),
            obj => obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default()
        )
    }

    pub fn api_version(&self) -> String {
        dispatch!(self,
            obj => api_version_of(obj),
            obj => obj.types.as_ref().map(|t| t.api_version.clone()).unwrap_or_default()
        )
    }

    pub fn name(&self) -> String {
        dispatch!(self, obj => obj.name_any())
    }

    pub fn namespace(&self) -> Option<String> {
        dispatch!(self, obj => obj.namespace())
    }

    pub fn meta(&self) -> &ObjectMeta {
        dispatch!(self, obj => obj.meta())
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        dispatch!(self, obj => obj.meta_mut())
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.meta()
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    pub fn is_cluster_scoped(&self) -> bool {
        is_cluster_scoped_kind(&self.kind())
    }

    /// API resource for the untyped pass-through variant
    pub fn api_resource(&self) -> ApiResource {
        let api_version = self.api_version();
        let (group, version) = api_version
            .split_once('/')
            .unwrap_or(("", api_version.as_str()));
        ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, &self.kind()))
    }

    /// Whether `live` already carries what `self` wants, per kind.
    /// Different kinds never match.
    pub fn semantically_equal(&self, live: &Manifest) -> bool {
        match (self, live) {
            (Manifest::Deployment(d), Manifest::Deployment(l)) => d.matches(l),
            (Manifest::StatefulSet(d), Manifest::StatefulSet(l)) => d.matches(l),
            (Manifest::Service(d), Manifest::Service(l)) => d.matches(l),
            (Manifest::Secret(d), Manifest::Secret(l)) => d.matches(l),
            (Manifest::ConfigMap(d), Manifest::ConfigMap(l)) => d.matches(l),
            (Manifest::ServiceAccount(d), Manifest::ServiceAccount(l)) => d.matches(l),
            (Manifest::Role(d), Manifest::Role(l)) => d.matches(l),
            (Manifest::RoleBinding(d), Manifest::RoleBinding(l)) => d.matches(l),
            (Manifest::ClusterRole(d), Manifest::ClusterRole(l)) => d.matches(l),
            (Manifest::ClusterRoleBinding(d), Manifest::ClusterRoleBinding(l)) => d.matches(l),
            (Manifest::Namespace(d), Manifest::Namespace(l)) => d.matches(l),
            (Manifest::Other(d), Manifest::Other(l)) => {
                d.types == l.types && d.name_any() == l.name_any() && d.matches(l)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace() {
            Some(ns) => write!(f, "{} {}/{}", self.kind(), ns, self.name()),
            None => write!(f, "{} {}", self.kind(), self.name()),
        }
    }
}

fn kind_of<K: Resource<DynamicType = ()>>(_: &K) -> String {
    K::kind(&()).into_owned()
}

fn api_version_of<K: Resource<DynamicType = ()>>(_: &K) -> String {
    K::api_version(&()).into_owned()
}
