// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-kind semantic equality and identity-preserving merges.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::api::{DynamicObject, ObjectMeta};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

/// A kind the deployer knows how to compare and update.
///
/// `matches` is called on the desired object with the live one and looks only at
/// the fields that are meaningful for the kind. `merge_onto` produces the object
/// to write: the live object with those same fields replaced, so server-assigned
/// identity, status and unrelated fields are carried over.
pub trait Reconcilable:
    Resource + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn matches(&self, live: &Self) -> bool;

    fn merge_onto(&self, live: &Self) -> Self;
}

/// Equality that ignores every field left unset in `desired`.
///
/// Null, empty strings, and empty collections in `desired` match anything, so
/// values filled in by the API server never count as a difference. Lists must
/// have the same length and match element-wise.
pub fn derivative_eq(desired: &Value, live: &Value) -> bool {
    match desired {
        Value::Null => true,
        Value::String(s) if s.is_empty() => true,
        Value::Object(d) => match live {
            Value::Object(l) => d.iter().all(|(k, dv)| match l.get(k) {
                Some(lv) => derivative_eq(dv, lv),
                None => is_unset(dv),
            }),
            _ => is_unset(desired),
        },
        Value::Array(d) => match live {
            Value::Array(l) => d.len() == l.len() && d.iter().zip(l).all(|(a, b)| derivative_eq(a, b)),
            _ => d.is_empty(),
        },
        other => other == live,
    }
}

fn is_unset(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.values().all(is_unset),
        _ => false,
    }
}

fn derivative<T: Serialize>(desired: &T, live: &T) -> bool {
    match (serde_json::to_value(desired), serde_json::to_value(live)) {
        (Ok(d), Ok(l)) => derivative_eq(&d, &l),
        _ => false,
    }
}

/// Live metadata with desired labels and annotations layered on top
pub fn merge_metadata(desired: &ObjectMeta, live: &ObjectMeta) -> ObjectMeta {
    let mut meta = live.clone();
    if let Some(labels) = &desired.labels {
        meta.labels.get_or_insert_with(Default::default).extend(labels.clone());
    }
    if let Some(annotations) = &desired.annotations {
        meta.annotations
            .get_or_insert_with(Default::default)
            .extend(annotations.clone());
    }
    meta
}

macro_rules! workload {
    ($kind:ty) => {
        impl Reconcilable for $kind {
            fn matches(&self, live: &Self) -> bool {
                let (Some(desired), Some(current)) = (&self.spec, &live.spec) else {
                    return self.spec.is_none();
                };
                let replicas_match = desired.replicas.is_none() || desired.replicas == current.replicas;
                replicas_match && derivative(&desired.template, &current.template)
            }

            fn merge_onto(&self, live: &Self) -> Self {
                let mut updated = live.clone();
                updated.metadata = merge_metadata(&self.metadata, &live.metadata);
                match (&self.spec, &mut updated.spec) {
                    (Some(desired), Some(current)) => {
                        current.replicas = desired.replicas;
                        current.template = desired.template.clone();
                    }
                    (desired, current) => *current = desired.clone(),
                }
                updated
            }
        }
    };
}

workload!(Deployment);
workload!(StatefulSet);

impl Reconcilable for Service {
    fn matches(&self, live: &Self) -> bool {
        derivative(&self.spec, &live.spec)
    }

    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        let mut spec = self.spec.clone().unwrap_or_default();
        if let Some(current) = &live.spec {
            spec.cluster_ip = current.cluster_ip.clone();
            spec.cluster_ips = current.cluster_ips.clone();
        }
        updated.spec = Some(spec);
        updated
    }
}

impl Reconcilable for Secret {
    /// An unset desired type accepts whatever the server defaulted
    fn matches(&self, live: &Self) -> bool {
        self.data.clone().unwrap_or_default() == live.data.clone().unwrap_or_default()
            && (self.type_.is_none() || self.type_ == live.type_)
    }

    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        updated.data = self.data.clone();
        if self.type_.is_some() {
            updated.type_ = self.type_.clone();
        }
        updated.string_data = None;
        updated
    }
}

impl Reconcilable for ConfigMap {
    fn matches(&self, live: &Self) -> bool {
        self.data.clone().unwrap_or_default() == live.data.clone().unwrap_or_default()
            && self.binary_data.clone().unwrap_or_default()
                == live.binary_data.clone().unwrap_or_default()
    }

    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        updated.data = self.data.clone();
        updated.binary_data = self.binary_data.clone();
        updated
    }
}

impl Reconcilable for ServiceAccount {
    fn matches(&self, live: &Self) -> bool {
        self.image_pull_secrets.is_none() || self.image_pull_secrets == live.image_pull_secrets
    }

    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        if self.image_pull_secrets.is_some() {
            updated.image_pull_secrets = self.image_pull_secrets.clone();
        }
        updated
    }
}

impl Reconcilable for Role {
    fn matches(&self, live: &Self) -> bool {
        self.rules == live.rules
    }

    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        updated.rules = self.rules.clone();
        updated
    }
}

impl Reconcilable for ClusterRole {
    fn matches(&self, live: &Self) -> bool {
        self.rules == live.rules && self.aggregation_rule == live.aggregation_rule
    }

    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        updated.rules = self.rules.clone();
        updated.aggregation_rule = self.aggregation_rule.clone();
        updated
    }
}

macro_rules! binding {
    ($kind:ty) => {
        impl Reconcilable for $kind {
            fn matches(&self, live: &Self) -> bool {
                self.subjects == live.subjects && self.role_ref == live.role_ref
            }

            fn merge_onto(&self, live: &Self) -> Self {
                let mut updated = live.clone();
                updated.metadata = merge_metadata(&self.metadata, &live.metadata);
                updated.subjects = self.subjects.clone();
                updated.role_ref = self.role_ref.clone();
                updated
            }
        }
    };
}

binding!(RoleBinding);
binding!(ClusterRoleBinding);

impl Reconcilable for Namespace {
    fn matches(&self, live: &Self) -> bool {
        let live_labels = live.metadata.labels.clone().unwrap_or_default();
        self.metadata
            .labels
            .iter()
            .flatten()
            .all(|(k, v)| live_labels.get(k) == Some(v))
    }

    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        updated
    }
}

/// Untyped objects compare every top-level field except metadata and status,
/// which in practice means `spec` (or `data` for config-like kinds).
impl Reconcilable for DynamicObject {
    fn matches(&self, live: &Self) -> bool {
        match &self.data {
            Value::Object(fields) => fields
                .iter()
                .filter(|(k, _)| k.as_str() != "status")
                .all(|(k, v)| derivative_eq(v, live.data.get(k).unwrap_or(&Value::Null))),
            _ => true,
        }
    }

    fn merge_onto(&self, live: &Self) -> Self {
        let mut updated = live.clone();
        updated.metadata = merge_metadata(&self.metadata, &live.metadata);
        if let (Value::Object(fields), Value::Object(target)) = (&self.data, &mut updated.data) {
            for (k, v) in fields.iter().filter(|(k, _)| k.as_str() != "status") {
                target.insert(k.clone(), v.clone());
            }
        } else if !self.data.is_null() {
            updated.data = self.data.clone();
        }
        updated
    }
}
