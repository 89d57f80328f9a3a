// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Structural patches applied to rendered templates.
//!
//! Global patches work on the untyped document and run first. Kind-specific
//! patches run on the typed [`Manifest`] afterwards.

use k8s_openapi::ByteString;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::constants::annotations;
use crate::manifest::{is_cluster_scoped_kind, Manifest};
use crate::types::observability::{AvailabilityConfig, Toleration};

/// Pod-level settings propagated into every workload template
#[derive(Debug, Clone, Default)]
pub struct PodPatch {
    pub image_repository: Option<String>,
    pub image_tag: Option<String>,
    pub image_pull_secret: Option<String>,
    pub node_selector: Option<BTreeMap<String, String>>,
    pub tolerations: Option<Vec<Toleration>>,
}

/// Whether the template opted out of namespace rewriting
pub fn updates_namespace(doc: &Value) -> bool {
    doc.pointer(&format!(
        "/metadata/annotations/{}",
        annotations::UPDATE_NAMESPACE.replace('/', "~1")
    ))
    .and_then(Value::as_str)
    .map_or(true, |v| !v.eq_ignore_ascii_case("false"))
}

/// Put namespaced objects and binding subjects into `namespace`.
pub fn inject_namespace(doc: &mut Value, namespace: &str) {
    if !updates_namespace(doc) {
        return;
    }
    let kind = doc.get("kind").and_then(Value::as_str).unwrap_or_default().to_string();

    if !is_cluster_scoped_kind(&kind) {
        doc["metadata"]["namespace"] = json!(namespace);
    }

    if kind == "RoleBinding" || kind == "ClusterRoleBinding" {
        if let Some(subjects) = doc.get_mut("subjects").and_then(Value::as_array_mut) {
            for subject in subjects {
                let subject_kind = subject.get("kind").and_then(Value::as_str).unwrap_or_default();
                if subject_kind != "Group" && subject_kind != "User" {
                    subject["namespace"] = json!(namespace);
                }
            }
        }
    }
}

/// Apply `patch` to the pod template of a workload document, if it has one
pub fn patch_pod_spec(doc: &mut Value, patch: &PodPatch) {
    let Some(pod) = doc.pointer_mut("/spec/template/spec").and_then(Value::as_object_mut) else {
        return;
    };

    for field in ["containers", "initContainers"] {
        if let Some(containers) = pod.get_mut(field).and_then(Value::as_array_mut) {
            for container in containers {
                if let Some(image) = container.get("image").and_then(Value::as_str) {
                    let image = override_image(
                        image,
                        patch.image_repository.as_deref(),
                        patch.image_tag.as_deref(),
                    );
                    container["image"] = json!(image);
                }
            }
        }
    }

    if let Some(secret) = patch.image_pull_secret.as_deref().filter(|s| !s.is_empty()) {
        let secrets = pod
            .entry("imagePullSecrets")
            .or_insert_with(|| json!([]));
        if let Some(list) = secrets.as_array_mut() {
            if !list.iter().any(|s| s.get("name").and_then(Value::as_str) == Some(secret)) {
                list.push(json!({ "name": secret }));
            }
        }
    }

    if let Some(selector) = patch.node_selector.as_ref().filter(|s| !s.is_empty()) {
        pod.insert("nodeSelector".to_string(), json!(selector));
    }

    if let Some(tolerations) = patch.tolerations.as_ref().filter(|t| !t.is_empty()) {
        pod.insert("tolerations".to_string(), json!(tolerations));
    }
}

/// Rewrite an image reference's registry and/or tag.
///
/// The repository replaces everything before the last path segment; the tag
/// replaces the current tag. Digest references keep their digest.
pub fn override_image(image: &str, repository: Option<&str>, tag: Option<&str>) -> String {
    if repository.is_none() && tag.is_none() {
        return image.to_string();
    }

    let (reference, digest) = match image.split_once('@') {
        Some((r, d)) => (r, Some(d)),
        None => (image, None),
    };
    let slash = reference.rfind('/').map_or(0, |i| i + 1);
    let (path, current_tag) = match reference[slash..].rfind(':') {
        Some(i) => (&reference[..slash + i], Some(&reference[slash + i + 1..])),
        None => (reference, None),
    };
    let name = &path[slash..];

    let mut result = match repository {
        Some(repo) => format!("{}/{}", repo.trim_end_matches('/'), name),
        None => path.to_string(),
    };
    if let Some(digest) = digest {
        result.push('@');
        result.push_str(digest);
    } else if let Some(tag) = tag.or(current_tag) {
        result.push(':');
        result.push_str(tag);
    }
    result
}

/// Replica counts per availability tier
pub fn replicas_for(manifest: &Manifest, tier: AvailabilityConfig) -> Option<i32> {
    match (manifest, tier) {
        (Manifest::Deployment(_), AvailabilityConfig::Basic) => Some(1),
        (Manifest::Deployment(_), AvailabilityConfig::High) => Some(2),
        (Manifest::StatefulSet(_), AvailabilityConfig::Basic) => Some(1),
        (Manifest::StatefulSet(_), AvailabilityConfig::High) => Some(3),
        _ => None,
    }
}

/// Kind-specific patches on the typed manifest
pub fn patch_kind(manifest: &mut Manifest, tier: Option<AvailabilityConfig>) {
    let replicas = tier.and_then(|t| replicas_for(manifest, t));
    match manifest {
        Manifest::Deployment(d) => {
            if let (Some(spec), Some(r)) = (d.spec.as_mut(), replicas) {
                spec.replicas = Some(r);
            }
        }
        Manifest::StatefulSet(s) => {
            if let (Some(spec), Some(r)) = (s.spec.as_mut(), replicas) {
                spec.replicas = Some(r);
            }
        }
        Manifest::Secret(secret) => {
            // live secrets only ever carry `data`
            if let Some(string_data) = secret.string_data.take() {
                let data = secret.data.get_or_insert_with(BTreeMap::new);
                for (k, v) in string_data {
                    data.insert(k, ByteString(v.into_bytes()));
                }
            }
        }
        _ => {}
    }
}
