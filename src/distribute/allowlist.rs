// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Metrics allow-list: which series member clusters push to the hub.

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ObjectMeta};
use kube::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument};

use crate::constants::names;
use crate::error::{OperatorError, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MetricsAllowlist {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub renames: BTreeMap<String, String>,
}

/// Apply a custom list onto `base`.
///
/// Entries prefixed with `-` remove the name from the base list, other
/// entries are appended unless already present. Custom renames win.
fn merge_entries(base: &[String], custom: &[String]) -> Vec<String> {
    let removed: HashSet<&str> = custom
        .iter()
        .filter_map(|e| e.strip_prefix('-'))
        .map(str::trim)
        .collect();

    let mut seen = HashSet::new();
    base.iter()
        .chain(custom.iter().filter(|e| !e.starts_with('-')))
        .filter(|e| !e.is_empty() && !removed.contains(e.as_str()))
        .filter(|e| seen.insert(e.as_str()))
        .cloned()
        .collect()
}

impl MetricsAllowlist {
    pub fn merge(&self, custom: Option<&MetricsAllowlist>) -> MetricsAllowlist {
        let Some(custom) = custom else {
            return self.clone();
        };
        let mut renames = self.renames.clone();
        renames.extend(custom.renames.clone());
        MetricsAllowlist {
            names: merge_entries(&self.names, &custom.names),
            matches: merge_entries(&self.matches, &custom.matches),
            renames,
        }
    }

    pub fn from_config_map(cm: &ConfigMap) -> Result<Self> {
        let raw = cm
            .data
            .as_ref()
            .and_then(|d| d.get(names::ALLOWLIST_KEY))
            .ok_or_else(|| {
                OperatorError::DependencyNotReady(format!(
                    "configmap {} has no {} key",
                    cm.metadata.name.clone().unwrap_or_default(),
                    names::ALLOWLIST_KEY
                ))
            })?;
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn to_config_map(&self, namespace: &str) -> Result<ConfigMap> {
        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(names::ALLOWLIST.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                names::ALLOWLIST_KEY.to_string(),
                serde_yaml::to_string(self)?,
            )])),
            ..Default::default()
        })
    }
}

/// Load the base list and, when present, merge the custom one over it
#[instrument(skip(client))]
pub async fn load(client: &Client, namespace: &str) -> Result<MetricsAllowlist> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);

    let base = api.get_opt(names::ALLOWLIST).await?.ok_or_else(|| {
        OperatorError::DependencyNotReady(format!(
            "configmap {}/{} not found",
            namespace,
            names::ALLOWLIST
        ))
    })?;
    let base = MetricsAllowlist::from_config_map(&base)?;

    let custom = match api.get_opt(names::CUSTOM_ALLOWLIST).await? {
        Some(cm) => Some(MetricsAllowlist::from_config_map(&cm)?),
        None => {
            debug!("No custom allow-list in {}", namespace);
            None
        }
    };
    Ok(base.merge(custom.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{core_path, FakeApiServer};
    use serde_json::json;

    fn list(names: &[&str]) -> MetricsAllowlist {
        MetricsAllowlist {
            names: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_unions_and_sanitizes() {
        let base = list(&["up", "node_cpu_seconds_total", "kube_pod_info"]);
        let custom = list(&["-node_cpu_seconds_total", "my_metric", "up"]);

        let merged = base.merge(Some(&custom));
        assert_eq!(merged.names, vec!["up", "kube_pod_info", "my_metric"]);
    }

    #[test]
    fn test_merge_without_custom_is_base() {
        let base = list(&["up"]);
        assert_eq!(base.merge(None), base);
    }

    #[test]
    fn test_merge_custom_renames_win() {
        let base = MetricsAllowlist {
            renames: BTreeMap::from([("a".to_string(), "b".to_string())]),
            ..Default::default()
        };
        let custom = MetricsAllowlist {
            renames: BTreeMap::from([("a".to_string(), "c".to_string())]),
            matches: vec!["__name__=\"x\"".to_string()],
            ..Default::default()
        };
        let merged = base.merge(Some(&custom));
        assert_eq!(merged.renames["a"], "c");
        assert_eq!(merged.matches.len(), 1);
    }

    #[tokio::test]
    async fn test_load_requires_base() {
        let server = FakeApiServer::new();
        let err = load(&server.client(), "obs").await.unwrap_err();
        assert!(matches!(err, OperatorError::DependencyNotReady(_)));
    }

    #[tokio::test]
    async fn test_load_merges_custom() {
        let server = FakeApiServer::new();
        server.seed(
            &core_path("obs", "configmaps"),
            json!({
                "apiVersion": "v1", "kind": "ConfigMap",
                "metadata": {"name": names::ALLOWLIST},
                "data": {(names::ALLOWLIST_KEY): "names:\n- up\n- kube_pod_info\n"}
            }),
        );
        server.seed(
            &core_path("obs", "configmaps"),
            json!({
                "apiVersion": "v1", "kind": "ConfigMap",
                "metadata": {"name": names::CUSTOM_ALLOWLIST},
                "data": {(names::ALLOWLIST_KEY): "names:\n- -kube_pod_info\n- custom_metric\n"}
            }),
        );

        let merged = load(&server.client(), "obs").await.unwrap();
        assert_eq!(merged.names, vec!["up", "custom_metric"]);
    }
}
