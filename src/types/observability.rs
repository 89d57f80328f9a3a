// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::annotations;

/// Desired topology of the observability stack across the fleet
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(
    group = "observability.lookout.dev",
    version = "v1beta2",
    kind = "MultiClusterObservability",
    shortname = "mco"
)]
#[kube(status = "MultiClusterObservabilityStatus")]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterObservabilitySpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_config: Option<AvailabilityConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
    #[serde(default)]
    pub storage_config: StorageConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_config: Option<RetentionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability_addon_spec: Option<ObservabilityAddonSpec>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum AvailabilityConfig {
    Basic,
    #[default]
    High,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_object_storage: Option<ObjectStorageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alertmanager_storage_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compact_storage_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_storage_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_storage_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_storage_size: Option<String>,
}

/// Reference to the key of a secret holding the object storage configuration
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
pub struct ObjectStorageRef {
    pub name: String,
    pub key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetentionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_resolution_raw: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_resolution5m: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_resolution1h: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityAddonSpec {
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,
    #[serde(default = "default_interval")]
    pub interval: i32,
}

fn default_enable_metrics() -> bool {
    true
}

fn default_interval() -> i32 {
    300
}

impl Default for ObservabilityAddonSpec {
    fn default() -> Self {
        Self {
            enable_metrics: default_enable_metrics(),
            interval: default_interval(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiClusterObservabilityStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// A typed, timestamped status fact. At most one entry per `type`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl MultiClusterObservabilitySpec {
    /// Spec with every unset field filled with its default
    pub fn defaulted(&self) -> Self {
        let mut spec = self.clone();
        spec.availability_config.get_or_insert_with(AvailabilityConfig::default);
        spec.image_pull_policy
            .get_or_insert_with(|| "IfNotPresent".to_string());
        spec.image_pull_secret
            .get_or_insert_with(|| "multiclusterhub-operator-pull-secret".to_string());

        let storage = &mut spec.storage_config;
        storage.storage_class.get_or_insert_with(|| "gp2".to_string());
        storage.alertmanager_storage_size.get_or_insert_with(|| "1Gi".to_string());
        storage.compact_storage_size.get_or_insert_with(|| "100Gi".to_string());
        storage.receive_storage_size.get_or_insert_with(|| "100Gi".to_string());
        storage.rule_storage_size.get_or_insert_with(|| "1Gi".to_string());
        storage.store_storage_size.get_or_insert_with(|| "10Gi".to_string());

        let retention = spec.retention_config.get_or_insert_with(RetentionConfig::default);
        retention.retention_resolution_raw.get_or_insert_with(|| "30d".to_string());
        retention.retention_resolution5m.get_or_insert_with(|| "180d".to_string());
        retention.retention_resolution1h.get_or_insert_with(|| "0d".to_string());

        spec.observability_addon_spec
            .get_or_insert_with(ObservabilityAddonSpec::default);
        spec
    }

    pub fn availability(&self) -> AvailabilityConfig {
        self.availability_config.unwrap_or_default()
    }

    pub fn addon(&self) -> ObservabilityAddonSpec {
        self.observability_addon_spec.clone().unwrap_or_default()
    }
}

impl MultiClusterObservability {
    fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations().get(key).map(String::as_str)
    }

    /// Whether the pause annotation is set
    pub fn is_paused(&self) -> bool {
        self.annotation(annotations::PAUSE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn image_repository(&self) -> Option<&str> {
        self.annotation(annotations::IMAGE_REPOSITORY)
            .filter(|v| !v.is_empty())
    }

    pub fn image_tag_suffix(&self) -> Option<&str> {
        self.annotation(annotations::IMAGE_TAG_SUFFIX)
            .filter(|v| !v.is_empty())
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}
