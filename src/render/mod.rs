// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Template renderer: configuration object in, ordered desired manifests out.

pub mod corpus;
pub mod patches;
pub mod substitute;

use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::constants::names;
use crate::error::Result;
use crate::manifest::Manifest;
use crate::types::observability::AvailabilityConfig;
use crate::types::{Decision, MultiClusterObservability};
pub use corpus::{Template, TemplateCorpus, TemplateGroup};
pub use patches::PodPatch;
pub use substitute::Values;

/// Everything a render pass needs besides the templates
struct RenderOptions {
    namespace: String,
    values: Values,
    pod: PodPatch,
    tier: Option<AvailabilityConfig>,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    corpus: Arc<TemplateCorpus>,
    namespace: String,
}

impl Renderer {
    pub fn new(corpus: Arc<TemplateCorpus>, namespace: impl Into<String>) -> Self {
        Self {
            corpus,
            namespace: namespace.into(),
        }
    }

    /// Hub stack manifests for `mco`, in template order
    #[instrument(skip(self, mco), fields(mco = %mco.name_any()))]
    pub fn render_hub(&self, mco: &MultiClusterObservability) -> Result<Vec<Manifest>> {
        let spec = mco.spec.defaulted();
        let options = RenderOptions {
            namespace: self.namespace.clone(),
            values: self.hub_values(mco),
            pod: PodPatch {
                image_repository: mco.image_repository().map(String::from),
                image_tag: mco.image_tag_suffix().map(String::from),
                image_pull_secret: spec.image_pull_secret.clone(),
                node_selector: spec.node_selector.clone(),
                tolerations: spec.tolerations.clone(),
            },
            tier: Some(spec.availability()),
        };
        let templates = self.corpus.group(TemplateGroup::Hub)?;
        render(&templates, &options)
    }

    /// Operator manifests shipped to one member cluster.
    /// Hub placement settings (node selector, tolerations, HA tier) do not apply there.
    #[instrument(skip(self, mco), fields(cluster = %decision.cluster_name))]
    pub fn render_addon(
        &self,
        mco: &MultiClusterObservability,
        decision: &Decision,
    ) -> Result<Vec<Manifest>> {
        let spec = mco.spec.defaulted();
        let addon = spec.addon();
        let mut values = self.hub_values(mco);
        values.insert("cluster_name".to_string(), decision.cluster_name.clone());
        values.insert("cluster_namespace".to_string(), decision.cluster_namespace.clone());
        values.insert("addon_namespace".to_string(), names::ADDON_NAMESPACE.to_string());
        values.insert("hub_namespace".to_string(), self.namespace.clone());
        values.insert("interval".to_string(), addon.interval.to_string());

        let options = RenderOptions {
            namespace: names::ADDON_NAMESPACE.to_string(),
            values,
            pod: PodPatch {
                image_repository: mco.image_repository().map(String::from),
                image_tag: mco.image_tag_suffix().map(String::from),
                image_pull_secret: spec.image_pull_secret.clone(),
                ..Default::default()
            },
            tier: None,
        };
        let templates = self.corpus.group(TemplateGroup::Addon)?;
        render(&templates, &options)
    }

    fn hub_values(&self, mco: &MultiClusterObservability) -> Values {
        let spec = mco.spec.defaulted();
        let storage = &spec.storage_config;
        let retention = spec.retention_config.clone().unwrap_or_default();
        let object_storage = storage.metric_object_storage.clone().unwrap_or_default();

        [
            ("namespace", self.namespace.clone()),
            ("name", mco.name_any()),
            ("image_pull_secret", spec.image_pull_secret.clone().unwrap_or_default()),
            ("image_pull_policy", spec.image_pull_policy.clone().unwrap_or_default()),
            ("storage_class", storage.storage_class.clone().unwrap_or_default()),
            ("alertmanager_storage_size", storage.alertmanager_storage_size.clone().unwrap_or_default()),
            ("compact_storage_size", storage.compact_storage_size.clone().unwrap_or_default()),
            ("receive_storage_size", storage.receive_storage_size.clone().unwrap_or_default()),
            ("rule_storage_size", storage.rule_storage_size.clone().unwrap_or_default()),
            ("store_storage_size", storage.store_storage_size.clone().unwrap_or_default()),
            ("retention_resolution_raw", retention.retention_resolution_raw.unwrap_or_default()),
            ("retention_resolution_5m", retention.retention_resolution5m.unwrap_or_default()),
            ("retention_resolution_1h", retention.retention_resolution1h.unwrap_or_default()),
            ("object_storage_secret", object_storage.name),
            ("object_storage_key", object_storage.key),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Render every template. Any failure aborts the whole pass so no partial set
/// is ever returned.
fn render(templates: &[Template], options: &RenderOptions) -> Result<Vec<Manifest>> {
    templates
        .iter()
        .map(|template| render_one(template, options))
        .collect()
}

fn render_one(template: &Template, options: &RenderOptions) -> Result<Manifest> {
    let mut doc = template.body.clone();
    substitute::substitute(&mut doc, &options.values, &template.source)?;

    patches::inject_namespace(&mut doc, &options.namespace);
    patches::patch_pod_spec(&mut doc, &options.pod);

    let mut manifest = Manifest::from_value(doc)?;
    patches::patch_kind(&mut manifest, options.tier);
    debug!("Rendered {} from {}", manifest, template.source);
    Ok(manifest)
}
