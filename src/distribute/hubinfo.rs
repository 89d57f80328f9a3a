// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Connection info handed to the addon on every member cluster.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::constants::{names, RECEIVE_PATH};
use crate::error::Result;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct HubInfo {
    pub cluster_name: String,
    pub endpoint: String,
    pub enable_metrics: bool,
    pub interval: i32,
    #[serde(default)]
    pub delete_flag: bool,
}

/// Metrics push URL for a hub endpoint host, always https
pub fn receive_endpoint(hub_endpoint: &str) -> Result<String> {
    let raw = if hub_endpoint.contains("://") {
        hub_endpoint.to_string()
    } else {
        format!("https://{}", hub_endpoint)
    };
    let parsed = Url::parse(&raw)?;
    let host = parsed.host_str().filter(|h| !h.is_empty()).ok_or(url::ParseError::EmptyHost)?;
    // rebuilt rather than set_scheme, which refuses to move a non-special scheme to https
    let mut url = match parsed.port() {
        Some(port) => Url::parse(&format!("https://{}:{}", host, port))?,
        None => Url::parse(&format!("https://{}", host))?,
    };
    url.set_path(RECEIVE_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Host part of the hub endpoint, used as a server certificate name
pub fn endpoint_host(hub_endpoint: &str) -> Result<String> {
    let url = Url::parse(&receive_endpoint(hub_endpoint)?)?;
    Ok(url.host_str().unwrap_or_default().to_string())
}

impl HubInfo {
    pub fn to_secret(&self, namespace: &str) -> Result<Secret> {
        let body = serde_yaml::to_string(self)?;
        Ok(Secret {
            metadata: ObjectMeta {
                name: Some(names::HUB_INFO_SECRET.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                names::HUB_INFO_KEY.to_string(),
                ByteString(body.into_bytes()),
            )])),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        })
    }

    pub fn from_secret(secret: &Secret) -> Result<Option<Self>> {
        let Some(raw) = secret.data.as_ref().and_then(|d| d.get(names::HUB_INFO_KEY)) else {
            return Ok(None);
        };
        Ok(Some(serde_yaml::from_slice(&raw.0)?))
    }
}
