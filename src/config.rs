// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

const DEFAULT_NAMESPACE: &str = "open-cluster-management-observability";
const DEFAULT_TEMPLATES_PATH: &str = "/usr/local/manifests";
const DEFAULT_PLACEMENT_NAME: &str = "observability";
const DEFAULT_DISTRIBUTION_CONCURRENCY: usize = 4;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace the hub stack is deployed into
    pub namespace: String,
    /// Root of the template corpus
    pub templates_path: PathBuf,
    /// Host (and optional port) managed clusters push metrics to
    pub hub_endpoint: String,
    /// API server URL written into the per-cluster kubeconfig
    pub hub_api_server: String,
    /// When false the operator runs hub-only and never distributes work
    pub placement_enabled: bool,
    /// Placement whose decisions select member clusters
    pub placement_name: String,
    /// Number of clusters processed concurrently during distribution
    pub distribution_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let namespace =
            env::var("OPERATOR_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let templates_path = env::var("TEMPLATES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_TEMPLATES_PATH));
        let hub_endpoint =
            env::var("HUB_ENDPOINT").context("HUB_ENDPOINT environment variable not set")?;
        let hub_api_server =
            env::var("HUB_API_SERVER").context("HUB_API_SERVER environment variable not set")?;
        let placement_enabled: bool = env::var("ENABLE_PLACEMENT")
            .unwrap_or("true".to_string())
            .parse()
            .unwrap_or(true);
        let placement_name =
            env::var("PLACEMENT_NAME").unwrap_or_else(|_| DEFAULT_PLACEMENT_NAME.to_string());
        let distribution_concurrency = match env::var("DISTRIBUTION_CONCURRENCY") {
            Ok(v) => v
                .parse::<usize>()
                .context("DISTRIBUTION_CONCURRENCY must be a positive integer")?
                .max(1),
            Err(_) => DEFAULT_DISTRIBUTION_CONCURRENCY,
        };

        Ok(Config {
            namespace,
            templates_path,
            hub_endpoint,
            hub_api_server,
            placement_enabled,
            placement_name,
            distribution_concurrency,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Config {
            namespace: DEFAULT_NAMESPACE.to_string(),
            templates_path: PathBuf::from(DEFAULT_TEMPLATES_PATH),
            hub_endpoint: "observatorium-api.example.com".to_string(),
            hub_api_server: "https://api.hub.example.com:6443".to_string(),
            placement_enabled: true,
            placement_name: DEFAULT_PLACEMENT_NAME.to_string(),
            distribution_concurrency: 2,
        }
    }
}
