// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lookout::config::Config;
use lookout::kubernetes::wait_for_crd;
use lookout::reconcilers::ObservabilityReconciler;
use lookout::render::TemplateCorpus;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Lookout operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: namespace={}, templates={}, placement={}",
        config.namespace,
        config.templates_path.display(),
        config.placement_enabled
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    if config.placement_enabled {
        info!("Waiting for ManifestWork CRD to become available...");
        wait_for_crd(&client, "work.open-cluster-management.io", "v1", "ManifestWork").await?;
    }

    let corpus = Arc::new(TemplateCorpus::new(config.templates_path.clone()));
    let reconciler = ObservabilityReconciler::new(client, Arc::new(config), corpus);

    info!("Starting reconciler...");
    reconciler.run().await?;

    // This should never be reached as the reconciler runs forever
    warn!("Reconciler stopped unexpectedly");
    Ok(())
}
