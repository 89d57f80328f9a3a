// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cleanup finalizer on the MultiClusterObservability.

use kube::api::{Api, PostParams};
use kube::ResourceExt;
use tracing::debug;

use crate::constants::FINALIZER;
use crate::error::Result;
use crate::types::MultiClusterObservability;

pub fn has_finalizer(mco: &MultiClusterObservability) -> bool {
    mco.finalizers().iter().any(|f| f == FINALIZER)
}

/// Add the finalizer, returning the stored object
pub async fn add_finalizer(
    api: &Api<MultiClusterObservability>,
    mco: &MultiClusterObservability,
) -> Result<MultiClusterObservability> {
    let mut updated = mco.clone();
    updated.finalizers_mut().push(FINALIZER.to_string());
    let stored = api
        .replace(&mco.name_any(), &PostParams::default(), &updated)
        .await?;
    debug!("Added finalizer to {}", mco.name_any());
    Ok(stored)
}

/// Strip the finalizer in a single update, releasing the object for deletion
pub async fn remove_finalizer(
    api: &Api<MultiClusterObservability>,
    mco: &MultiClusterObservability,
) -> Result<()> {
    let mut updated = mco.clone();
    updated.finalizers_mut().retain(|f| f != FINALIZER);
    api.replace(&mco.name_any(), &PostParams::default(), &updated)
        .await?;
    debug!("Removed finalizer from {}", mco.name_any());
    Ok(())
}
