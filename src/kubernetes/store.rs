// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Small helpers around the resource-store primitives.

use crate::error::Result;
use kube::api::DeleteParams;
use kube::Api;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Whether the API server answered 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

/// Whether the API server rejected a write because of a stale resourceVersion
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409 && e.reason == "Conflict")
}

/// Whether a create lost the race against another writer
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 409 && e.reason == "AlreadyExists")
}

/// Delete an object, treating absence as success.
/// Returns whether a delete was actually issued.
pub async fn delete_if_exists<K>(api: &Api<K>, name: &str) -> Result<bool>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(true),
        Err(e) if is_not_found(&e) => {
            debug!("{} already gone", name);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
