// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use thiserror::Error;

use crate::distribute::bootstrap::BootstrapStep;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to load templates: {0}")]
    TemplateError(String),

    #[error("Unresolved placeholder '{placeholder}' in template {template}")]
    UnresolvedPlaceholder { placeholder: String, template: String },

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Invalid hub endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("Dependency not ready: {0}")]
    DependencyNotReady(String),

    #[error("Bootstrap of cluster namespace {namespace} failed at {step}: {reason}")]
    Bootstrap {
        step: BootstrapStep,
        namespace: String,
        reason: String,
    },

    #[error("Distribution failed for {}", display_failures(.0))]
    Distribution(Vec<ClusterFailure>),
}

/// Error recorded for a single cluster during a distribution pass
#[derive(Debug)]
pub struct ClusterFailure {
    pub cluster: String,
    pub error: OperatorError,
}

impl fmt::Display for ClusterFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.cluster, self.error)
    }
}

fn display_failures(failures: &[ClusterFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl OperatorError {
    /// Whether this is a 404 from the API server
    pub fn is_not_found(&self) -> bool {
        matches!(self, OperatorError::KubeError(e) if crate::kubernetes::is_not_found(e))
    }

    /// Whether this is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, OperatorError::KubeError(e) if crate::kubernetes::is_conflict(e))
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;
