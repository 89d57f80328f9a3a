// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Annotation keys understood by the operator
pub mod annotations {
    /// When "true" on the MultiClusterObservability, reconcile stops after finalizer/default handling
    pub const PAUSE: &str = "observability.lookout.dev/pause";
    /// Registry prefix replacing the one baked into template images
    pub const IMAGE_REPOSITORY: &str = "observability.lookout.dev/image-repository";
    /// Tag replacing the one baked into template images
    pub const IMAGE_TAG_SUFFIX: &str = "observability.lookout.dev/image-tag-suffix";
    /// Set to "false" on a template to keep its namespaces untouched
    pub const UPDATE_NAMESPACE: &str = "observability.lookout.dev/update-namespace";
    /// When truthy on a live object, the deployer never touches it
    pub const SKIP_CREATION_IF_EXIST: &str = "observability.lookout.dev/skip-creation-if-exist";
    /// Service account a token secret belongs to
    pub const SERVICE_ACCOUNT_NAME: &str = "kubernetes.io/service-account.name";
}

/// Label keys and values
pub mod labels {
    pub const OWNER: &str = "lookout.dev/owner";
    pub const OWNER_VALUE: &str = "observability";
    /// Label carried by PlacementDecisions of a Placement
    pub const PLACEMENT: &str = "cluster.open-cluster-management.io/placement";

    /// Selector matching every object the operator owns
    pub fn owner_selector() -> String {
        format!("{}={}", OWNER, OWNER_VALUE)
    }
}

/// Finalizer guarding cross-namespace cleanup
pub const FINALIZER: &str = "observability.lookout.dev/cleanup";

/// Well-known object names
pub mod names {
    pub const ADDON: &str = "observability-controller";
    pub const ADDON_NAMESPACE: &str = "open-cluster-management-addon-observability";
    pub const WORK_SUFFIX: &str = "-observability";

    pub const HUB_INFO_SECRET: &str = "hub-info-secret";
    pub const HUB_INFO_KEY: &str = "hub-info.yaml";
    pub const ACCESS_SECRET: &str = "hub-kube-config";
    pub const ACCESS_KEY: &str = "kubeconfig";
    pub const MANAGED_CLUSTER_CERTS: &str = "observability-managed-cluster-certs";

    pub const ALLOWLIST: &str = "observability-metrics-allowlist";
    pub const CUSTOM_ALLOWLIST: &str = "observability-metrics-custom-allowlist";
    pub const ALLOWLIST_KEY: &str = "metrics_list.yaml";

    pub const BOOTSTRAP_ROLE: &str = "lookout-addon-access";
    pub const BOOTSTRAP_SERVICE_ACCOUNT: &str = "lookout-addon";
    pub const BOOTSTRAP_TOKEN_SECRET: &str = "lookout-addon-token";
}

/// cert-manager object names
pub mod certs {
    pub const SELFSIGN_ISSUER: &str = "observability-selfsign-issuer";
    pub const CA_ISSUER: &str = "observability-server-ca-issuer";
    pub const CA_CERTIFICATE: &str = "observability-server-ca-certificate";
    pub const CA_SECRET: &str = "observability-server-ca-certs";
    pub const SERVER_CERTIFICATE: &str = "observability-server-certificate";
    pub const SERVER_SECRET: &str = "observability-server-certs";
    pub const CLIENT_CERTIFICATE: &str = "observability-client-certificate";
    pub const CLIENT_SECRET: &str = "observability-client-certs";
}

/// Path appended to the hub endpoint host for metric pushes
pub const RECEIVE_PATH: &str = "/api/metrics/v1/default/api/v1/receive";

/// Requeue intervals
pub mod requeue {
    use std::time::Duration;

    pub const CONFLICT: Duration = Duration::from_secs(1);
    pub const NOT_READY: Duration = Duration::from_secs(2);
    pub const ERROR: Duration = Duration::from_secs(10);
    pub const RETRY_LATER: Duration = Duration::from_secs(10);
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}
