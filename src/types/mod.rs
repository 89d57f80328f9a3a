// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources the operator reads and writes.

pub mod addon;
pub mod certmanager;
pub mod observability;
pub mod placement;
pub mod work;

pub use addon::{ManagedClusterAddOn, ManagedClusterAddOnSpec};
pub use certmanager::{Certificate, Issuer};
pub use observability::{
    Condition, MultiClusterObservability, MultiClusterObservabilitySpec,
    MultiClusterObservabilityStatus,
};
pub use placement::Decision;
pub use work::{ManifestWork, ManifestWorkSpec, ManifestsTemplate};
