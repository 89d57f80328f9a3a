// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Multi-cluster distribution of the observability addon.

pub mod allowlist;
pub mod bootstrap;
pub mod bundle;
pub mod distributor;
pub mod hubinfo;

pub use distributor::{load_decisions, BundleOutcome, DistributionReport, Distributor};
