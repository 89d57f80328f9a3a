// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery and store access.

pub mod crd;
pub mod store;

pub use crd::wait_for_crd;
pub use store::{delete_if_exists, is_already_exists, is_conflict, is_not_found};
