// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod certs;
pub mod config;
pub mod constants;
pub mod deploy;
pub mod distribute;
pub mod error;
pub mod kubernetes;
pub mod manifest;
pub mod reconcilers;
pub mod render;
pub mod status;
pub mod types;

#[cfg(test)]
pub mod test_utils;
