//! WebGame controller binary support.
//!
//! - **cli**: command line and environment configuration
//! - **controller**: the reconciler running under the kube-rs controller
//!   runtime against a live cluster
//! - **telemetry**: tracing subscriber setup

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cli;
pub mod controller;
pub mod telemetry;

use kube::CustomResourceExt;
use webgame_api::WebGame;

/// The WebGame CustomResourceDefinition as YAML.
///
/// # Errors
/// Returns an error when the definition cannot be serialized.
pub fn crd_yaml() -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&WebGame::crd())
}
