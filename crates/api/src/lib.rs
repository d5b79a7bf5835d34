//! WebGame custom resource.
//!
//! This crate defines the user-facing intent of the controller:
//!
//! - **`WebGame`**: display name, game variant, image, replica count and
//!   routing details for one game instance
//! - **`WebGameStatus`**: rollout state and reachable addresses, written by
//!   the controller only
//! - **Labels**: the `{gameType, instance}` selector and the merge rules
//!   that keep externally added labels intact
//! - **Validation**: checks for input that can never converge
//!
//! # Example
//!
//! ```ignore
//! use kube::CustomResourceExt;
//! use webgame_api::WebGame;
//!
//! let yaml = serde_yaml::to_string(&WebGame::crd())?;
//! println!("{yaml}");
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod labels;
pub mod types;
pub mod validation;

pub use types::{
    DEFAULT_DOMAIN, DEFAULT_INDEX_PAGE, GROUP, VERSION, WebGame, WebGameSpec, WebGameStatus,
};
pub use validation::ValidationError;
