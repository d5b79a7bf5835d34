//! Level-triggered reconciliation of `WebGame` resources.
//!
//! Every pass compares a `WebGame` with the children derived from it and
//! takes at most one step toward convergence:
//!
//! - **Builders**: pure functions deriving the desired Deployment, Service
//!   and Ingress from the record
//! - **Applier**: get-or-create-then-mutate persistence under optimistic
//!   concurrency, merging labels and setting the owner reference
//! - **Status**: projection of rollout state and addresses, written only
//!   once all children match
//! - **Reconciler**: the ordered pipeline, stopping after the first child
//!   that had to be written
//! - **Loop**: an event-driven scheduler with per-key serialization and
//!   backoff, for stores that publish change events
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use webgame_reconciler::{
//!     controller_scheme, LoopConfig, ReconcilerBuilder, ReconciliationLoop,
//! };
//! use webgame_store::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> webgame_reconciler::Result<()> {
//!     let scheme = Arc::new(controller_scheme());
//!     let store = Arc::new(InMemoryStore::new(scheme.clone()));
//!     let reconciler = Arc::new(
//!         ReconcilerBuilder::new()
//!             .with_store(store.clone())
//!             .with_scheme(scheme)
//!             .build()?,
//!     );
//!
//!     let mut loop_runner = ReconciliationLoop::new(reconciler, store, LoopConfig::default());
//!     let stopper = loop_runner.stopper();
//!     // stopper.stop() from elsewhere ends the loop
//!     loop_runner.run().await
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod applier;
pub mod builder;
pub mod error;
pub mod r#loop;
pub mod merge;
pub mod reconciler;
pub mod status;
pub mod types;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use webgame_api::WebGame;
use webgame_store::Scheme;

// Re-export main types
pub use applier::Applier;
pub use error::{Error, Result};
pub use r#loop::{LoopConfig, LoopStopper, ReconciliationLoop};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerConfig};
pub use types::{Applied, ApplyOutcome, ChildKind, ReconcileOutcome};

/// Scheme holding every kind the reconciler reads or writes.
pub fn controller_scheme() -> Scheme {
    Scheme::builder()
        .register::<WebGame>()
        .register::<Deployment>()
        .register::<Service>()
        .register::<Ingress>()
        .build()
}
