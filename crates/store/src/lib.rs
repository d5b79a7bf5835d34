//! Typed cluster object store.
//!
//! The controller only ever talks to the cluster through [`ApiStore`]:
//!
//! - **`ApiStore`**: get / create / replace / patch_status / delete / list,
//!   with optimistic concurrency on `metadata.resourceVersion`
//! - **`Scheme`**: explicit registry of the kinds a store accepts
//! - **`InMemoryStore`**: reference store with owner-cascade deletion and
//!   watch events, used by tests and the in-process loop
//! - **`TracingStore`**: logs every verb of a wrapped store
//! - **`KubeStore`**: the same verbs against a Kubernetes API server
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use webgame_store::{ApiStore, InMemoryStore, ObjectKey, Scheme};
//! use webgame_api::WebGame;
//!
//! let scheme = Arc::new(Scheme::builder().register::<WebGame>().build());
//! let store = InMemoryStore::new(scheme);
//! let game: Option<WebGame> = store.get(&ObjectKey::new("games", "sample")).await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod key;
pub mod kube_store;
pub mod memory;
pub mod scheme;
pub mod store;
pub mod watch;

// Re-export main types
pub use error::{Error, Result};
pub use key::ObjectKey;
pub use kube_store::KubeStore;
pub use memory::InMemoryStore;
pub use scheme::{Scheme, SchemeBuilder};
pub use store::{ApiStore, StoreObject, TracingStore};
pub use watch::{EventSource, WatchAction, WatchError, WatchEvent, WatchSubscription};
