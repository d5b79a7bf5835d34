//! Change notifications.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use kube::core::GroupVersionKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::key::ObjectKey;

/// What happened to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchAction {
    Added,
    Modified,
    Deleted,
}

/// A change to one stored object.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub action: WatchAction,
    pub gvk: GroupVersionKind,
    pub key: ObjectKey,
    pub labels: BTreeMap<String, String>,
    pub owners: Vec<OwnerReference>,
}

impl WatchEvent {
    /// Whether the event concerns an object of kind `K`.
    pub fn is_kind<K: Resource<DynamicType = ()>>(&self) -> bool {
        self.gvk.kind == K::kind(&()) && self.gvk.group == K::group(&())
    }

    /// Key of the owner of kind `K`, if the object has one.
    ///
    /// Owners are always in the same namespace as the object.
    pub fn owner_of_kind<K: Resource<DynamicType = ()>>(&self) -> Option<ObjectKey> {
        let api_version = K::api_version(&());
        let kind = K::kind(&());
        self.owners
            .iter()
            .find(|owner| owner.kind == kind && owner.api_version == api_version)
            .map(|owner| ObjectKey::new(self.key.namespace.clone(), owner.name.clone()))
    }
}

/// Watch subscription errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("subscriber lagged behind and missed {0} events")]
    Lagged(u64),

    #[error("watch channel closed")]
    Closed,
}

/// Delivers change notifications, at least once, possibly coalesced.
pub trait EventSource: Send + Sync {
    /// Subscribe to every change from now on.
    fn subscribe(&self) -> WatchSubscription;
}

/// Subscription handle for receiving events.
pub struct WatchSubscription {
    receiver: broadcast::Receiver<WatchEvent>,
}

impl WatchSubscription {
    /// Wrap a broadcast receiver.
    pub const fn new(receiver: broadcast::Receiver<WatchEvent>) -> Self {
        Self { receiver }
    }

    /// Receive the next event.
    ///
    /// # Errors
    /// `WatchError::Lagged` when events were dropped; the caller should
    /// resync. `WatchError::Closed` when the source is gone.
    pub async fn recv(&mut self) -> Result<WatchEvent, WatchError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(missed) => WatchError::Lagged(missed),
            broadcast::error::RecvError::Closed => WatchError::Closed,
        })
    }
}
