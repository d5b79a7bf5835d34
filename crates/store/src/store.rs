//! Store trait and the tracing wrapper.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use kube::Resource;
use kube::core::NamespaceResourceScope;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::key::ObjectKey;

/// Any namespaced object the store can hold.
pub trait StoreObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Trait for cluster object stores.
///
/// Writers coordinate through `metadata.resourceVersion`: `replace` fails
/// with `Error::Conflict` when the stored version moved on.
#[async_trait]
pub trait ApiStore: Send + Sync {
    /// Fetch an object; `None` when it does not exist.
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>>;

    /// Create an object. Fails with `Error::Conflict` when it already exists.
    async fn create<K: StoreObject>(&self, object: &K) -> Result<K>;

    /// Replace an object, guarded by its `resourceVersion` when set.
    /// The status is left untouched.
    async fn replace<K: StoreObject>(&self, object: &K) -> Result<K>;

    /// Set the complete status of an object. Fields absent from `status`
    /// are removed.
    async fn patch_status<K: StoreObject>(
        &self,
        key: &ObjectKey,
        status: serde_json::Value,
    ) -> Result<K>;

    /// Delete an object. Objects it owns are collected by the store.
    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<()>;

    /// List objects carrying every label in `selector`, in one namespace or
    /// in all of them.
    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>>;
}

/// A wrapper that adds tracing to a store.
pub struct TracingStore<S: ApiStore> {
    inner: S,
}

impl<S: ApiStore> TracingStore<S> {
    /// Create a new tracing store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: ApiStore> ApiStore for TracingStore<S> {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>> {
        tracing::debug!(kind = %K::kind(&()), key = %key, "Getting object");
        let result = self.inner.get::<K>(key).await;
        if let Ok(ref found) = result {
            tracing::trace!(key = %key, found = found.is_some(), "Object fetched");
        }
        result
    }

    async fn create<K: StoreObject>(&self, object: &K) -> Result<K> {
        tracing::debug!(
            kind = %K::kind(&()),
            name = ?object.meta().name,
            namespace = ?object.meta().namespace,
            "Creating object"
        );
        self.inner.create(object).await
    }

    async fn replace<K: StoreObject>(&self, object: &K) -> Result<K> {
        tracing::debug!(
            kind = %K::kind(&()),
            name = ?object.meta().name,
            resource_version = ?object.meta().resource_version,
            "Replacing object"
        );
        let result = self.inner.replace(object).await;
        if let Err(ref e) = result {
            tracing::debug!(error = %e, "Replace rejected");
        }
        result
    }

    async fn patch_status<K: StoreObject>(
        &self,
        key: &ObjectKey,
        status: serde_json::Value,
    ) -> Result<K> {
        tracing::debug!(kind = %K::kind(&()), key = %key, "Patching status");
        self.inner.patch_status(key, status).await
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<()> {
        tracing::debug!(kind = %K::kind(&()), key = %key, "Deleting object");
        self.inner.delete::<K>(key).await
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        tracing::debug!(kind = %K::kind(&()), namespace = ?namespace, selector = ?selector, "Listing objects");
        self.inner.list(namespace, selector).await
    }
}
