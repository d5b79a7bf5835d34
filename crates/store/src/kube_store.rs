//! Store backed by a Kubernetes API server.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde_json::json;
use webgame_api::labels;

use crate::error::{Error, Result};
use crate::key::ObjectKey;
use crate::store::{ApiStore, StoreObject};

/// Field manager used for status writes.
pub const FIELD_MANAGER: &str = "webgame-controller";

/// `ApiStore` over `kube::Api`.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store using `client`.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ApiStore for KubeStore {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>> {
        self.api::<K>(&key.namespace)
            .get_opt(&key.name)
            .await
            .map_err(|e| map_error::<K>("get", key, e))
    }

    async fn create<K: StoreObject>(&self, object: &K) -> Result<K> {
        let key = object_key(object)?;
        self.api::<K>(&key.namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| map_error::<K>("create", &key, e))
    }

    async fn replace<K: StoreObject>(&self, object: &K) -> Result<K> {
        let key = object_key(object)?;
        self.api::<K>(&key.namespace)
            .replace(&key.name, &PostParams::default(), object)
            .await
            .map_err(|e| map_error::<K>("replace", &key, e))
    }

    async fn patch_status<K: StoreObject>(
        &self,
        key: &ObjectKey,
        status: serde_json::Value,
    ) -> Result<K> {
        // Server-side apply drops status fields this manager no longer sets.
        let patch = json!({
            "apiVersion": K::api_version(&()),
            "kind": K::kind(&()),
            "status": status,
        });
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.api::<K>(&key.namespace)
            .patch_status(&key.name, &params, &Patch::Apply(&patch))
            .await
            .map_err(|e| map_error::<K>("patch_status", key, e))
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<()> {
        self.api::<K>(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_error::<K>("delete", key, e))
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let api: Api<K> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let params = if selector.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&labels::to_selector_string(selector))
        };
        let key = ObjectKey::new(namespace.unwrap_or("*"), "*");
        api.list(&params)
            .await
            .map(|list| list.items)
            .map_err(|e| map_error::<K>("list", &key, e))
    }
}

fn object_key<K: StoreObject>(object: &K) -> Result<ObjectKey> {
    ObjectKey::from_resource(object).ok_or_else(|| {
        Error::invalid(
            K::kind(&()),
            object.meta().name.clone().unwrap_or_default(),
            "metadata.name and metadata.namespace are required",
        )
    })
}

fn map_error<K: StoreObject>(operation: &str, key: &ObjectKey, err: kube::Error) -> Error {
    let kind = K::kind(&()).to_string();
    match err {
        kube::Error::Api(response) => match response.code {
            404 => Error::not_found(kind, key),
            409 => Error::conflict(kind, key, response.message),
            400 | 422 => Error::invalid(kind, key, response.message),
            _ => Error::unavailable(operation, response.message),
        },
        kube::Error::SerdeError(e) => Error::serialization(e.to_string()),
        other => Error::unavailable(operation, other.to_string()),
    }
}
