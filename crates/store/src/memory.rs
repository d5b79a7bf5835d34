//! In-memory store.
//!
//! Behaves like a small API server: it assigns uids, resource versions and
//! generations, allocates Service cluster IPs, enforces optimistic
//! concurrency, keeps status apart from the rest of the object, collects
//! owned objects when their owner is deleted, and broadcasts every change.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::GroupVersionKind;
use serde_json::{Map, Value};
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;
use webgame_api::labels;

use crate::error::{Error, Result};
use crate::key::ObjectKey;
use crate::scheme::Scheme;
use crate::store::{ApiStore, StoreObject};
use crate::watch::{EventSource, WatchAction, WatchEvent, WatchSubscription};

/// Capacity of the watch channel.
const WATCH_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct StoredKey {
    api_version: String,
    kind: String,
    key: ObjectKey,
}

impl StoredKey {
    fn new(gvk: &GroupVersionKind, key: &ObjectKey) -> Self {
        Self {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
            key: key.clone(),
        }
    }

    fn is_type(&self, gvk: &GroupVersionKind) -> bool {
        self.kind == gvk.kind && self.api_version == gvk.api_version()
    }
}

/// In-memory object store.
pub struct InMemoryStore {
    scheme: Arc<Scheme>,
    objects: RwLock<BTreeMap<StoredKey, Value>>,
    revision: AtomicU64,
    next_ip: AtomicU32,
    events: broadcast::Sender<WatchEvent>,
}

impl InMemoryStore {
    /// Create a store accepting the kinds registered in `scheme`.
    pub fn new(scheme: Arc<Scheme>) -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            scheme,
            objects: RwLock::new(BTreeMap::new()),
            revision: AtomicU64::new(0),
            next_ip: AtomicU32::new(0),
            events,
        }
    }

    /// Current global revision.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Number of stored objects across all kinds.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store holds no object.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn next_revision(&self) -> String {
        let previous = self.revision.fetch_add(1, Ordering::SeqCst);
        previous.saturating_add(1).to_string()
    }

    fn allocate_cluster_ip(&self) -> String {
        let n = self.next_ip.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        format!("10.96.{}.{}", (n >> 8) & 0xff, n & 0xff)
    }

    fn publish(&self, action: WatchAction, stored: &StoredKey, value: &Value) {
        let event = WatchEvent {
            action,
            gvk: gvk_of_stored(stored),
            key: stored.key.clone(),
            labels: read_meta(value, "labels").unwrap_or_default(),
            owners: owners_of(value),
        };
        // No subscriber is not an error.
        let _ = self.events.send(event);
    }

    fn is_service(gvk: &GroupVersionKind) -> bool {
        gvk.group.is_empty() && gvk.kind == "Service"
    }
}

#[async_trait]
impl ApiStore for InMemoryStore {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>> {
        let gvk = self.scheme.gvk_of::<K>()?;
        let objects = self.objects.read().await;
        objects
            .get(&StoredKey::new(&gvk, key))
            .cloned()
            .map(from_value)
            .transpose()
    }

    async fn create<K: StoreObject>(&self, object: &K) -> Result<K> {
        let gvk = self.scheme.gvk_of::<K>()?;
        let key = key_of(&gvk, object)?;
        let stored = StoredKey::new(&gvk, &key);

        let mut value = to_value(object)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("status");
        }
        let meta = metadata_mut(&mut value)
            .ok_or_else(|| Error::invalid(&gvk.kind, &key, "object is not a map"))?;
        meta.insert("uid".into(), Value::String(Uuid::new_v4().to_string()));
        meta.insert("generation".into(), Value::from(1));
        meta.remove("deletionTimestamp");

        if Self::is_service(&gvk) {
            let assigned = value
                .pointer("/spec/clusterIP")
                .and_then(Value::as_str)
                .is_some_and(|ip| !ip.is_empty());
            if !assigned {
                let ip = self.allocate_cluster_ip();
                if let Some(spec) = value
                    .as_object_mut()
                    .and_then(|m| m.entry("spec").or_insert_with(|| Value::Object(Map::new())).as_object_mut())
                {
                    spec.insert("clusterIP".into(), Value::String(ip.clone()));
                    spec.insert("clusterIPs".into(), Value::from(vec![ip]));
                }
            }
        }

        let mut objects = self.objects.write().await;
        if objects.contains_key(&stored) {
            return Err(Error::conflict(&gvk.kind, &key, "already exists"));
        }
        set_meta(&mut value, "resourceVersion", Value::String(self.next_revision()));
        objects.insert(stored.clone(), value.clone());
        drop(objects);

        self.publish(WatchAction::Added, &stored, &value);
        from_value(value)
    }

    async fn replace<K: StoreObject>(&self, object: &K) -> Result<K> {
        let gvk = self.scheme.gvk_of::<K>()?;
        let key = key_of(&gvk, object)?;
        let stored = StoredKey::new(&gvk, &key);
        let mut value = to_value(object)?;

        let mut objects = self.objects.write().await;
        let current = objects
            .get(&stored)
            .cloned()
            .ok_or_else(|| Error::not_found(&gvk.kind, &key))?;

        let current_version = read_meta::<String>(&current, "resourceVersion");
        if let Some(expected) = object.meta().resource_version.as_ref() {
            if current_version.as_ref() != Some(expected) {
                return Err(Error::conflict(
                    &gvk.kind,
                    &key,
                    format!(
                        "resourceVersion {expected} is stale, current is {}",
                        current_version.unwrap_or_default()
                    ),
                ));
            }
        }

        // Server-owned fields come from the stored object.
        if let Some(map) = value.as_object_mut() {
            match current.get("status") {
                Some(status) => map.insert("status".into(), status.clone()),
                None => map.remove("status"),
            };
        }
        for field in ["uid", "creationTimestamp", "deletionTimestamp"] {
            match current.pointer(&format!("/metadata/{field}")) {
                Some(v) => set_meta(&mut value, field, v.clone()),
                None => {
                    if let Some(meta) = metadata_mut(&mut value) {
                        meta.remove(field);
                    }
                }
            }
        }
        if Self::is_service(&gvk) {
            let requested = value.pointer("/spec/clusterIP").and_then(Value::as_str);
            if requested.is_none_or(str::is_empty) {
                let kept = current.pointer("/spec/clusterIP").cloned();
                if let (Some(ip), Some(spec)) = (
                    kept,
                    value.get_mut("spec").and_then(Value::as_object_mut),
                ) {
                    spec.insert("clusterIP".into(), ip);
                }
            }
        }

        let generation = read_meta::<i64>(&current, "generation").unwrap_or(1);
        let spec_changed = value.get("spec") != current.get("spec");
        set_meta(
            &mut value,
            "generation",
            Value::from(if spec_changed { generation.saturating_add(1) } else { generation }),
        );

        // A write that changes nothing keeps the current version.
        set_meta(
            &mut value,
            "resourceVersion",
            current_version.clone().map_or(Value::Null, Value::String),
        );
        if value == current {
            return from_value(current);
        }

        set_meta(&mut value, "resourceVersion", Value::String(self.next_revision()));
        objects.insert(stored.clone(), value.clone());
        drop(objects);

        self.publish(WatchAction::Modified, &stored, &value);
        from_value(value)
    }

    async fn patch_status<K: StoreObject>(
        &self,
        key: &ObjectKey,
        status: serde_json::Value,
    ) -> Result<K> {
        let gvk = self.scheme.gvk_of::<K>()?;
        let stored = StoredKey::new(&gvk, key);

        let mut objects = self.objects.write().await;
        let current = objects
            .get_mut(&stored)
            .ok_or_else(|| Error::not_found(&gvk.kind, key))?;

        if current.get("status") == Some(&status) {
            return from_value(current.clone());
        }

        let map = current
            .as_object_mut()
            .ok_or_else(|| Error::invalid(&gvk.kind, key, "object is not a map"))?;
        if status.is_null() {
            map.remove("status");
        } else {
            map.insert("status".into(), status);
        }
        set_meta(current, "resourceVersion", Value::String(self.next_revision()));
        let value = current.clone();
        drop(objects);

        self.publish(WatchAction::Modified, &stored, &value);
        from_value(value)
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<()> {
        let gvk = self.scheme.gvk_of::<K>()?;
        let root = StoredKey::new(&gvk, key);

        let mut objects = self.objects.write().await;
        let removed_root = objects
            .remove(&root)
            .ok_or_else(|| Error::not_found(&gvk.kind, key))?;

        let mut removed = vec![(root, removed_root)];
        let mut cursor = 0;
        while let Some(owner_uid) = removed
            .get(cursor)
            .map(|(_, owner)| read_meta::<String>(owner, "uid"))
        {
            cursor = cursor.saturating_add(1);
            let Some(owner_uid) = owner_uid else {
                continue;
            };
            let owned: Vec<StoredKey> = objects
                .iter()
                .filter(|(_, v)| owners_of(v).iter().any(|o| o.uid == owner_uid))
                .map(|(k, _)| k.clone())
                .collect();
            for child in owned {
                if let Some(value) = objects.remove(&child) {
                    removed.push((child, value));
                }
            }
        }
        drop(objects);

        for (stored, value) in &removed {
            tracing::trace!(kind = %stored.kind, key = %stored.key, "Object removed");
            self.publish(WatchAction::Deleted, stored, value);
        }
        Ok(())
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let gvk = self.scheme.gvk_of::<K>()?;
        let objects = self.objects.read().await;
        objects
            .iter()
            .filter(|(k, _)| k.is_type(&gvk))
            .filter(|(k, _)| namespace.is_none_or(|ns| k.key.namespace == ns))
            .filter(|(_, v)| {
                let object_labels = read_meta(v, "labels").unwrap_or_default();
                labels::matches(selector, &object_labels)
            })
            .map(|(_, v)| from_value(v.clone()))
            .collect()
    }
}

impl EventSource for InMemoryStore {
    fn subscribe(&self) -> WatchSubscription {
        WatchSubscription::new(self.events.subscribe())
    }
}

fn gvk_of_stored(stored: &StoredKey) -> GroupVersionKind {
    let (group, version) = stored
        .api_version
        .split_once('/')
        .unwrap_or(("", stored.api_version.as_str()));
    GroupVersionKind::gvk(group, version, &stored.kind)
}

fn key_of<K: StoreObject>(gvk: &GroupVersionKind, object: &K) -> Result<ObjectKey> {
    ObjectKey::from_resource(object).ok_or_else(|| {
        Error::invalid(
            &gvk.kind,
            object.meta().name.clone().unwrap_or_default(),
            "metadata.name and metadata.namespace are required",
        )
    })
}

fn to_value<K: StoreObject>(object: &K) -> Result<Value> {
    serde_json::to_value(object).map_err(|e| Error::serialization(e.to_string()))
}

fn from_value<K: StoreObject>(value: Value) -> Result<K> {
    serde_json::from_value(value).map_err(|e| Error::serialization(e.to_string()))
}

fn metadata_mut(value: &mut Value) -> Option<&mut Map<String, Value>> {
    value
        .as_object_mut()?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

fn set_meta(value: &mut Value, field: &str, field_value: Value) {
    if let Some(meta) = metadata_mut(value) {
        if field_value.is_null() {
            meta.remove(field);
        } else {
            meta.insert(field.to_string(), field_value);
        }
    }
}

fn read_meta<T: serde::de::DeserializeOwned>(value: &Value, field: &str) -> Option<T> {
    value
        .get("metadata")
        .and_then(|m| m.get(field))
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}

fn owners_of(value: &Value) -> Vec<OwnerReference> {
    read_meta(value, "ownerReferences").unwrap_or_default()
}
