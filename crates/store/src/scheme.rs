//! Kind registry.
//!
//! A `Scheme` is built once at start-up and handed to the store and the
//! engine by reference. Nothing reaches for a process-wide registry.

use std::collections::BTreeMap;

use kube::Resource;
use kube::core::GroupVersionKind;

use crate::error::{Error, Result};

/// Registered kinds, keyed by `apiVersion/kind`.
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    kinds: BTreeMap<String, GroupVersionKind>,
}

impl Scheme {
    /// Start building a scheme.
    pub fn builder() -> SchemeBuilder {
        SchemeBuilder::default()
    }

    /// Whether `K` is registered.
    pub fn contains<K: Resource<DynamicType = ()>>(&self) -> bool {
        self.kinds.contains_key(&type_key::<K>())
    }

    /// The registered group/version/kind of `K`.
    ///
    /// # Errors
    /// Returns `Error::UnknownKind` when `K` was never registered.
    pub fn gvk_of<K: Resource<DynamicType = ()>>(&self) -> Result<GroupVersionKind> {
        self.kinds
            .get(&type_key::<K>())
            .cloned()
            .ok_or_else(|| Error::unknown_kind(type_key::<K>()))
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether no kind is registered.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Builder for `Scheme`.
#[derive(Debug, Default)]
pub struct SchemeBuilder {
    kinds: BTreeMap<String, GroupVersionKind>,
}

impl SchemeBuilder {
    /// Register `K`. Registering twice is harmless.
    #[must_use]
    pub fn register<K: Resource<DynamicType = ()>>(mut self) -> Self {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        self.kinds.insert(type_key::<K>(), gvk);
        self
    }

    /// Build the scheme.
    pub fn build(self) -> Scheme {
        Scheme { kinds: self.kinds }
    }
}

fn type_key<K: Resource<DynamicType = ()>>() -> String {
    format!("{}/{}", K::api_version(&()), K::kind(&()))
}
