//! Object identity.

use std::fmt;

use kube::Resource;
use serde::{Deserialize, Serialize};

/// Namespace and name of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a new key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced resource; `None` when name or namespace is unset.
    pub fn from_resource<K: Resource>(resource: &K) -> Option<Self> {
        let meta = resource.meta();
        Some(Self::new(meta.namespace.clone()?, meta.name.clone()?))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Service;
    use kube::api::ObjectMeta;

    #[test]
    fn test_display() {
        assert_eq!(ObjectKey::new("games", "sample").to_string(), "games/sample");
    }

    #[test]
    fn test_from_resource_requires_namespace() {
        let mut svc = Service {
            metadata: ObjectMeta {
                name: Some("sample".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(ObjectKey::from_resource(&svc), None);

        svc.metadata.namespace = Some("games".to_string());
        assert_eq!(
            ObjectKey::from_resource(&svc),
            Some(ObjectKey::new("games", "sample"))
        );
    }
}
