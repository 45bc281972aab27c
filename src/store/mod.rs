//! Object store abstraction
//!
//! Reconcilers talk to the cluster only through [`ObjectStore`]. This keeps
//! the reconcile logic independent of the API server so it can be driven by
//! [`MemoryStore`] in tests and by [`KubeStore`] in production.
//!
//! Lookups return `Ok(None)` for absent objects; every other failure is an
//! error and is propagated by the caller.

mod cluster;
mod memory;

pub use cluster::KubeStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Label set used both for labelling children and for selecting them
pub type Labels = BTreeMap<String, String>;

/// Namespaced object kinds the store can hold
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

/// Generic object store the reconcilers run against
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` when it does not exist
    async fn get<K: StoreObject>(&self, name: &str, namespace: &str) -> Result<Option<K>>;

    /// List objects in a namespace carrying every label in `selector`
    async fn list<K: StoreObject>(&self, namespace: &str, selector: &Labels) -> Result<Vec<K>>;

    /// Create an object in the namespace recorded in its metadata
    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K>;

    /// Apply a JSON merge patch to an object's main resource
    async fn patch<K: StoreObject>(
        &self,
        name: &str,
        namespace: &str,
        patch: &serde_json::Value,
    ) -> Result<K>;

    /// Write the object's status sub-resource
    async fn update_status<K: StoreObject>(&self, obj: &K) -> Result<()>;
}

/// Render a label set as a Kubernetes label selector string
pub fn selector_string(selector: &Labels) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_string_joins_pairs_in_key_order() {
        let mut labels = Labels::new();
        labels.insert("cr".to_string(), "db1".to_string());
        labels.insert("app".to_string(), "postgres".to_string());

        assert_eq!(selector_string(&labels), "app=postgres,cr=db1");
        assert_eq!(selector_string(&Labels::new()), "");
    }
}
