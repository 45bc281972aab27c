//! Object store backed by the Kubernetes API server

use async_trait::async_trait;
use kube::{
    api::{ListParams, Patch, PatchParams, PostParams},
    Api, Client, ResourceExt,
};
use tracing::debug;

use super::{selector_string, Labels, ObjectStore, StoreObject};
use crate::error::{Error, Result};

/// Field manager recorded on patches made by the operator
pub const FIELD_MANAGER: &str = "postgres-operator";

/// [`ObjectStore`] talking to the API server through a kube [`Client`]
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Create a store from a connected client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(&self, name: &str, namespace: &str) -> Result<Option<K>> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn list<K: StoreObject>(&self, namespace: &str, selector: &Labels) -> Result<Vec<K>> {
        let params = ListParams::default().labels(&selector_string(selector));
        let list = self.api::<K>(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K> {
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::store(format!("{} has no namespace", obj.name_any())))?;
        debug!(name = %obj.name_any(), namespace = %namespace, kind = %K::kind(&()), "Creating object");
        Ok(self
            .api::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await?)
    }

    async fn patch<K: StoreObject>(
        &self,
        name: &str,
        namespace: &str,
        patch: &serde_json::Value,
    ) -> Result<K> {
        Ok(self
            .api::<K>(namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await?)
    }

    async fn update_status<K: StoreObject>(&self, obj: &K) -> Result<()> {
        let name = obj.name_any();
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::store(format!("{} has no namespace", name)))?;
        // The object was re-fetched just before, so its resourceVersion
        // turns a concurrent write into a conflict instead of a lost update
        self.api::<K>(&namespace)
            .replace_status(&name, &PostParams::default(), serde_json::to_vec(obj)?)
            .await?;
        Ok(())
    }
}
