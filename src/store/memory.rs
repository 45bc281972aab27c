//! In-memory object store for testing.
//!
//! [`MemoryStore`] keeps objects as JSON keyed by kind, namespace and name.
//! It follows the API server closely enough for reconcile logic: uids are
//! assigned on create, label selection and merge patches behave the same,
//! and status writes only touch the `status` field.
//!
//! Not suitable for production: nothing is persisted and there is no watch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{Map, Value};

use super::{Labels, ObjectStore, StoreObject};
use crate::error::{Error, Result};

type Key = (String, String, String);

/// In-memory [`ObjectStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<Key, Value>>,
    failing: RwLock<BTreeSet<String>>,
    next_uid: AtomicUsize,
    creates: AtomicUsize,
    status_writes: AtomicUsize,
}

/// Converts a lock poison error to a store error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::store("lock poisoned")
}

fn key<K: StoreObject>(name: &str, namespace: &str) -> Key {
    (
        K::kind(&()).to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

/// RFC 7386 JSON merge patch
fn merge(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(existing) = target {
        for (field, value) in fields {
            if value.is_null() {
                existing.remove(field);
            } else {
                merge(existing.entry(field.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, replacing any existing one with the same identity.
    /// A uid is assigned when the object has none.
    pub fn insert<K: StoreObject>(&self, mut obj: K) -> Result<()> {
        let (name, namespace) = identity(&obj)?;
        if obj.meta().uid.is_none() {
            obj.meta_mut().uid = Some(self.uid());
        }
        let value = serde_json::to_value(&obj)?;
        self.objects
            .write()
            .map_err(poison_err)?
            .insert(key::<K>(&name, &namespace), value);
        Ok(())
    }

    /// Make every following operation on kind `K` fail
    pub fn fail_kind<K: StoreObject>(&self) -> Result<()> {
        self.failing
            .write()
            .map_err(poison_err)?
            .insert(K::kind(&()).to_string());
        Ok(())
    }

    /// Number of successful creates so far
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of successful status writes so far
    pub fn status_write_count(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Number of stored objects of kind `K` in a namespace
    pub fn count<K: StoreObject>(&self, namespace: &str) -> Result<usize> {
        let kind = K::kind(&()).to_string();
        Ok(self
            .objects
            .read()
            .map_err(poison_err)?
            .keys()
            .filter(|(k, ns, _)| *k == kind && ns == namespace)
            .count())
    }

    fn uid(&self) -> String {
        let n = self.next_uid.fetch_add(1, Ordering::SeqCst);
        format!("00000000-0000-0000-0000-{:012}", n)
    }

    fn check<K: StoreObject>(&self) -> Result<()> {
        let kind = K::kind(&()).to_string();
        if self.failing.read().map_err(poison_err)?.contains(&kind) {
            return Err(Error::store(format!("injected failure for {}", kind)));
        }
        Ok(())
    }
}

fn identity<K: StoreObject>(obj: &K) -> Result<(String, String)> {
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::store(format!("{} has no name", K::kind(&()))))?;
    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::store(format!("{} has no namespace", name)))?;
    Ok((name, namespace))
}

fn has_labels(labels: &Labels, selector: &Labels) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreObject>(&self, name: &str, namespace: &str) -> Result<Option<K>> {
        self.check::<K>()?;
        let objects = self.objects.read().map_err(poison_err)?;
        objects
            .get(&key::<K>(name, namespace))
            .map(|value| serde_json::from_value(value.clone()).map_err(Error::from))
            .transpose()
    }

    async fn list<K: StoreObject>(&self, namespace: &str, selector: &Labels) -> Result<Vec<K>> {
        self.check::<K>()?;
        let kind = K::kind(&()).to_string();
        let objects = self.objects.read().map_err(poison_err)?;
        let mut found = Vec::new();
        for ((k, ns, _), value) in objects.iter() {
            if *k != kind || ns != namespace {
                continue;
            }
            let obj: K = serde_json::from_value(value.clone())?;
            if has_labels(obj.labels(), selector) {
                found.push(obj);
            }
        }
        Ok(found)
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K> {
        self.check::<K>()?;
        let (name, namespace) = identity(obj)?;
        let key = key::<K>(&name, &namespace);
        let mut objects = self.objects.write().map_err(poison_err)?;
        if objects.contains_key(&key) {
            return Err(Error::store(format!(
                "{} {}/{} already exists",
                key.0, namespace, name
            )));
        }
        let mut created = obj.clone();
        created.meta_mut().uid = Some(self.uid());
        objects.insert(key, serde_json::to_value(&created)?);
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn patch<K: StoreObject>(
        &self,
        name: &str,
        namespace: &str,
        patch: &Value,
    ) -> Result<K> {
        self.check::<K>()?;
        let mut objects = self.objects.write().map_err(poison_err)?;
        let value = objects
            .get_mut(&key::<K>(name, namespace))
            .ok_or_else(|| Error::store(format!("{}/{} not found", namespace, name)))?;
        merge(value, patch);
        Ok(serde_json::from_value(value.clone())?)
    }

    async fn update_status<K: StoreObject>(&self, obj: &K) -> Result<()> {
        self.check::<K>()?;
        let (name, namespace) = identity(obj)?;
        let status = serde_json::to_value(obj)?
            .get("status")
            .cloned()
            .unwrap_or(Value::Null);
        let mut objects = self.objects.write().map_err(poison_err)?;
        let value = objects
            .get_mut(&key::<K>(&name, &namespace))
            .ok_or_else(|| Error::store(format!("{}/{} not found", namespace, name)))?;
        if let Value::Object(fields) = value {
            fields.insert("status".to_string(), status);
        }
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
