//! Status change detection
//!
//! Child statuses are mirrored onto the parent field by field. A field is
//! only counted as changed when the new value differs from the stored one,
//! and the parent is written only when at least one field changed.

use kube::ResourceExt;
use tracing::debug;

use crate::crd::{PostgresBackup, PostgresBackupStatus, PostgresDatabase, PostgresDatabaseStatus};
use crate::error::Result;
use crate::metrics;
use crate::store::{ObjectStore, StoreObject};

/// Parent kinds with a status sub-resource
pub trait StatusOwner: StoreObject {
    type Status: Clone + Default + PartialEq + Send;

    fn status_ref(&self) -> Option<&Self::Status>;
    fn status_slot(&mut self) -> &mut Option<Self::Status>;
}

impl StatusOwner for PostgresDatabase {
    type Status = PostgresDatabaseStatus;

    fn status_ref(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }

    fn status_slot(&mut self) -> &mut Option<Self::Status> {
        &mut self.status
    }
}

impl StatusOwner for PostgresBackup {
    type Status = PostgresBackupStatus;

    fn status_ref(&self) -> Option<&Self::Status> {
        self.status.as_ref()
    }

    fn status_slot(&mut self) -> &mut Option<Self::Status> {
        &mut self.status
    }
}

/// Pending status with the names of the fields that changed
#[derive(Debug)]
pub struct StatusSync<T> {
    status: T,
    changed: Vec<&'static str>,
}

impl<T: Clone + Default> StatusSync<T> {
    /// Start from the currently stored status
    pub fn new(current: Option<&T>) -> Self {
        Self {
            status: current.cloned().unwrap_or_default(),
            changed: Vec::new(),
        }
    }

    /// Set one field, recording it only when the value differs
    pub fn set<V, F>(&mut self, field: &'static str, slot: F, value: V)
    where
        V: PartialEq,
        F: FnOnce(&mut T) -> &mut V,
    {
        let current = slot(&mut self.status);
        if *current != value {
            *current = value;
            self.changed.push(field);
        }
    }

    /// Names of the fields that changed
    pub fn changed(&self) -> &[&'static str] {
        &self.changed
    }

    pub fn is_dirty(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn into_status(self) -> T {
        self.status
    }
}

/// Re-fetch the parent, apply `update` to its stored status and write the
/// status sub-resource if any field changed
///
/// Returns whether a write happened. A parent deleted in the meantime is
/// skipped.
pub(crate) async fn sync_status<S, P, F>(store: &S, name: &str, namespace: &str, update: F) -> Result<bool>
where
    S: ObjectStore,
    P: StatusOwner,
    F: FnOnce(&mut StatusSync<P::Status>) + Send,
{
    let Some(mut latest) = store.get::<P>(name, namespace).await? else {
        return Ok(false);
    };

    let mut sync = StatusSync::new(latest.status_ref());
    update(&mut sync);
    if !sync.is_dirty() {
        debug!(name = %name, "status unchanged, skipping update");
        return Ok(false);
    }

    debug!(name = %latest.name_any(), fields = ?sync.changed(), "Updating status");
    *latest.status_slot() = Some(sync.into_status());
    store.update_status(&latest).await?;
    metrics::STATUS_UPDATES
        .with_label_values(&[P::kind(&()).as_ref()])
        .inc();
    Ok(true)
}
