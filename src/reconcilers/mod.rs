//! Reconcilers for the Postgres CRDs
//!
//! This module contains the business logic for reconciling each CRD type.
//! Every step is idempotent: children are created only when absent, and the
//! parent's status is written only when something in it changed. A pass that
//! fails part way leaves what it created in place and the next pass resumes.

pub mod backup;
pub mod database;
mod env;
mod status;

pub use backup::BackupReconciler;
pub use database::{DatabaseChild, DatabaseReconciler};
pub use env::{resolve_env, resolve_pod_env};
pub use status::{StatusOwner, StatusSync};

use kube::ResourceExt;
use tracing::info;

use crate::error::Result;
use crate::metrics;
use crate::store::{ObjectStore, StoreObject};

/// Result of a successful reconcile pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The parent no longer exists; cleanup is left to garbage collection
    Deleted,
    /// All steps completed
    Reconciled,
}

/// Return the existing child, or build and create it when absent
///
/// An existing child is never overwritten, whatever its contents.
pub(crate) async fn ensure<S, K, F>(store: &S, name: &str, namespace: &str, build: F) -> Result<K>
where
    S: ObjectStore,
    K: StoreObject,
    F: FnOnce() -> K + Send,
{
    if let Some(existing) = store.get::<K>(name, namespace).await? {
        return Ok(existing);
    }

    let kind = K::kind(&());
    let child = build();
    let created = store.create(&child).await?;
    info!(kind = %kind, name = %created.name_any(), namespace = %namespace, "Created child resource");
    metrics::CHILDREN_CREATED.with_label_values(&[kind.as_ref()]).inc();
    Ok(created)
}
