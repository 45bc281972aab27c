//! PostgresDatabase reconciler
//!
//! Owns three children named after the parent: a Deployment, a Service and
//! a PersistentVolumeClaim. Children are created once; afterwards only the
//! Deployment's replica count is kept in line with the spec.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use kube::ResourceExt;
use serde_json::json;
use tracing::{info, instrument};

use super::status::sync_status;
use super::{ensure, Outcome};
use crate::adapters::{build_deployment, build_service, build_volume_claim};
use crate::config::OperatorConfig;
use crate::crd::{PostgresDatabase, HEALTH_OK};
use crate::error::Result;
use crate::metrics;
use crate::store::ObjectStore;

/// Children of a PostgresDatabase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatabaseChild {
    Workload,
    Endpoint,
    VolumeClaim,
}

impl DatabaseChild {
    /// Every child, in creation order
    pub const ALL: [DatabaseChild; 3] = [
        DatabaseChild::Workload,
        DatabaseChild::Endpoint,
        DatabaseChild::VolumeClaim,
    ];

    /// Kind of the child resource
    pub fn kind(self) -> &'static str {
        match self {
            DatabaseChild::Workload => "Deployment",
            DatabaseChild::Endpoint => "Service",
            DatabaseChild::VolumeClaim => "PersistentVolumeClaim",
        }
    }
}

/// Reconciles PostgresDatabase objects against an [`ObjectStore`]
pub struct DatabaseReconciler<S> {
    store: Arc<S>,
    config: Arc<OperatorConfig>,
}

impl<S: ObjectStore> DatabaseReconciler<S> {
    pub fn new(store: Arc<S>, config: Arc<OperatorConfig>) -> Self {
        Self { store, config }
    }

    /// Run one reconcile pass for the database `name` in `namespace`
    #[instrument(skip(self))]
    pub async fn reconcile(&self, name: &str, namespace: &str) -> Result<Outcome> {
        let Some(mut db) = self.store.get::<PostgresDatabase>(name, namespace).await? else {
            info!("PostgresDatabase not found, nothing to reconcile");
            return Ok(Outcome::Deleted);
        };
        self.config.defaults.apply_database_defaults(&mut db.spec);

        for child in DatabaseChild::ALL {
            self.ensure_child(child, &db, namespace).await?;
        }
        self.manage_replicas(&db, namespace).await?;
        self.update_status(&db, namespace).await?;

        Ok(Outcome::Reconciled)
    }

    async fn ensure_child(&self, child: DatabaseChild, db: &PostgresDatabase, namespace: &str) -> Result<()> {
        let name = db.name_any();
        let defaults = &self.config.defaults;
        let store = self.store.as_ref();
        match child {
            DatabaseChild::Workload => {
                ensure(store, &name, namespace, || build_deployment(db, defaults)).await?;
            }
            DatabaseChild::Endpoint => {
                ensure(store, &name, namespace, || build_service(db, defaults)).await?;
            }
            DatabaseChild::VolumeClaim => {
                ensure(store, &name, namespace, || build_volume_claim(db, defaults)).await?;
            }
        }
        Ok(())
    }

    /// Patch the Deployment's replica count when it drifted from the spec.
    /// No other field is corrected.
    async fn manage_replicas(&self, db: &PostgresDatabase, namespace: &str) -> Result<()> {
        let name = db.name_any();
        let desired = db.spec.replicas.unwrap_or(self.config.defaults.replicas);

        let Some(deployment) = self.store.get::<Deployment>(&name, namespace).await? else {
            return Ok(());
        };
        let live = deployment.spec.as_ref().and_then(|spec| spec.replicas);
        if live == Some(desired) {
            return Ok(());
        }

        info!(name = %name, live = ?live, desired = desired, "Correcting replica count");
        self.store
            .patch::<Deployment>(&name, namespace, &json!({ "spec": { "replicas": desired } }))
            .await?;
        metrics::DRIFT_CORRECTIONS
            .with_label_values(&["PostgresDatabase"])
            .inc();
        Ok(())
    }

    /// Mirror child statuses onto the parent and recompute health
    async fn update_status(&self, db: &PostgresDatabase, namespace: &str) -> Result<()> {
        let name = db.name_any();
        let deployment = self.store.get::<Deployment>(&name, namespace).await?;
        let service = self.store.get::<Service>(&name, namespace).await?;
        let claim = self.store.get::<PersistentVolumeClaim>(&name, namespace).await?;

        let present = [deployment.is_some(), service.is_some(), claim.is_some()];
        let health = DatabaseChild::ALL
            .iter()
            .zip(present)
            .find(|(_, found)| !found)
            .map(|(child, _)| format!("{} {}/{} not found", child.kind(), namespace, name))
            .unwrap_or_else(|| HEALTH_OK.to_string());

        let deployment_status = deployment.and_then(|d| d.status);
        let service_status = service.and_then(|s| s.status);
        let claim_status = claim.and_then(|c| c.status);

        sync_status::<_, PostgresDatabase, _>(self.store.as_ref(), &name, namespace, |sync| {
            sync.set("deployment", |s| &mut s.deployment, deployment_status);
            sync.set("service", |s| &mut s.service, service_status);
            sync.set("persistentVolumeClaim", |s| &mut s.persistent_volume_claim, claim_status);
            sync.set("health", |s| &mut s.health, health);
        })
        .await?;
        Ok(())
    }
}
