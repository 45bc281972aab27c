//! Kubernetes controllers for the Postgres CRDs
//!
//! This module contains the controller implementations that watch for CRD changes
//! and trigger reconciliation.

mod backup_controller;
mod database_controller;

pub use backup_controller::run as run_backup_controller;
pub use database_controller::run as run_database_controller;

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::Client;

use crate::config::OperatorConfig;
use crate::error::Error;
use crate::reconcilers::{BackupReconciler, DatabaseReconciler, Outcome};
use crate::store::KubeStore;

/// Shared context for all controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Operator configuration
    pub config: Arc<OperatorConfig>,
    pub databases: DatabaseReconciler<KubeStore>,
    pub backups: BackupReconciler<KubeStore>,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(KubeStore::new(client.clone()));
        Self {
            databases: DatabaseReconciler::new(store.clone(), config.clone()),
            backups: BackupReconciler::new(store, config.clone()),
            client,
            config,
        }
    }

    /// Turn a reconcile outcome into the next controller action
    pub fn action(&self, outcome: Outcome) -> Action {
        match outcome {
            Outcome::Deleted => Action::await_change(),
            Outcome::Reconciled => {
                Action::requeue(Duration::from_secs(self.config.resync_interval_secs))
            }
        }
    }
}

/// Retry delay for a failed reconcile
pub fn retry_delay(error: &Error) -> Duration {
    match error {
        Error::DependencyMissing(_) => Duration::from_secs(30),
        Error::Kube(_) | Error::Store(_) => Duration::from_secs(15),
        Error::ConfigKeyNotFound { .. } | Error::EnvVarNotFound { .. } => Duration::from_secs(60),
        Error::Config(_) | Error::Yaml(_) => Duration::from_secs(300),
        _ => Duration::from_secs(30),
    }
}
