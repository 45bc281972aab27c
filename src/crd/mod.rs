//! Custom Resource Definitions for the Postgres Operator

mod postgres_backup;
mod postgres_database;

pub use postgres_backup::*;
pub use postgres_database::*;

use kube::CustomResourceExt;

use crate::error::Result;

/// Health string reported when every child is in place
pub const HEALTH_OK: &str = "OK";

/// Generate all CRD YAML manifests
pub fn generate_crds() -> Result<Vec<String>> {
    Ok(vec![
        serde_yaml::to_string(&PostgresDatabase::crd())?,
        serde_yaml::to_string(&PostgresBackup::crd())?,
    ])
}
