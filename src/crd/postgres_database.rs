//! PostgresDatabase Custom Resource Definition

use k8s_openapi::api::apps::v1::DeploymentStatus;
use k8s_openapi::api::core::v1::{PersistentVolumeClaimStatus, ServiceStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PostgresDatabase resource specification
///
/// Empty fields are filled from the operator's defaults table on every
/// reconcile; the stored object is never rewritten with those values.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "postgres.oso.sh",
    version = "v1alpha1",
    kind = "PostgresDatabase",
    plural = "postgresdatabases",
    singular = "postgresdatabase",
    shortname = "pgdb",
    namespaced,
    status = "PostgresDatabaseStatus",
    printcolumn = r#"{"name": "Health", "type": "string", "jsonPath": ".status.health"}"#,
    printcolumn = r#"{"name": "Replicas", "type": "integer", "jsonPath": ".spec.replicas"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresDatabaseSpec {
    /// Container image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Number of database pods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Container resource limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceLimitsSpec>,

    /// Size of the data volume claim (e.g., "10Gi")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_size: String,

    /// Storage class for the data volume claim
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Name of the database created on first start
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database_name: String,

    /// Superuser name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,

    /// Superuser password
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// Config map holding the credential env vars instead of inline values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_map_name: Option<String>,

    /// Port the database listens on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

/// Container resource limits
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimitsSpec {
    /// CPU limit (e.g., "500m")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpu: String,

    /// Memory limit (e.g., "1Gi")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub memory: String,
}

/// PostgresDatabase status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostgresDatabaseStatus {
    /// Last observed Deployment status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentStatus>,

    /// Last observed Service status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceStatus>,

    /// Last observed PersistentVolumeClaim status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimStatus>,

    /// "OK", or the first problem found
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub health: String,
}
