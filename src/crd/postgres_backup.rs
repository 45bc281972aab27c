//! PostgresBackup Custom Resource Definition

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::CronJobStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PostgresBackup resource specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "postgres.oso.sh",
    version = "v1alpha1",
    kind = "PostgresBackup",
    plural = "postgresbackups",
    singular = "postgresbackup",
    shortname = "pgbk",
    namespaced,
    status = "PostgresBackupStatus",
    printcolumn = r#"{"name": "Database", "type": "string", "jsonPath": ".spec.databaseRef"}"#,
    printcolumn = r#"{"name": "Schedule", "type": "string", "jsonPath": ".spec.schedule"}"#,
    printcolumn = r#"{"name": "Health", "type": "string", "jsonPath": ".status.health"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresBackupSpec {
    /// Cron schedule in Kubernetes CronJob syntax (e.g., "0 2 * * *")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schedule: String,

    /// Backup image run by the CronJob
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Name of the PostgresDatabase to back up, in the same namespace
    pub database_ref: String,

    /// Database version label handed to the backup image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub database_version: String,

    /// Pre-existing database credentials; generated from the pod when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_secret: Option<SecretRef>,

    /// Object storage target
    #[serde(default)]
    pub storage: ObjectStorageSpec,

    /// Client-side encryption of backup archives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionSpec>,
}

/// Reference to a secret owned by someone else
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Secret name
    pub name: String,

    /// Secret namespace (defaults to the backup's namespace)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Object storage specification
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageSpec {
    /// Bucket name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,

    /// Custom endpoint (for MinIO, Ceph, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Access key ID
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_key_id: String,

    /// Secret access key
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_access_key: String,

    /// Pre-existing storage credentials; wins over the inline fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretRef>,
}

/// Encryption specification
///
/// Encryption is on when `secret` is set, or when all three of
/// `publicKey`, `recipient` and `trustModel` are set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionSpec {
    /// ASCII-armored GPG public key
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_key: String,

    /// Recipient email
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub recipient: String,

    /// GPG trust model (e.g., "always")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trust_model: String,

    /// Pre-existing key secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretRef>,
}

/// Snapshot of a credential secret the backup uses
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretSnapshot {
    pub name: String,
    pub namespace: String,
    /// Secret data rendered as text
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

/// PostgresBackup status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostgresBackupStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_secret: Option<SecretSnapshot>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_secret: Option<SecretSnapshot>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_secret: Option<SecretSnapshot>,

    /// Whether a pod of the target database was found
    #[serde(default)]
    pub pod_found: bool,

    /// Whether the service of the target database was found
    #[serde(default)]
    pub service_found: bool,

    /// Last observed CronJob status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_job: Option<CronJobStatus>,

    /// "OK", or the first problem found
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub health: String,
}
