//! Credential secrets used by the backup job
//!
//! A backup needs three kinds of credentials. Each either lives in a secret
//! the user names in the spec (read-only for the operator) or in a secret
//! the operator generates under a deterministic name and owns.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::ResourceExt;

use super::{backup_labels, child_meta, set_owner};
use crate::crd::{PostgresBackup, SecretRef, SecretSnapshot};

/// The credential secrets a backup can depend on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialRole {
    Database,
    ObjectStorage,
    EncryptionKey,
}

impl CredentialRole {
    /// Name prefix of generated secrets
    pub fn prefix(self) -> &'static str {
        match self {
            CredentialRole::Database => "db-credentials-",
            CredentialRole::ObjectStorage => "storage-credentials-",
            CredentialRole::EncryptionKey => "encryption-key-",
        }
    }

    /// Prefix of the env vars that point the backup image at the secret
    pub fn env_prefix(self) -> &'static str {
        match self {
            CredentialRole::Database => "DATABASE_SECRET",
            CredentialRole::ObjectStorage => "STORAGE_SECRET",
            CredentialRole::EncryptionKey => "ENCRYPTION_SECRET",
        }
    }

    /// Human-readable name used in health messages
    pub fn describe(self) -> &'static str {
        match self {
            CredentialRole::Database => "database credentials",
            CredentialRole::ObjectStorage => "object storage credentials",
            CredentialRole::EncryptionKey => "encryption key",
        }
    }

    /// Deterministic name of the generated secret for a backup
    pub fn secret_name(self, backup_name: &str) -> String {
        format!("{}{}", self.prefix(), backup_name)
    }
}

/// Where a role's secret lives and whether the operator owns it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialTarget {
    pub role: CredentialRole,
    pub name: String,
    pub namespace: String,
    /// False when the user named a pre-existing secret
    pub owned: bool,
}

impl CredentialTarget {
    /// A user-named secret wins over generation; its namespace defaults to
    /// the backup's own
    pub fn resolve(role: CredentialRole, backup: &PostgresBackup, existing: Option<&SecretRef>) -> Self {
        let namespace = backup.namespace().unwrap_or_else(|| "default".to_string());
        match existing {
            Some(secret) => Self {
                role,
                name: secret.name.clone(),
                namespace: secret.namespace.clone().unwrap_or(namespace),
                owned: false,
            },
            None => Self {
                role,
                name: role.secret_name(&backup.name_any()),
                namespace,
                owned: true,
            },
        }
    }
}

/// Inline encryption key material
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionKey {
    pub public_key: String,
    pub recipient: String,
    pub trust_model: String,
}

/// Encryption settings after applying the all-or-nothing rule
#[derive(Clone, Debug, PartialEq)]
pub enum EncryptionConfig {
    /// No encryption field set
    Disabled,
    /// The user named a key secret
    Existing(SecretRef),
    /// All three inline fields set
    Inline(EncryptionKey),
    /// Some inline fields set; lists the missing ones
    Partial(Vec<&'static str>),
}

impl EncryptionConfig {
    pub fn from_backup(backup: &PostgresBackup) -> Self {
        let Some(encryption) = &backup.spec.encryption else {
            return EncryptionConfig::Disabled;
        };
        if let Some(secret) = &encryption.secret {
            return EncryptionConfig::Existing(secret.clone());
        }

        let fields = [
            ("publicKey", &encryption.public_key),
            ("recipient", &encryption.recipient),
            ("trustModel", &encryption.trust_model),
        ];
        let missing: Vec<&'static str> = fields
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(field, _)| *field)
            .collect();

        match missing.len() {
            0 => EncryptionConfig::Inline(EncryptionKey {
                public_key: encryption.public_key.clone(),
                recipient: encryption.recipient.clone(),
                trust_model: encryption.trust_model.clone(),
            }),
            3 => EncryptionConfig::Disabled,
            _ => EncryptionConfig::Partial(missing),
        }
    }

    /// Health message for a partial configuration
    pub fn problem(&self) -> Option<String> {
        match self {
            EncryptionConfig::Partial(missing) => Some(format!(
                "encryption needs publicKey, recipient and trustModel together; missing {}",
                missing.join(", ")
            )),
            _ => None,
        }
    }
}

/// Connection details assembled for the database credential secret
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub host: String,
    pub port: i32,
    pub user: String,
    pub password: String,
    pub database: String,
    pub version: String,
}

impl DatabaseCredentials {
    fn into_data(self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("PGHOST".to_string(), self.host),
            ("PGPORT".to_string(), self.port.to_string()),
            ("PGUSER".to_string(), self.user),
            ("PGPASSWORD".to_string(), self.password),
            ("PGDATABASE".to_string(), self.database),
            ("SUPERUSER".to_string(), "false".to_string()),
            ("PG_VERSION".to_string(), self.version),
        ])
    }
}

/// DNS name clients use to reach a service
pub fn service_host(service_name: &str, namespace: &str) -> String {
    format!("{}.{}.svc", service_name, namespace)
}

fn build_secret(
    backup: &PostgresBackup,
    target: &CredentialTarget,
    product: &str,
    data: BTreeMap<String, String>,
) -> Secret {
    let mut secret = Secret {
        metadata: child_meta(
            &target.name,
            &target.namespace,
            backup_labels(product, &backup.name_any()),
        ),
        data: Some(
            data.into_iter()
                .map(|(k, v)| (k, ByteString(v.into_bytes())))
                .collect(),
        ),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    };
    set_owner(&mut secret, backup);
    secret
}

/// Secret with the connection details of the database to back up
pub fn build_database_secret(
    backup: &PostgresBackup,
    target: &CredentialTarget,
    product: &str,
    credentials: DatabaseCredentials,
) -> Secret {
    build_secret(backup, target, product, credentials.into_data())
}

/// Secret with the object storage credentials, copied from the spec
pub fn build_storage_secret(backup: &PostgresBackup, target: &CredentialTarget, product: &str) -> Secret {
    let storage = &backup.spec.storage;
    let mut data = BTreeMap::from([
        ("BUCKET_NAME".to_string(), storage.bucket.clone()),
        ("AWS_ACCESS_KEY_ID".to_string(), storage.access_key_id.clone()),
        ("AWS_SECRET_ACCESS_KEY".to_string(), storage.secret_access_key.clone()),
    ]);
    if let Some(endpoint) = &storage.endpoint {
        data.insert("S3_ENDPOINT".to_string(), endpoint.clone());
    }
    build_secret(backup, target, product, data)
}

/// Secret with inline encryption key material
pub fn build_encryption_secret(
    backup: &PostgresBackup,
    target: &CredentialTarget,
    product: &str,
    key: &EncryptionKey,
) -> Secret {
    let data = BTreeMap::from([
        ("GPG_PUBLIC_KEY".to_string(), key.public_key.clone()),
        ("GPG_RECIPIENT".to_string(), key.recipient.clone()),
        ("GPG_TRUST_MODEL".to_string(), key.trust_model.clone()),
    ]);
    build_secret(backup, target, product, data)
}

/// Snapshot of a secret for the backup status, data rendered as text
pub fn snapshot(secret: &Secret) -> SecretSnapshot {
    let mut data: BTreeMap<String, String> = secret
        .data
        .iter()
        .flatten()
        .map(|(k, v)| (k.clone(), String::from_utf8_lossy(&v.0).into_owned()))
        .collect();
    if let Some(string_data) = &secret.string_data {
        data.extend(string_data.clone());
    }
    SecretSnapshot {
        name: secret.name_any(),
        namespace: secret.namespace().unwrap_or_default(),
        data,
    }
}
