//! Operator configuration
//!
//! Holds the defaults table used to fill empty spec fields, plus the few
//! settings the operator process itself needs. The configuration is loaded
//! once at start-up and handed to each reconciler.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crd::{PostgresBackupSpec, PostgresDatabaseSpec, ResourceLimitsSpec};
use crate::error::{Error, Result};

/// Env var naming an optional YAML configuration file
pub const CONFIG_PATH_ENV: &str = "POSTGRES_OPERATOR_CONFIG";

/// Top-level operator configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Values used for empty spec fields
    pub defaults: Defaults,

    /// Seconds between periodic re-reconciles of a healthy object
    pub resync_interval_secs: u64,

    /// Port for the metrics and health endpoints
    pub metrics_port: u16,

    /// Service account the backup CronJob pods run as
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_service_account: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            defaults: Defaults::default(),
            resync_interval_secs: 300,
            metrics_port: 8080,
            backup_service_account: None,
        }
    }
}

/// Static defaults table
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Defaults {
    /// Product name, used as the `app` label
    pub product: String,
    pub database_image: String,
    pub backup_image: String,
    pub replicas: i32,
    pub cpu_limit: String,
    pub memory_limit: String,
    pub storage_size: String,
    pub database_name: String,
    pub user: String,
    pub password: String,
    pub port: i32,
    /// Env var carrying the database user in the workload
    pub user_env: String,
    /// Env var carrying the database password in the workload
    pub password_env: String,
    /// Env var carrying the database name in the workload
    pub database_env: String,
    pub schedule: String,
    pub database_version: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            product: "postgres".to_string(),
            database_image: "postgres:14".to_string(),
            backup_image: "ghcr.io/osodevops/postgres-backup:latest".to_string(),
            replicas: 1,
            cpu_limit: "1".to_string(),
            memory_limit: "1Gi".to_string(),
            storage_size: "10Gi".to_string(),
            database_name: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            port: 5432,
            user_env: "POSTGRES_USER".to_string(),
            password_env: "POSTGRES_PASSWORD".to_string(),
            database_env: "POSTGRES_DB".to_string(),
            schedule: "0 2 * * *".to_string(),
            database_version: "14".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Load from the file named by `POSTGRES_OPERATOR_CONFIG`, or use the
    /// built-in values when the variable is unset
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(path),
            None => {
                info!("No {} set, using built-in defaults", CONFIG_PATH_ENV);
                Ok(Self::default())
            }
        }
    }

    /// Load from a YAML file; missing fields keep their built-in values
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: OperatorConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded operator configuration");
        Ok(config)
    }

    /// Reject values the reconcilers cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.resync_interval_secs == 0 {
            return Err(Error::config("resyncIntervalSecs must be greater than zero"));
        }
        let defaults = &self.defaults;
        if defaults.product.is_empty() {
            return Err(Error::config("defaults.product must not be empty"));
        }
        if defaults.replicas < 0 {
            return Err(Error::config(format!(
                "defaults.replicas must not be negative, got {}",
                defaults.replicas
            )));
        }
        let env_names = [
            ("userEnv", &defaults.user_env),
            ("passwordEnv", &defaults.password_env),
            ("databaseEnv", &defaults.database_env),
        ];
        if let Some((field, _)) = env_names.iter().find(|(_, name)| name.is_empty()) {
            return Err(Error::config(format!("defaults.{} must not be empty", field)));
        }
        Ok(())
    }
}

fn fill(field: &mut String, default: &str) {
    if field.is_empty() {
        *field = default.to_string();
    }
}

impl Defaults {
    /// Fill every empty database spec field
    pub fn apply_database_defaults(&self, spec: &mut PostgresDatabaseSpec) {
        fill(&mut spec.image, &self.database_image);
        if spec.replicas.is_none() {
            spec.replicas = Some(self.replicas);
        }
        let resources = spec.resources.get_or_insert_with(ResourceLimitsSpec::default);
        fill(&mut resources.cpu, &self.cpu_limit);
        fill(&mut resources.memory, &self.memory_limit);
        fill(&mut spec.storage_size, &self.storage_size);
        // Credentials come from the config map when one is named
        if spec.config_map_name.is_none() {
            fill(&mut spec.database_name, &self.database_name);
            fill(&mut spec.user, &self.user);
            fill(&mut spec.password, &self.password);
        }
        if spec.port.is_none() {
            spec.port = Some(self.port);
        }
    }

    /// Fill every empty backup spec field
    pub fn apply_backup_defaults(&self, spec: &mut PostgresBackupSpec) {
        fill(&mut spec.schedule, &self.schedule);
        fill(&mut spec.image, &self.backup_image);
        fill(&mut spec.database_version, &self.database_version);
    }
}
