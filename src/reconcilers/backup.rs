//! PostgresBackup reconciler
//!
//! A backup depends on a running database: its pod and service are located
//! by label before anything else happens, because the database credentials
//! are assembled from the pod's environment and the service's address.
//!
//! Owned children:
//! - database, object storage and (optional) encryption key secrets, unless
//!   the spec names pre-existing ones, which are only read
//! - the CronJob running the backup image

use std::sync::Arc;

use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{Pod, Secret, Service};
use kube::ResourceExt;
use tracing::{info, instrument, warn};

use super::env::resolve_pod_env;
use super::status::sync_status;
use super::{ensure, Outcome};
use crate::adapters::{
    build_cron_job, build_database_secret, build_encryption_secret, build_storage_secret, labels,
    service_host, snapshot, CredentialRole, CredentialTarget, DatabaseCredentials,
    EncryptionConfig,
};
use crate::config::OperatorConfig;
use crate::crd::{PostgresBackup, PostgresDatabase, SecretSnapshot, HEALTH_OK};
use crate::error::{Error, Result};
use crate::metrics;
use crate::store::ObjectStore;

/// What was found of the target database
#[derive(Debug, Default)]
struct Dependencies {
    database: Option<PostgresDatabase>,
    pod: Option<Pod>,
    service: Option<Service>,
}

/// The target database's pod and service, both present
#[derive(Debug)]
struct ResolvedDatabase {
    pod: Pod,
    service: Service,
}

impl Dependencies {
    /// Require pod and service, or describe the first thing missing
    fn require(self, database_ref: &str, namespace: &str) -> std::result::Result<ResolvedDatabase, String> {
        if self.database.is_none() {
            return Err(format!("PostgresDatabase {}/{} not found", namespace, database_ref));
        }
        let Some(pod) = self.pod else {
            return Err(format!("no pod found for PostgresDatabase {}/{}", namespace, database_ref));
        };
        let Some(service) = self.service else {
            return Err(format!("no service found for PostgresDatabase {}/{}", namespace, database_ref));
        };
        Ok(ResolvedDatabase { pod, service })
    }
}

/// Credential secrets in use for one pass
struct Credentials {
    database: (CredentialTarget, Secret),
    storage: (CredentialTarget, Secret),
    encryption: Option<(CredentialTarget, Secret)>,
}

/// Reconciles PostgresBackup objects against an [`ObjectStore`]
pub struct BackupReconciler<S> {
    store: Arc<S>,
    config: Arc<OperatorConfig>,
}

impl<S: ObjectStore> BackupReconciler<S> {
    pub fn new(store: Arc<S>, config: Arc<OperatorConfig>) -> Self {
        Self { store, config }
    }

    /// Run one reconcile pass for the backup `name` in `namespace`
    #[instrument(skip(self))]
    pub async fn reconcile(&self, name: &str, namespace: &str) -> Result<Outcome> {
        let Some(mut backup) = self.store.get::<PostgresBackup>(name, namespace).await? else {
            info!("PostgresBackup not found, nothing to reconcile");
            return Ok(Outcome::Deleted);
        };
        self.config.defaults.apply_backup_defaults(&mut backup.spec);

        let dependencies = self.find_dependencies(&backup, namespace).await?;
        let pod_found = dependencies.pod.is_some();
        let service_found = dependencies.service.is_some();
        let found = (pod_found, service_found);
        let resolved = match dependencies.require(&backup.spec.database_ref, namespace) {
            Ok(resolved) => resolved,
            Err(problem) => {
                warn!(problem = %problem, "Backup dependencies missing");
                self.record_failure(name, namespace, found, problem.clone()).await?;
                return Err(Error::dependency(problem));
            }
        };

        let encryption = EncryptionConfig::from_backup(&backup);
        if let Some(problem) = encryption.problem() {
            warn!(problem = %problem, "Encryption partially configured, skipping encryption key");
        }
        let credentials = match self.ensure_credentials(&backup, &resolved, &encryption).await {
            Ok(credentials) => credentials,
            Err(error) => {
                if let Some(problem) = health_message(&error) {
                    warn!(problem = %problem, "Backup credentials unresolved");
                    self.record_failure(name, namespace, found, problem).await?;
                }
                return Err(error);
            }
        };

        let mut targets = vec![&credentials.database.0, &credentials.storage.0];
        if let Some((target, _)) = &credentials.encryption {
            targets.push(target);
        }
        let config = self.config.as_ref();
        let cron_job: CronJob = ensure(self.store.as_ref(), name, namespace, || {
            build_cron_job(&backup, &targets, config)
        })
        .await?;

        let health = self.validate(&backup, namespace, &credentials, &encryption).await?;
        self.update_status(name, namespace, &credentials, found, cron_job, health)
            .await?;

        Ok(Outcome::Reconciled)
    }

    /// Look up the target database and, when it exists, its pod and service
    async fn find_dependencies(&self, backup: &PostgresBackup, namespace: &str) -> Result<Dependencies> {
        let database_ref = &backup.spec.database_ref;
        let Some(database) = self
            .store
            .get::<PostgresDatabase>(database_ref, namespace)
            .await?
        else {
            return Ok(Dependencies::default());
        };

        let selector = labels(&self.config.defaults.product, database_ref);
        let pods: Vec<Pod> = self.store.list(namespace, &selector).await?;
        let services: Vec<Service> = self.store.list(namespace, &selector).await?;

        // Prefer a running pod; any pod still carries the env to read
        let running = pods.iter().position(|pod| {
            pod.status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                == Some("Running")
        });
        let pod = match running {
            Some(index) => pods.into_iter().nth(index),
            None => pods.into_iter().next(),
        };

        Ok(Dependencies {
            database: Some(database),
            pod,
            service: services.into_iter().next(),
        })
    }

    /// Resolve each credential role to a secret, creating generated ones
    async fn ensure_credentials(
        &self,
        backup: &PostgresBackup,
        resolved: &ResolvedDatabase,
        encryption: &EncryptionConfig,
    ) -> Result<Credentials> {
        let product = &self.config.defaults.product;

        let target = CredentialTarget::resolve(
            CredentialRole::Database,
            backup,
            backup.spec.database_secret.as_ref(),
        );
        let secret = match self.existing_secret(&target).await? {
            Some(secret) => secret,
            None => {
                let credentials = self.database_credentials(backup, resolved).await?;
                self.create_secret(build_database_secret(backup, &target, product, credentials))
                    .await?
            }
        };
        let database = (target, secret);

        let target = CredentialTarget::resolve(
            CredentialRole::ObjectStorage,
            backup,
            backup.spec.storage.secret.as_ref(),
        );
        let secret = match self.existing_secret(&target).await? {
            Some(secret) => secret,
            None => {
                self.create_secret(build_storage_secret(backup, &target, product))
                    .await?
            }
        };
        let storage = (target, secret);

        let encryption_key = match encryption {
            EncryptionConfig::Existing(secret_ref) => {
                let target =
                    CredentialTarget::resolve(CredentialRole::EncryptionKey, backup, Some(secret_ref));
                let secret = self.require_secret(&target).await?;
                Some((target, secret))
            }
            EncryptionConfig::Inline(key) => {
                let target = CredentialTarget::resolve(CredentialRole::EncryptionKey, backup, None);
                let secret = match self.existing_secret(&target).await? {
                    Some(secret) => secret,
                    None => {
                        self.create_secret(build_encryption_secret(backup, &target, product, key))
                            .await?
                    }
                };
                Some((target, secret))
            }
            EncryptionConfig::Disabled | EncryptionConfig::Partial(_) => None,
        };

        Ok(Credentials {
            database,
            storage,
            encryption: encryption_key,
        })
    }

    /// Fetch the secret for a target. A user-named secret must exist; a
    /// generated one may not exist yet.
    async fn existing_secret(&self, target: &CredentialTarget) -> Result<Option<Secret>> {
        if !target.owned {
            return self.require_secret(target).await.map(Some);
        }
        self.store.get::<Secret>(&target.name, &target.namespace).await
    }

    async fn require_secret(&self, target: &CredentialTarget) -> Result<Secret> {
        self.store
            .get::<Secret>(&target.name, &target.namespace)
            .await?
            .ok_or_else(|| Error::dependency(missing_secret(target)))
    }

    async fn create_secret(&self, secret: Secret) -> Result<Secret> {
        let created = self.store.create(&secret).await?;
        info!(name = %created.name_any(), "Created credentials secret");
        metrics::CHILDREN_CREATED.with_label_values(&["Secret"]).inc();
        Ok(created)
    }

    /// Assemble database credentials from the pod's env and the service
    async fn database_credentials(
        &self,
        backup: &PostgresBackup,
        resolved: &ResolvedDatabase,
    ) -> Result<DatabaseCredentials> {
        let defaults = &self.config.defaults;
        let store = self.store.as_ref();
        let pod = &resolved.pod;

        let user = resolve_pod_env(store, pod, &defaults.user_env).await?;
        let password = resolve_pod_env(store, pod, &defaults.password_env).await?;
        let database = resolve_pod_env(store, pod, &defaults.database_env).await?;

        let service = &resolved.service;
        let namespace = service.namespace().unwrap_or_else(|| "default".to_string());
        let port = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .and_then(|ports| ports.first())
            .map(|port| port.port)
            .unwrap_or(defaults.port);

        Ok(DatabaseCredentials {
            host: service_host(&service.name_any(), &namespace),
            port,
            user,
            password,
            database,
            version: backup.spec.database_version.clone(),
        })
    }

    /// Re-check every dependency; the first failure becomes the health
    /// message
    async fn validate(
        &self,
        backup: &PostgresBackup,
        namespace: &str,
        credentials: &Credentials,
        encryption: &EncryptionConfig,
    ) -> Result<String> {
        let dependencies = self.find_dependencies(backup, namespace).await?;
        if let Err(problem) = dependencies.require(&backup.spec.database_ref, namespace) {
            return Ok(problem);
        }

        for target in [&credentials.database.0, &credentials.storage.0] {
            if !self.secret_exists(target).await? {
                return Ok(missing_secret(target));
            }
        }

        if let Some(problem) = encryption.problem() {
            return Ok(problem);
        }
        if let Some((target, _)) = &credentials.encryption {
            if !self.secret_exists(target).await? {
                return Ok(missing_secret(target));
            }
        }

        let name = backup.name_any();
        if self.store.get::<CronJob>(&name, namespace).await?.is_none() {
            return Ok(format!("CronJob {}/{} not found", namespace, name));
        }

        Ok(HEALTH_OK.to_string())
    }

    async fn secret_exists(&self, target: &CredentialTarget) -> Result<bool> {
        Ok(self
            .store
            .get::<Secret>(&target.name, &target.namespace)
            .await?
            .is_some())
    }

    /// Record dependency flags and a failure message as health
    async fn record_failure(
        &self,
        name: &str,
        namespace: &str,
        (pod_found, service_found): (bool, bool),
        problem: String,
    ) -> Result<()> {
        sync_status::<_, PostgresBackup, _>(self.store.as_ref(), name, namespace, |sync| {
            sync.set("podFound", |s| &mut s.pod_found, pod_found);
            sync.set("serviceFound", |s| &mut s.service_found, service_found);
            sync.set("health", |s| &mut s.health, problem);
        })
        .await?;
        Ok(())
    }

    /// Mirror credentials, dependency flags and CronJob status onto the
    /// backup
    async fn update_status(
        &self,
        name: &str,
        namespace: &str,
        credentials: &Credentials,
        (pod_found, service_found): (bool, bool),
        cron_job: CronJob,
        health: String,
    ) -> Result<()> {
        let database: Option<SecretSnapshot> = Some(snapshot(&credentials.database.1));
        let storage = Some(snapshot(&credentials.storage.1));
        let encryption = credentials.encryption.as_ref().map(|(_, secret)| snapshot(secret));
        let cron_job_status = cron_job.status;

        sync_status::<_, PostgresBackup, _>(self.store.as_ref(), name, namespace, |sync| {
            sync.set("databaseSecret", |s| &mut s.database_secret, database);
            sync.set("storageSecret", |s| &mut s.storage_secret, storage);
            sync.set("encryptionSecret", |s| &mut s.encryption_secret, encryption);
            sync.set("podFound", |s| &mut s.pod_found, pod_found);
            sync.set("serviceFound", |s| &mut s.service_found, service_found);
            sync.set("cronJob", |s| &mut s.cron_job, cron_job_status);
            sync.set("health", |s| &mut s.health, health);
        })
        .await?;
        Ok(())
    }
}

fn missing_secret(target: &CredentialTarget) -> String {
    format!(
        "{} secret {}/{} not found",
        target.role.describe(),
        target.namespace,
        target.name
    )
}

/// Health message for failures a user can fix; store failures have none
fn health_message(error: &Error) -> Option<String> {
    match error {
        Error::DependencyMissing(problem) => Some(problem.clone()),
        Error::ConfigKeyNotFound { .. } | Error::EnvVarNotFound { .. } => Some(error.to_string()),
        _ => None,
    }
}
