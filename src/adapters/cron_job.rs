//! Backup CronJob

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use kube::api::ObjectMeta;
use kube::ResourceExt;

use super::{backup_labels, child_meta, set_owner, CredentialTarget};
use crate::config::OperatorConfig;
use crate::crd::PostgresBackup;

/// Name of the container running the backup image
pub const BACKUP_CONTAINER: &str = "backup";

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

/// Env vars telling the backup image which secrets to read
pub fn credential_env(targets: &[&CredentialTarget]) -> Vec<EnvVar> {
    targets
        .iter()
        .flat_map(|target| {
            let prefix = target.role.env_prefix();
            [
                env(&format!("{}_NAME", prefix), &target.name),
                env(&format!("{}_NAMESPACE", prefix), &target.namespace),
            ]
        })
        .collect()
}

/// Build the CronJob that runs the backup image on schedule
///
/// `credentials` holds the database and storage targets, plus the
/// encryption target when encryption is configured.
pub fn build_cron_job(
    backup: &PostgresBackup,
    credentials: &[&CredentialTarget],
    config: &OperatorConfig,
) -> CronJob {
    let name = backup.name_any();
    let namespace = backup.namespace().unwrap_or_else(|| "default".to_string());
    let labels = backup_labels(&config.defaults.product, &name);

    let mut vars = vec![
        env("PRODUCT", &config.defaults.product),
        env("SCHEDULE", &backup.spec.schedule),
        env("DATABASE_VERSION", &backup.spec.database_version),
    ];
    vars.extend(credential_env(credentials));

    let mut cron_job = CronJob {
        metadata: child_meta(&name, &namespace, labels.clone()),
        spec: Some(CronJobSpec {
            schedule: backup.spec.schedule.clone(),
            concurrency_policy: Some("Forbid".to_string()),
            failed_jobs_history_limit: Some(3),
            successful_jobs_history_limit: Some(5),
            job_template: JobTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.clone()),
                    ..Default::default()
                }),
                spec: Some(JobSpec {
                    template: PodTemplateSpec {
                        metadata: Some(ObjectMeta {
                            labels: Some(labels),
                            ..Default::default()
                        }),
                        spec: Some(PodSpec {
                            containers: vec![Container {
                                name: BACKUP_CONTAINER.to_string(),
                                image: Some(backup.spec.image.clone()),
                                env: Some(vars),
                                ..Default::default()
                            }],
                            restart_policy: Some("Never".to_string()),
                            service_account_name: config.backup_service_account.clone(),
                            ..Default::default()
                        }),
                    },
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };
    set_owner(&mut cron_job, backup);
    cron_job
}
