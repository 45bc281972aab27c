//! Deployment, Service and PersistentVolumeClaim for a PostgresDatabase

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapKeySelector, Container, ContainerPort, EnvVar, EnvVarSource, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec,
    ResourceRequirements, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use super::{child_meta, labels, set_owner};
use crate::config::Defaults;
use crate::crd::PostgresDatabase;

/// Name of the database container in the workload pod
pub const DATABASE_CONTAINER: &str = "postgres";

const DATA_VOLUME: &str = "data";
const DATA_PATH: &str = "/var/lib/postgresql/data";

fn port(db: &PostgresDatabase, defaults: &Defaults) -> i32 {
    db.spec.port.unwrap_or(defaults.port)
}

fn namespace(db: &PostgresDatabase) -> String {
    db.namespace().unwrap_or_else(|| "default".to_string())
}

/// Credential env vars: inline values, or keys of the named config map
pub fn database_env(db: &PostgresDatabase, defaults: &Defaults) -> Vec<EnvVar> {
    let vars = [
        (&defaults.user_env, &db.spec.user),
        (&defaults.password_env, &db.spec.password),
        (&defaults.database_env, &db.spec.database_name),
    ];

    vars.into_iter()
        .map(|(name, value)| match &db.spec.config_map_name {
            Some(config_map) => EnvVar {
                name: name.clone(),
                value: None,
                value_from: Some(EnvVarSource {
                    config_map_key_ref: Some(ConfigMapKeySelector {
                        name: config_map.clone(),
                        key: name.clone(),
                        optional: None,
                    }),
                    ..Default::default()
                }),
            },
            None => EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                value_from: None,
            },
        })
        .collect()
}

/// Build the database Deployment
pub fn build_deployment(db: &PostgresDatabase, defaults: &Defaults) -> Deployment {
    let name = db.name_any();
    let labels = labels(&defaults.product, &name);
    let resources = db.spec.resources.clone().unwrap_or_default();

    let mut limits = BTreeMap::new();
    if !resources.cpu.is_empty() {
        limits.insert("cpu".to_string(), Quantity(resources.cpu));
    }
    if !resources.memory.is_empty() {
        limits.insert("memory".to_string(), Quantity(resources.memory));
    }

    let container = Container {
        name: DATABASE_CONTAINER.to_string(),
        image: Some(db.spec.image.clone()),
        ports: Some(vec![ContainerPort {
            name: Some(defaults.product.clone()),
            container_port: port(db, defaults),
            ..Default::default()
        }]),
        env: Some(database_env(db, defaults)),
        resources: Some(ResourceRequirements {
            limits: Some(limits),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let mut deployment = Deployment {
        metadata: child_meta(&name, &namespace(db), labels.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(db.spec.replicas.unwrap_or(defaults.replicas)),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: DATA_VOLUME.to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: name.clone(),
                            read_only: None,
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };
    set_owner(&mut deployment, db);
    deployment
}

/// Build the Service exposing the database port
pub fn build_service(db: &PostgresDatabase, defaults: &Defaults) -> Service {
    let name = db.name_any();
    let labels = labels(&defaults.product, &name);
    let port = port(db, defaults);

    let mut service = Service {
        metadata: child_meta(&name, &namespace(db), labels.clone()),
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                name: Some(defaults.product.clone()),
                port,
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    set_owner(&mut service, db);
    service
}

/// Build the data volume claim
pub fn build_volume_claim(db: &PostgresDatabase, defaults: &Defaults) -> PersistentVolumeClaim {
    let name = db.name_any();
    let size = if db.spec.storage_size.is_empty() {
        defaults.storage_size.clone()
    } else {
        db.spec.storage_size.clone()
    };

    let mut claim = PersistentVolumeClaim {
        metadata: child_meta(&name, &namespace(db), labels(&defaults.product, &name)),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: db.spec.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), Quantity(size))])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };
    set_owner(&mut claim, db);
    claim
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::PostgresDatabaseSpec;

    fn database(spec: PostgresDatabaseSpec) -> PostgresDatabase {
        let defaults = Defaults::default();
        let mut db = PostgresDatabase::new("db1", spec);
        db.metadata.namespace = Some("team-a".to_string());
        db.metadata.uid = Some("uid-1".to_string());
        defaults.apply_database_defaults(&mut db.spec);
        db
    }

    #[test]
    fn deployment_carries_replicas_labels_and_owner() {
        let defaults = Defaults::default();
        let db = database(PostgresDatabaseSpec {
            replicas: Some(2),
            ..Default::default()
        });

        let deployment = build_deployment(&db, &defaults);

        assert_eq!(deployment.metadata.name.as_deref(), Some("db1"));
        assert_eq!(deployment.metadata.namespace.as_deref(), Some("team-a"));
        assert_eq!(deployment.metadata.owner_references.as_ref().map(Vec::len), Some(1));
        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(2));
        assert_eq!(spec.selector.match_labels, Some(labels("postgres", "db1")));
        let pod = spec.template.spec.unwrap();
        let container = &pod.containers[0];
        assert_eq!(container.image.as_deref(), Some("postgres:14"));
        let limits = container.resources.as_ref().unwrap().limits.as_ref().unwrap();
        assert_eq!(limits.get("memory"), Some(&Quantity("1Gi".to_string())));
        let claim = pod.volumes.unwrap()[0].persistent_volume_claim.clone().unwrap();
        assert_eq!(claim.claim_name, "db1");
    }

    #[test]
    fn inline_credentials_become_plain_env_values() {
        let defaults = Defaults::default();
        let db = database(PostgresDatabaseSpec {
            database_name: "app".to_string(),
            ..Default::default()
        });

        let env = database_env(&db, &defaults);

        let db_var = env.iter().find(|v| v.name == "POSTGRES_DB").unwrap();
        assert_eq!(db_var.value.as_deref(), Some("app"));
        assert!(env.iter().all(|v| v.value_from.is_none()));
    }

    #[test]
    fn config_map_credentials_become_key_references() {
        let defaults = Defaults::default();
        let db = database(PostgresDatabaseSpec {
            config_map_name: Some("pg-env".to_string()),
            ..Default::default()
        });

        let env = database_env(&db, &defaults);

        assert_eq!(env.len(), 3);
        for var in &env {
            assert!(var.value.is_none());
            let selector = var
                .value_from
                .as_ref()
                .and_then(|s| s.config_map_key_ref.as_ref())
                .unwrap();
            assert_eq!(selector.name, "pg-env");
            assert_eq!(selector.key, var.name);
        }
    }

    #[test]
    fn service_targets_database_port() {
        let defaults = Defaults::default();
        let db = database(PostgresDatabaseSpec {
            port: Some(6432),
            ..Default::default()
        });

        let service = build_service(&db, &defaults);

        let spec = service.spec.unwrap();
        assert_eq!(spec.selector, Some(labels("postgres", "db1")));
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.port, 6432);
        assert_eq!(port.target_port, Some(IntOrString::Int(6432)));
    }

    #[test]
    fn volume_claim_requests_storage_size() {
        let defaults = Defaults::default();
        let db = database(PostgresDatabaseSpec {
            storage_size: "50Gi".to_string(),
            storage_class_name: Some("fast".to_string()),
            ..Default::default()
        });

        let claim = build_volume_claim(&db, &defaults);

        let spec = claim.spec.unwrap();
        assert_eq!(spec.storage_class_name.as_deref(), Some("fast"));
        let requests = spec.resources.unwrap().requests.unwrap();
        assert_eq!(requests.get("storage"), Some(&Quantity("50Gi".to_string())));
    }
}
