//! Resolving env var values of a running pod
//!
//! A value is either inline on the env var or read from a config map key.
//! Anything else is a typed error rather than an empty string.

use k8s_openapi::api::core::v1::{ConfigMap, EnvVar, Pod};
use kube::ResourceExt;

use crate::error::{Error, Result};
use crate::store::ObjectStore;

/// Resolve one env var of `container`, following a config map reference
/// when the inline value is empty
pub async fn resolve_env<S: ObjectStore>(
    store: &S,
    namespace: &str,
    container: &str,
    var: &EnvVar,
) -> Result<String> {
    if let Some(value) = var.value.as_deref().filter(|v| !v.is_empty()) {
        return Ok(value.to_string());
    }

    let Some(selector) = var
        .value_from
        .as_ref()
        .and_then(|source| source.config_map_key_ref.as_ref())
    else {
        return Err(Error::EnvVarNotFound {
            container: container.to_string(),
            name: var.name.clone(),
        });
    };

    let config_map: ConfigMap = store
        .get(&selector.name, namespace)
        .await?
        .ok_or_else(|| {
            Error::dependency(format!(
                "config map {}/{} referenced by {} not found",
                namespace, selector.name, var.name
            ))
        })?;

    config_map
        .data
        .as_ref()
        .and_then(|data| data.get(&selector.key))
        .cloned()
        .ok_or_else(|| Error::ConfigKeyNotFound {
            config_map: format!("{}/{}", namespace, selector.name),
            key: selector.key.clone(),
        })
}

/// Find env var `name` on any container of `pod` and resolve its value
pub async fn resolve_pod_env<S: ObjectStore>(store: &S, pod: &Pod, name: &str) -> Result<String> {
    let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
    let found = pod
        .spec
        .iter()
        .flat_map(|spec| spec.containers.iter())
        .find_map(|container| {
            container
                .env
                .iter()
                .flatten()
                .find(|var| var.name == name)
                .map(|var| (container.name.as_str(), var))
        });

    match found {
        Some((container, var)) => resolve_env(store, &namespace, container, var).await,
        None => Err(Error::EnvVarNotFound {
            container: format!("pod {}", pod.name_any()),
            name: name.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use k8s_openapi::api::core::v1::{ConfigMapKeySelector, Container, EnvVarSource, PodSpec};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn from_config_map(name: &str, config_map: &str, key: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value: None,
            value_from: Some(EnvVarSource {
                config_map_key_ref: Some(ConfigMapKeySelector {
                    name: config_map.to_string(),
                    key: key.to_string(),
                    optional: None,
                }),
                ..Default::default()
            }),
        }
    }

    fn pod(env: Vec<EnvVar>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("db1-abc".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "postgres".to_string(),
                    env: Some(env),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn config_map(name: &str, data: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn inline_value_wins() {
        let store = MemoryStore::new();
        let var = EnvVar {
            name: "POSTGRES_USER".to_string(),
            value: Some("app".to_string()),
            value_from: None,
        };

        let value = resolve_env(&store, "default", "postgres", &var).await.unwrap();
        assert_eq!(value, "app");
    }

    #[tokio::test]
    async fn empty_value_falls_back_to_config_map_key() {
        let store = MemoryStore::new();
        store.insert(config_map("pg-env", &[("POSTGRES_USER", "fromcm")])).unwrap();
        let var = from_config_map("POSTGRES_USER", "pg-env", "POSTGRES_USER");

        let value = resolve_env(&store, "default", "postgres", &var).await.unwrap();
        assert_eq!(value, "fromcm");
    }

    #[tokio::test]
    async fn missing_config_map_key_is_typed_error() {
        let store = MemoryStore::new();
        store.insert(config_map("pg-env", &[])).unwrap();
        let var = from_config_map("POSTGRES_USER", "pg-env", "POSTGRES_USER");

        let err = resolve_env(&store, "default", "postgres", &var).await.unwrap_err();
        assert!(matches!(err, Error::ConfigKeyNotFound { ref key, .. } if key == "POSTGRES_USER"));
    }

    #[tokio::test]
    async fn missing_config_map_is_dependency_error() {
        let store = MemoryStore::new();
        let var = from_config_map("POSTGRES_USER", "absent", "POSTGRES_USER");

        let err = resolve_env(&store, "default", "postgres", &var).await.unwrap_err();
        assert!(matches!(err, Error::DependencyMissing(_)));
    }

    #[tokio::test]
    async fn unset_var_is_not_an_empty_string() {
        let store = MemoryStore::new();
        let pod = pod(vec![EnvVar {
            name: "POSTGRES_DB".to_string(),
            value: Some(String::new()),
            value_from: None,
        }]);

        let empty = resolve_pod_env(&store, &pod, "POSTGRES_DB").await.unwrap_err();
        assert!(matches!(empty, Error::EnvVarNotFound { .. }));
        let absent = resolve_pod_env(&store, &pod, "POSTGRES_PASSWORD").await.unwrap_err();
        assert!(matches!(absent, Error::EnvVarNotFound { ref name, .. } if name == "POSTGRES_PASSWORD"));
    }
}
