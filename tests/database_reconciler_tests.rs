//! Integration tests for the PostgresDatabase reconciler
//!
//! These tests drive the reconciler against the in-memory store and check
//! child creation, replica drift correction and status aggregation.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service, ServicePort, ServiceSpec};
use kube::api::ObjectMeta;
use postgres_operator::config::OperatorConfig;
use postgres_operator::crd::{PostgresDatabase, PostgresDatabaseSpec, HEALTH_OK};
use postgres_operator::reconcilers::{DatabaseReconciler, Outcome};
use postgres_operator::store::{MemoryStore, ObjectStore};
use postgres_operator::Error;
use serde_json::json;

// ============================================================================
// Test Helpers
// ============================================================================

const NAMESPACE: &str = "default";

fn database(name: &str, spec: PostgresDatabaseSpec) -> PostgresDatabase {
    let mut db = PostgresDatabase::new(name, spec);
    db.metadata.namespace = Some(NAMESPACE.to_string());
    db
}

fn setup(spec: PostgresDatabaseSpec) -> (Arc<MemoryStore>, DatabaseReconciler<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.insert(database("db1", spec)).unwrap();
    let reconciler = DatabaseReconciler::new(store.clone(), Arc::new(OperatorConfig::default()));
    (store, reconciler)
}

fn app_spec() -> PostgresDatabaseSpec {
    PostgresDatabaseSpec {
        replicas: Some(1),
        database_name: "app".to_string(),
        ..Default::default()
    }
}

async fn live_replicas(store: &MemoryStore) -> Option<i32> {
    let deployment: Deployment = store.get("db1", NAMESPACE).await.unwrap().unwrap();
    deployment.spec.and_then(|s| s.replicas)
}

// ============================================================================
// Child Creation
// ============================================================================

#[tokio::test]
async fn reconcile_creates_all_children_and_reports_ok() {
    let (store, reconciler) = setup(app_spec());

    let outcome = reconciler.reconcile("db1", NAMESPACE).await.unwrap();
    assert_eq!(outcome, Outcome::Reconciled);

    let deployment: Deployment = store.get("db1", NAMESPACE).await.unwrap().unwrap();
    let service: Option<Service> = store.get("db1", NAMESPACE).await.unwrap();
    let claim: Option<PersistentVolumeClaim> = store.get("db1", NAMESPACE).await.unwrap();
    assert!(service.is_some());
    assert!(claim.is_some());
    assert_eq!(store.create_count(), 3);

    let labels = deployment.metadata.labels.clone().unwrap();
    assert_eq!(labels.get("app").map(String::as_str), Some("postgres"));
    assert_eq!(labels.get("cr").map(String::as_str), Some("db1"));
    let owner = &deployment.metadata.owner_references.unwrap()[0];
    assert_eq!(owner.kind, "PostgresDatabase");
    assert_eq!(owner.name, "db1");

    let db: PostgresDatabase = store.get("db1", NAMESPACE).await.unwrap().unwrap();
    assert_eq!(db.status.unwrap().health, HEALTH_OK);
}

#[tokio::test]
async fn reconcile_twice_is_idempotent() {
    let (store, reconciler) = setup(app_spec());

    reconciler.reconcile("db1", NAMESPACE).await.unwrap();
    let creates = store.create_count();
    let writes = store.status_write_count();
    assert_eq!(writes, 1);

    reconciler.reconcile("db1", NAMESPACE).await.unwrap();

    assert_eq!(store.create_count(), creates);
    assert_eq!(store.status_write_count(), writes);
}

#[tokio::test]
async fn existing_child_is_not_overwritten() {
    let (store, reconciler) = setup(app_spec());
    let out_of_band = Service {
        metadata: ObjectMeta {
            name: Some("db1".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port: 9999,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };
    store.insert(out_of_band).unwrap();

    reconciler.reconcile("db1", NAMESPACE).await.unwrap();

    let service: Service = store.get("db1", NAMESPACE).await.unwrap().unwrap();
    let port = service.spec.unwrap().ports.unwrap()[0].port;
    assert_eq!(port, 9999);
    assert!(service.metadata.labels.is_none());
    assert_eq!(store.create_count(), 2);
}

#[tokio::test]
async fn missing_database_is_a_no_op() {
    let store = Arc::new(MemoryStore::new());
    let reconciler = DatabaseReconciler::new(store.clone(), Arc::new(OperatorConfig::default()));

    let outcome = reconciler.reconcile("gone", NAMESPACE).await.unwrap();

    assert_eq!(outcome, Outcome::Deleted);
    assert_eq!(store.create_count(), 0);
    assert_eq!(store.status_write_count(), 0);
}

#[tokio::test]
async fn defaults_fill_the_built_manifests() {
    let (store, reconciler) = setup(PostgresDatabaseSpec::default());

    reconciler.reconcile("db1", NAMESPACE).await.unwrap();

    let deployment: Deployment = store.get("db1", NAMESPACE).await.unwrap().unwrap();
    let spec = deployment.spec.unwrap();
    assert_eq!(spec.replicas, Some(1));
    let container = &spec.template.spec.unwrap().containers[0];
    assert_eq!(container.image.as_deref(), Some("postgres:14"));
    assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 5432);

    // Defaults are applied in memory only
    let db: PostgresDatabase = store.get("db1", NAMESPACE).await.unwrap().unwrap();
    assert!(db.spec.image.is_empty());
}

// ============================================================================
// Drift Correction
// ============================================================================

#[tokio::test]
async fn replica_drift_is_corrected() {
    let (store, reconciler) = setup(app_spec());
    reconciler.reconcile("db1", NAMESPACE).await.unwrap();
    assert_eq!(live_replicas(&store).await, Some(1));

    let _: Deployment = store
        .patch("db1", NAMESPACE, &json!({"spec": {"replicas": 3}}))
        .await
        .unwrap();
    assert_eq!(live_replicas(&store).await, Some(3));

    reconciler.reconcile("db1", NAMESPACE).await.unwrap();

    assert_eq!(live_replicas(&store).await, Some(1));
}

#[tokio::test]
async fn other_workload_fields_are_not_reverted() {
    let (store, reconciler) = setup(app_spec());
    reconciler.reconcile("db1", NAMESPACE).await.unwrap();

    let _: Deployment = store
        .patch(
            "db1",
            NAMESPACE,
            &json!({"spec": {"minReadySeconds": 42, "template": {"metadata": {"annotations": {"touched": "yes"}}}}}),
        )
        .await
        .unwrap();

    reconciler.reconcile("db1", NAMESPACE).await.unwrap();

    let deployment: Deployment = store.get("db1", NAMESPACE).await.unwrap().unwrap();
    let spec = deployment.spec.unwrap();
    assert_eq!(spec.min_ready_seconds, Some(42));
    let annotations = spec.template.metadata.unwrap().annotations.unwrap();
    assert_eq!(annotations.get("touched").map(String::as_str), Some("yes"));
}

#[tokio::test]
async fn spec_replica_change_is_rolled_out() {
    let (store, reconciler) = setup(app_spec());
    reconciler.reconcile("db1", NAMESPACE).await.unwrap();

    let mut db: PostgresDatabase = store.get("db1", NAMESPACE).await.unwrap().unwrap();
    db.spec.replicas = Some(2);
    store.insert(db).unwrap();

    reconciler.reconcile("db1", NAMESPACE).await.unwrap();

    assert_eq!(live_replicas(&store).await, Some(2));
}

// ============================================================================
// Status Aggregation
// ============================================================================

#[tokio::test]
async fn child_status_change_is_mirrored_once() {
    let (store, reconciler) = setup(app_spec());
    reconciler.reconcile("db1", NAMESPACE).await.unwrap();

    let mut deployment: Deployment = store.get("db1", NAMESPACE).await.unwrap().unwrap();
    let observed = DeploymentStatus {
        replicas: Some(1),
        ready_replicas: Some(1),
        ..Default::default()
    };
    deployment.status = Some(observed.clone());
    store.insert(deployment).unwrap();

    reconciler.reconcile("db1", NAMESPACE).await.unwrap();
    assert_eq!(store.status_write_count(), 2);

    let db: PostgresDatabase = store.get("db1", NAMESPACE).await.unwrap().unwrap();
    assert_eq!(db.status.unwrap().deployment, Some(observed));

    reconciler.reconcile("db1", NAMESPACE).await.unwrap();
    assert_eq!(store.status_write_count(), 2);
}

#[tokio::test]
async fn store_failure_propagates() {
    let (store, reconciler) = setup(app_spec());
    store.fail_kind::<Service>().unwrap();

    let result = reconciler.reconcile("db1", NAMESPACE).await;

    assert!(matches!(result, Err(Error::Store(_))));
    // The workload created before the failure stays for the next pass
    let deployment: Option<Deployment> = store.get("db1", NAMESPACE).await.unwrap();
    assert!(deployment.is_some());
    assert_eq!(store.status_write_count(), 0);
}
