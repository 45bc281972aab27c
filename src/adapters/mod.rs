//! Adapters turning CRD specs into the child resources that realize them
//!
//! Everything here is pure: given a parent object (with defaults already
//! applied) and the operator configuration, produce a complete manifest.

mod credentials;
mod cron_job;
mod workload;

pub use credentials::*;
pub use cron_job::*;
pub use workload::*;

use kube::api::ObjectMeta;
use kube::Resource;

use crate::store::Labels;

/// Labels shared by every child of a parent and used to select them
pub fn labels(product: &str, parent_name: &str) -> Labels {
    let mut labels = Labels::new();
    labels.insert("app".to_string(), product.to_string());
    labels.insert("cr".to_string(), parent_name.to_string());
    labels
}

/// Labels for the children of a backup
///
/// The `app` value differs from the database's so that backup job pods are
/// never matched by a database's Service or Deployment selector, even when
/// the backup shares its database's name.
pub fn backup_labels(product: &str, parent_name: &str) -> Labels {
    labels(&format!("{}-backup", product), parent_name)
}

/// Record `parent` as the controlling owner of `child`
///
/// The API server garbage collects the child when the parent is deleted and
/// routes child changes back to the parent's controller. Parents without a
/// uid (never persisted) cannot own anything and are skipped.
pub fn set_owner<C, P>(child: &mut C, parent: &P)
where
    C: Resource,
    P: Resource<DynamicType = ()>,
{
    let Some(owner) = parent.controller_owner_ref(&()) else {
        return;
    };
    let refs = child.meta_mut().owner_references.get_or_insert_with(Vec::new);
    if !refs.iter().any(|r| r.uid == owner.uid) {
        refs.push(owner);
    }
}

/// Metadata for a child living next to its parent
pub fn child_meta(name: &str, namespace: &str, labels: Labels) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(labels),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{PostgresDatabase, PostgresDatabaseSpec};
    use k8s_openapi::api::core::v1::Service;

    fn database(uid: Option<&str>) -> PostgresDatabase {
        let mut db = PostgresDatabase::new("db1", PostgresDatabaseSpec::default());
        db.metadata.namespace = Some("default".to_string());
        db.metadata.uid = uid.map(str::to_string);
        db
    }

    #[test]
    fn labels_carry_product_and_parent() {
        let labels = labels("postgres", "db1");
        assert_eq!(labels.get("app").map(String::as_str), Some("postgres"));
        assert_eq!(labels.get("cr").map(String::as_str), Some("db1"));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn backup_labels_do_not_match_database_selector() {
        let database = labels("postgres", "db1");
        let backup = backup_labels("postgres", "db1");
        assert_eq!(backup.get("app").map(String::as_str), Some("postgres-backup"));
        assert!(!database.iter().all(|(k, v)| backup.get(k) == Some(v)));
    }

    #[test]
    fn set_owner_adds_controller_reference_once() {
        let parent = database(Some("uid-1"));
        let mut child = Service::default();

        set_owner(&mut child, &parent);
        set_owner(&mut child, &parent);

        let refs = child.metadata.owner_references.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, "PostgresDatabase");
        assert_eq!(refs[0].name, "db1");
        assert_eq!(refs[0].controller, Some(true));
    }

    #[test]
    fn set_owner_skips_parent_without_uid() {
        let mut child = Service::default();
        set_owner(&mut child, &database(None));
        assert!(child.metadata.owner_references.is_none());
    }
}
