//! OSO Postgres Kubernetes Operator
//!
//! This operator runs PostgreSQL databases and their scheduled backups in
//! Kubernetes using Custom Resource Definitions (CRDs).

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;
pub mod store;

pub use error::{Error, Result};
