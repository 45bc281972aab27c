//! PostgresBackup controller
//!
//! Watches PostgresBackup resources together with their CronJobs and
//! generated secrets, and triggers reconciliation.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use super::{retry_delay, Context};
use crate::crd::PostgresBackup;
use crate::error::{Error, Result};
use crate::metrics;

const KIND: &str = "PostgresBackup";

/// Run the PostgresBackup controller
pub async fn run(context: Arc<Context>) {
    let client = context.client.clone();
    let api: Api<PostgresBackup> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("PostgresBackup CRD not installed: {}", e);
        return;
    }

    info!("Starting PostgresBackup controller");

    Controller::new(api, WatcherConfig::default())
        .owns(Api::<CronJob>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<Secret>::all(client), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled PostgresBackup"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<PostgresBackup>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[KIND])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[KIND]).inc();

    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    let outcome = ctx.backups.reconcile(&name, &namespace).await?;
    Ok(ctx.action(outcome))
}

/// Error policy for the controller
fn error_policy(obj: Arc<PostgresBackup>, error: &Error, _ctx: Arc<Context>) -> Action {
    let name = obj.name_any();
    match error {
        // Expected while the database is still starting
        Error::DependencyMissing(_) => {
            warn!(name = %name, error = %error, "Backup waiting on its database");
        }
        _ => {
            error!(name = %name, error = %error, "Reconciliation failed, scheduling retry");
        }
    }
    metrics::RECONCILIATION_ERRORS
        .with_label_values(&[KIND, error.class()])
        .inc();

    Action::requeue(retry_delay(error))
}
