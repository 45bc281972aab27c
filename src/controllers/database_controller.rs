//! PostgresDatabase controller
//!
//! Watches PostgresDatabase resources and the children they own, and
//! triggers reconciliation.

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, ResourceExt,
};
use tracing::{error, info, instrument};

use super::{retry_delay, Context};
use crate::crd::PostgresDatabase;
use crate::error::{Error, Result};
use crate::metrics;

const KIND: &str = "PostgresDatabase";

/// Run the PostgresDatabase controller
pub async fn run(context: Arc<Context>) {
    let client = context.client.clone();
    let api: Api<PostgresDatabase> = Api::all(client.clone());

    // Verify CRD is installed
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("PostgresDatabase CRD not installed: {}", e);
        return;
    }

    info!("Starting PostgresDatabase controller");

    Controller::new(api, WatcherConfig::default())
        .owns(Api::<Deployment>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<Service>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<PersistentVolumeClaim>::all(client), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        "Reconciled PostgresDatabase"
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
async fn reconcile(obj: Arc<PostgresDatabase>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[KIND])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[KIND]).inc();

    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());

    let outcome = ctx.databases.reconcile(&name, &namespace).await?;
    Ok(ctx.action(outcome))
}

/// Error policy for the controller
fn error_policy(obj: Arc<PostgresDatabase>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        error = %error,
        "Reconciliation failed, scheduling retry"
    );
    metrics::RECONCILIATION_ERRORS
        .with_label_values(&[KIND, error.class()])
        .inc();

    Action::requeue(retry_delay(error))
}
