//! Wiring of the reconciler into the kube-rs controller runtime.
//!
//! The runtime watches `WebGame` records plus the Deployments, Services and
//! Ingresses they own, and calls [`reconcile`] with the owning record for
//! every change. Each call takes one convergence step; the write it makes
//! comes back as a change on an owned child and triggers the next step.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::core::NamespaceResourceScope;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, warn};
use webgame_api::WebGame;
use webgame_reconciler::{
    Error, ReconcileOutcome, Reconciler, ReconcilerBuilder, controller_scheme,
};
use webgame_store::{KubeStore, ObjectKey, TracingStore};

use crate::cli::RunArgs;

/// Store used against a live cluster.
pub type ClusterStore = TracingStore<KubeStore>;

/// Shared state of every reconcile call.
pub struct Context {
    reconciler: Reconciler<ClusterStore>,
    error_requeue: Duration,
}

impl Context {
    /// Create a context for `client`.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` when the reconciler cannot be built.
    pub fn new(client: Client, args: &RunArgs) -> Result<Self, Error> {
        let store = Arc::new(TracingStore::new(KubeStore::new(client)));
        let reconciler = ReconcilerBuilder::new()
            .with_store(store)
            .with_scheme(Arc::new(controller_scheme()))
            .conflict_retries(args.conflict_retries)
            .build()?;

        Ok(Self {
            reconciler,
            error_requeue: args.error_requeue(),
        })
    }
}

/// Take one convergence step for `game`.
///
/// # Errors
/// Returns the reconciler's error; [`error_policy`] decides on the retry.
#[instrument(skip(game, ctx), fields(game = %game.name_any()))]
pub async fn reconcile(game: Arc<WebGame>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = ObjectKey::from_resource(game.as_ref())
        .ok_or_else(|| Error::invariant(game.name_any(), "record has no namespace"))?;

    match ctx.reconciler.reconcile(&key).await? {
        ReconcileOutcome::Progressed { child, outcome } => {
            debug!(%child, ?outcome, "Waiting for the child change to come back");
        }
        ReconcileOutcome::Converged { status_patched, .. } => {
            debug!(status_patched, "Converged");
        }
        ReconcileOutcome::RecordMissing | ReconcileOutcome::Terminating => {}
    }
    Ok(Action::await_change())
}

/// Decide when a failed record is retried.
pub fn requeue_action(error: &Error, delay: Duration) -> Action {
    if error.is_retryable() {
        Action::requeue(delay)
    } else {
        // Only a change to the record can fix it.
        Action::await_change()
    }
}

/// Error policy for the WebGame controller.
pub fn error_policy(game: Arc<WebGame>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        game = %game.name_any(),
        namespace = ?game.namespace(),
        retryable = error.is_retryable(),
        error = %error,
        "Reconciliation failed"
    );
    requeue_action(error, ctx.error_requeue)
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the controller until a termination signal arrives.
///
/// # Errors
/// Returns an error when the reconciler cannot be built.
pub async fn run(client: Client, args: RunArgs) -> Result<(), Error> {
    let namespace = args.namespace.as_deref();
    info!(
        namespace = namespace.unwrap_or("<all>"),
        conflict_retries = args.conflict_retries,
        error_requeue_secs = args.error_requeue_secs,
        "Starting WebGame controller"
    );

    let ctx = Arc::new(Context::new(client.clone(), &args)?);
    let config = watcher::Config::default();

    Controller::new(api::<WebGame>(&client, namespace), config.clone())
        .owns(api::<Deployment>(&client, namespace), config.clone())
        .owns(api::<Service>(&client, namespace), config.clone())
        .owns(api::<Ingress>(&client, namespace), config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(object = %object, "Reconciled"),
                Err(e) => error!(error = %e, "Controller error"),
            }
        })
        .await;

    info!("WebGame controller stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors_are_requeued() {
        let delay = Duration::from_secs(30);
        let conflict = Error::from(webgame_store::Error::conflict("Deployment", "games/a", "race"));
        assert_eq!(requeue_action(&conflict, delay), Action::requeue(delay));

        let outage = Error::from(webgame_store::Error::unavailable("get", "timeout"));
        assert_eq!(requeue_action(&outage, delay), Action::requeue(delay));
    }

    #[test]
    fn test_permanent_errors_wait_for_change() {
        let delay = Duration::from_secs(30);
        let invalid = Error::invariant("games/a", "image is empty");
        assert_eq!(requeue_action(&invalid, delay), Action::await_change());

        let transition = Error::unsupported_transition("games/a", "gameType changed");
        assert_eq!(requeue_action(&transition, delay), Action::await_change());
    }
}
