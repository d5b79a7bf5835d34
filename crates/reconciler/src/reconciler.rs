//! Reconciler implementation.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument};
use webgame_api::WebGame;
use webgame_api::labels::GAME_TYPE_LABEL;
use webgame_store::{ApiStore, ObjectKey, Scheme};

use crate::applier::Applier;
use crate::builder;
use crate::error::{Error, Result};
use crate::merge;
use crate::status;
use crate::types::{ApplyOutcome, ChildKind, ReconcileOutcome};

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// How many times an apply re-fetches after losing a write race.
    pub conflict_retries: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            conflict_retries: 2,
        }
    }
}

/// Level-triggered reconciler for `WebGame` records.
///
/// Each pass re-reads everything it needs from the store and keeps no
/// state between passes, so any number of passes may run for different
/// keys at once and a pass can be dropped at any await point.
pub struct Reconciler<S: ApiStore> {
    store: Arc<S>,
    scheme: Arc<Scheme>,
    applier: Applier,
    config: ReconcilerConfig,
}

impl<S: ApiStore> Reconciler<S> {
    /// Create a new reconciler.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` when `scheme` lacks one of the kinds
    /// the reconciler reads or writes.
    pub fn new(store: Arc<S>, scheme: Arc<Scheme>, config: ReconcilerConfig) -> Result<Self> {
        let missing: Vec<String> = [
            (scheme.contains::<WebGame>(), WebGame::kind(&())),
            (scheme.contains::<Deployment>(), Deployment::kind(&())),
            (scheme.contains::<Service>(), Service::kind(&())),
            (scheme.contains::<Ingress>(), Ingress::kind(&())),
        ]
        .into_iter()
        .filter(|(registered, _)| !registered)
        .map(|(_, kind)| kind.into_owned())
        .collect();

        if !missing.is_empty() {
            return Err(Error::invalid_config(format!(
                "scheme is missing kinds: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            store,
            scheme,
            applier: Applier::new(config.conflict_retries),
            config,
        })
    }

    /// Converge the children of the record at `key` one step further.
    ///
    /// Children are converged in order (workload, endpoint, routing rule);
    /// the pass stops right after the first child that had to be written.
    /// Only when all three already match is the status projected and, if it
    /// differs from the stored one, written.
    ///
    /// # Errors
    /// - `Error::InvariantViolation` when the record can never converge
    /// - `Error::UnsupportedTransition` when the record's `gameType` changed
    /// - `Error::Store` for store failures; see `Error::is_retryable`
    #[instrument(skip_all, fields(key = %key))]
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        debug!("Starting reconciliation");

        let Some(game) = self.store.get::<WebGame>(key).await? else {
            info!("WebGame not found, its children are collected by their owner references");
            return Ok(ReconcileOutcome::RecordMissing);
        };
        if game.is_terminating() {
            debug!("WebGame is being deleted, nothing to do");
            return Ok(ReconcileOutcome::Terminating);
        }

        game.spec
            .validate(&key.name)
            .map_err(|e| Error::invariant(key, e.to_string()))?;
        let owner = game
            .controller_owner_ref(&())
            .ok_or_else(|| Error::invariant(key, "record has no uid"))?;
        self.ensure_game_type_unchanged(&game, key, &owner).await?;
        let store = self.store.as_ref();

        let desired = builder::build_workload(&game).map_err(|e| Error::invariant(key, e.to_string()))?;
        let workload = self
            .applier
            .apply(store, key, &owner, |existing: &mut Deployment| {
                merge::converge_workload(existing, &desired)
                    .map_err(|e| Error::unsupported_transition(key, e.to_string()))
            })
            .await?;
        if workload.outcome.is_changed() {
            return Ok(progressed(ChildKind::Workload, workload.outcome));
        }

        let desired = builder::build_endpoint(&game).map_err(|e| Error::invariant(key, e.to_string()))?;
        let endpoint = self
            .applier
            .apply(store, key, &owner, |existing: &mut Service| {
                merge::converge_endpoint(existing, &desired);
                Ok(())
            })
            .await?;
        if endpoint.outcome.is_changed() {
            return Ok(progressed(ChildKind::Endpoint, endpoint.outcome));
        }

        let desired = builder::build_routing_rule(&game, &key.name)
            .map_err(|e| Error::invariant(key, e.to_string()))?;
        let routing = self
            .applier
            .apply(store, key, &owner, |existing: &mut Ingress| {
                merge::converge_routing_rule(existing, &desired);
                Ok(())
            })
            .await?;
        if routing.outcome.is_changed() {
            return Ok(progressed(ChildKind::RoutingRule, routing.outcome));
        }

        let projected = status::project(&game, &workload.object, &endpoint.object);
        if game.status.as_ref() == Some(&projected) {
            debug!("Converged, status unchanged");
            return Ok(ReconcileOutcome::Converged {
                status: projected,
                status_patched: false,
            });
        }

        self.store
            .patch_status::<WebGame>(key, serde_json::to_value(&projected)?)
            .await?;
        info!(
            game_address = %projected.game_address,
            cluster_endpoint = %projected.cluster_endpoint,
            "Status updated"
        );

        Ok(ReconcileOutcome::Converged {
            status: projected,
            status_patched: true,
        })
    }

    /// Compare the record's `gameType` with the one recorded in the selector
    /// of its own Service, which survives a lost workload.
    async fn ensure_game_type_unchanged(
        &self,
        game: &WebGame,
        key: &ObjectKey,
        owner: &OwnerReference,
    ) -> Result<()> {
        let Some(endpoint) = self.store.get::<Service>(key).await? else {
            return Ok(());
        };
        if !endpoint.owner_references().iter().any(|r| r.uid == owner.uid) {
            return Ok(());
        }

        let recorded = endpoint
            .spec
            .as_ref()
            .and_then(|spec| spec.selector.as_ref())
            .and_then(|selector| selector.get(GAME_TYPE_LABEL));
        match recorded {
            Some(previous) if *previous != game.spec.game_type => Err(Error::unsupported_transition(
                key,
                format!(
                    "gameType changed from {previous:?} to {:?}",
                    game.spec.game_type
                ),
            )),
            _ => Ok(()),
        }
    }

    /// Get the store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get the scheme.
    pub const fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    /// Get the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

fn progressed(child: ChildKind, outcome: ApplyOutcome) -> ReconcileOutcome {
    info!(child = %child, outcome = ?outcome, "Child written, waiting for the next pass");
    ReconcileOutcome::Progressed { child, outcome }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder<S: ApiStore> {
    store: Option<Arc<S>>,
    scheme: Option<Arc<Scheme>>,
    config: ReconcilerConfig,
}

impl<S: ApiStore> ReconcilerBuilder<S> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            scheme: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: Arc<Scheme>) -> Self {
        self.scheme = Some(scheme);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how many times an apply re-fetches after a conflict.
    #[must_use]
    pub fn conflict_retries(mut self, retries: u32) -> Self {
        self.config.conflict_retries = retries;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` when the store is missing or the
    /// scheme lacks a required kind. Without an explicit scheme the
    /// controller scheme is used.
    pub fn build(self) -> Result<Reconciler<S>> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("Store is required"))?;
        let scheme = self
            .scheme
            .unwrap_or_else(|| Arc::new(crate::controller_scheme()));

        Reconciler::new(store, scheme, self.config)
    }
}

impl<S: ApiStore> Default for ReconcilerBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
