//! Core types for the reconciler.

use std::fmt;

use serde::{Deserialize, Serialize};
use webgame_api::WebGameStatus;

/// The child resources derived from a `WebGame`, in convergence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildKind {
    /// The Deployment running the game.
    Workload,
    /// The Service exposing the workload inside the cluster.
    Endpoint,
    /// The Ingress routing external traffic to the endpoint.
    RoutingRule,
}

impl ChildKind {
    /// All child kinds in the order they are converged.
    pub const ORDER: [Self; 3] = [Self::Workload, Self::Endpoint, Self::RoutingRule];

    /// Name of the Kubernetes kind backing this child.
    pub const fn resource_kind(self) -> &'static str {
        match self {
            Self::Workload => "Deployment",
            Self::Endpoint => "Service",
            Self::RoutingRule => "Ingress",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_kind())
    }
}

/// What one apply did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyOutcome {
    /// The object did not exist and was created.
    Created,
    /// The object existed and was written.
    Updated,
    /// The object already matched; nothing was written.
    Unchanged,
}

impl ApplyOutcome {
    /// Whether the store was mutated.
    pub const fn is_changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// A persisted child together with what the apply did.
#[derive(Debug, Clone)]
pub struct Applied<K> {
    /// The object as currently stored.
    pub object: K,
    /// What the apply did.
    pub outcome: ApplyOutcome,
}

impl<K> Applied<K> {
    /// Create a new applied result.
    pub const fn new(object: K, outcome: ApplyOutcome) -> Self {
        Self { object, outcome }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The record no longer exists; its children are collected by the store.
    RecordMissing,
    /// The record is being deleted; nothing to do.
    Terminating,
    /// A child was just written; the pass stopped there and the resulting
    /// change event drives the next pass.
    Progressed {
        child: ChildKind,
        outcome: ApplyOutcome,
    },
    /// Every child matched. The status was written only if it differed.
    Converged {
        status: WebGameStatus,
        status_patched: bool,
    },
}

impl ReconcileOutcome {
    /// Whether all children matched in this pass.
    pub const fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    /// Whether this pass wrote anything to the store.
    pub const fn mutated(&self) -> bool {
        match self {
            Self::Progressed { .. } => true,
            Self::Converged { status_patched, .. } => *status_patched,
            Self::RecordMissing | Self::Terminating => false,
        }
    }
}
