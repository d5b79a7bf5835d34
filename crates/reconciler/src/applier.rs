//! Get-or-create-then-mutate persistence of child objects.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use tracing::{debug, instrument};
use webgame_store::{ApiStore, ObjectKey, StoreObject};

use crate::error::{Error, Result};
use crate::types::{Applied, ApplyOutcome};

/// Persists children under optimistic concurrency.
///
/// Every apply reads the freshest stored object, runs the caller's mutate
/// function over it (or over an empty object when it does not exist yet),
/// sets the controller reference, and writes only when something changed.
/// A conflicting concurrent write re-runs the whole read-mutate-write cycle.
#[derive(Debug, Clone, Copy)]
pub struct Applier {
    conflict_retries: u32,
}

impl Applier {
    /// Create an applier that re-fetches up to `conflict_retries` times.
    pub const fn new(conflict_retries: u32) -> Self {
        Self { conflict_retries }
    }

    /// Apply `mutate` to the child at `key`, owned by `owner`.
    ///
    /// # Errors
    /// Propagates errors from `mutate`, returns `Error::InvariantViolation`
    /// when another controller owns the child, and surfaces store errors.
    /// Conflicts are surfaced once the retries are spent.
    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %key))]
    pub async fn apply<S, K, F>(
        &self,
        store: &S,
        key: &ObjectKey,
        owner: &OwnerReference,
        mutate: F,
    ) -> Result<Applied<K>>
    where
        S: ApiStore,
        K: StoreObject + Default + PartialEq,
        F: Fn(&mut K) -> Result<()> + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            match self.apply_once(store, key, owner, &mutate).await {
                Err(Error::Store(e))
                    if attempt < self.conflict_retries && (e.is_conflict() || e.is_not_found()) =>
                {
                    attempt += 1;
                    debug!(attempt, error = %e, "Child changed underneath us, re-fetching");
                }
                Ok(applied) => {
                    debug!(outcome = ?applied.outcome, "Child applied");
                    return Ok(applied);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn apply_once<S, K, F>(
        &self,
        store: &S,
        key: &ObjectKey,
        owner: &OwnerReference,
        mutate: &F,
    ) -> Result<Applied<K>>
    where
        S: ApiStore,
        K: StoreObject + Default + PartialEq,
        F: Fn(&mut K) -> Result<()> + Send + Sync,
    {
        match store.get::<K>(key).await? {
            None => {
                let mut object = K::default();
                let meta = object.meta_mut();
                meta.name = Some(key.name.clone());
                meta.namespace = Some(key.namespace.clone());

                mutate(&mut object)?;
                set_controller_reference(&mut object, owner, key)?;

                let created = store.create(&object).await?;
                Ok(Applied::new(created, ApplyOutcome::Created))
            }
            Some(current) => {
                let mut object = current.clone();
                mutate(&mut object)?;
                set_controller_reference(&mut object, owner, key)?;

                if object == current {
                    return Ok(Applied::new(current, ApplyOutcome::Unchanged));
                }
                let updated = store.replace(&object).await?;
                Ok(Applied::new(updated, ApplyOutcome::Updated))
            }
        }
    }
}

/// Record `owner` as the controller of `object`.
///
/// Existing references to other owners are kept; the reference is added
/// once and never rewritten.
///
/// # Errors
/// Returns `Error::InvariantViolation` when a different object already
/// controls `object`.
pub fn set_controller_reference<K: Resource>(
    object: &mut K,
    owner: &OwnerReference,
    key: &ObjectKey,
) -> Result<()> {
    let refs = object.meta_mut().owner_references.get_or_insert_with(Vec::new);

    if let Some(other) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(Error::invariant(
            key,
            format!("already controlled by {} '{}'", other.kind, other.name),
        ));
    }

    if !refs.iter().any(|r| r.uid == owner.uid) {
        refs.push(owner.clone());
    }
    Ok(())
}
