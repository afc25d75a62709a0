//! Dependency resolver - decides whether a record's parents are ready.
//!
//! Parents are weak references: they are looked up by identity on every
//! reconcile and never owned. A record may provision only once every parent
//! is `Provisioned`.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::error::{ManagerError, StoreError};
use crate::manager::{Interrupted, Manager, ReconcileContext};
use crate::model::{LifecycleState, ParentReference, ResourceRecord, ResourceSpec};
use crate::store::RecordStore;

/// Why a parent blocks its child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// No record with the parent's identity exists yet.
    Missing,
    /// The parent exists but has not finished provisioning.
    NotProvisioned(LifecycleState),
    /// The parent is being torn down.
    Deleting,
    /// A record with that identity exists but is of another kind.
    KindMismatch,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitReason::Missing => write!(f, "does not exist yet"),
            WaitReason::NotProvisioned(state) => write!(f, "is {state}"),
            WaitReason::Deleting => write!(f, "is being deleted"),
            WaitReason::KindMismatch => write!(f, "is of a different kind"),
        }
    }
}

/// Result of evaluating a record's parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness<K> {
    Ready,
    /// At least one parent is not ready; `blocking` is the first unmet one in
    /// declaration order.
    Waiting {
        blocking: ParentReference<K>,
        reason: WaitReason,
        unmet: usize,
    },
}

impl<K> Readiness<K> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Failure to evaluate readiness at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// `parents` itself failed.
    #[error("failed to list parents: {0}")]
    Manager(ManagerError),
    /// The store lookup failed.
    #[error("failed to look up parent: {0}")]
    Store(StoreError),
    #[error("parent lookup interrupted: {0}")]
    Interrupted(Interrupted),
}

pub struct DependencyResolver<S: ResourceSpec> {
    store: Arc<dyn RecordStore<S>>,
}

impl<S: ResourceSpec> DependencyResolver<S> {
    pub fn new(store: Arc<dyn RecordStore<S>>) -> Self {
        Self { store }
    }

    /// Evaluate every parent of `record`; ready only when all are provisioned.
    pub async fn resolve(
        &self,
        ctx: &ReconcileContext,
        manager: &dyn Manager<S>,
        record: &ResourceRecord<S>,
    ) -> Result<Readiness<S::Kind>, ResolveError> {
        let parents = manager.parents(record).map_err(ResolveError::Manager)?;

        let mut first: Option<(ParentReference<S::Kind>, WaitReason)> = None;
        let mut unmet = 0;

        for parent in parents {
            let found = ctx
                .call(self.store.get(&parent.identity))
                .await
                .map_err(ResolveError::Interrupted)?
                .map_err(ResolveError::Store)?;

            let reason = match found {
                None => Some(WaitReason::Missing),
                Some(p) if p.kind() != parent.kind => Some(WaitReason::KindMismatch),
                Some(p) if p.deletion_requested => Some(WaitReason::Deleting),
                Some(p) if p.status.state != LifecycleState::Provisioned => {
                    Some(WaitReason::NotProvisioned(p.status.state))
                }
                Some(_) => None,
            };

            if let Some(reason) = reason {
                debug!(
                    identity = %record.identity,
                    parent = %parent.identity,
                    kind = %parent.kind,
                    %reason,
                    "parent not ready"
                );
                unmet += 1;
                if first.is_none() {
                    first = Some((parent, reason));
                }
            }
        }

        Ok(match first {
            None => Readiness::Ready,
            Some((blocking, reason)) => Readiness::Waiting {
                blocking,
                reason,
                unmet,
            },
        })
    }
}
