//! Events emitted by store changes.

use crate::model::{Identity, LifecycleState, ReconcileRequest};

/// Events emitted when records change.
///
/// Dispatched via a broadcast channel to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A record was created or its spec changed.
    Applied { identity: Identity, generation: u64 },
    /// Delete intent was recorded.
    DeletionRequested { identity: Identity, generation: u64 },
    /// Status was written.
    StatusUpdated {
        identity: Identity,
        state: LifecycleState,
    },
    /// The record left the store.
    Removed { identity: Identity },
}

impl StoreEvent {
    pub fn identity(&self) -> &Identity {
        match self {
            StoreEvent::Applied { identity, .. }
            | StoreEvent::DeletionRequested { identity, .. }
            | StoreEvent::StatusUpdated { identity, .. }
            | StoreEvent::Removed { identity } => identity,
        }
    }

    /// The reconcile request this change calls for, if any.
    ///
    /// Status writes come from the engine itself and removals need no further
    /// work, so neither produces a request.
    pub fn to_request(&self) -> Option<ReconcileRequest> {
        match self {
            StoreEvent::Applied {
                identity,
                generation,
            } => Some(ReconcileRequest::upsert(identity.clone(), *generation)),
            StoreEvent::DeletionRequested {
                identity,
                generation,
            } => Some(ReconcileRequest::delete(identity.clone(), *generation)),
            StoreEvent::StatusUpdated { .. } | StoreEvent::Removed { .. } => None,
        }
    }
}
