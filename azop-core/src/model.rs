//! Resource records, their status and the requests that drive them.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Namespaced name of a resource record. Unique within a store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub namespace: String,
    pub name: String,
}

impl Identity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Tag identifying a resource kind.
///
/// Blanket-implemented for any small copyable enum, so the operator's closed
/// `Kind` enum qualifies without extra code.
pub trait ResourceKind:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

impl<T> ResourceKind for T where
    T: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

/// Declared desired state of one record. Opaque to the engine apart from its kind.
pub trait ResourceSpec: Clone + fmt::Debug + Send + Sync + 'static {
    type Kind: ResourceKind;

    fn kind(&self) -> Self::Kind;
}

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Pending,
    Provisioning,
    Provisioned,
    Failed,
    Deleting,
    Deleted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Pending => "Pending",
            LifecycleState::Provisioning => "Provisioning",
            LifecycleState::Provisioned => "Provisioned",
            LifecycleState::Failed => "Failed",
            LifecycleState::Deleting => "Deleting",
            LifecycleState::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}

/// Observed status of a record, written only through the status tracker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub state: LifecycleState,
    pub message: String,
    /// Generation the latest attempt worked on.
    pub last_attempt_generation: u64,
    pub retry_count: u32,
    /// Unclassified failures recorded in this cycle. Only these count
    /// toward the unknown-error retry limit.
    #[serde(default)]
    pub unknown_failures: u32,
    /// Class of the latest recorded failure, cleared on success.
    pub error: Option<ErrorKind>,
}

/// Optimistic-concurrency token assigned by the store on every write.
pub type Version = u64;

/// Declaration plus observed status of one cloud resource.
#[derive(Debug, Clone)]
pub struct ResourceRecord<S> {
    pub identity: Identity,
    /// Bumped by the store whenever the declared spec changes.
    pub generation: u64,
    pub spec: S,
    pub status: ResourceStatus,
    pub version: Version,
    /// Delete intent. The record stays in the store until teardown completes.
    pub deletion_requested: bool,
}

impl<S: ResourceSpec> ResourceRecord<S> {
    pub fn kind(&self) -> S::Kind {
        self.spec.kind()
    }
}

/// Weak link from a child record to a record it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParentReference<K> {
    pub identity: Identity,
    pub kind: K,
}

impl<K> ParentReference<K> {
    pub fn new(identity: Identity, kind: K) -> Self {
        Self { identity, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Upsert,
    Delete,
}

/// A request to converge one identity. Delivery is at-least-once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub identity: Identity,
    pub observed_generation: u64,
    pub event: EventKind,
}

impl ReconcileRequest {
    pub fn upsert(identity: Identity, observed_generation: u64) -> Self {
        Self {
            identity,
            observed_generation,
            event: EventKind::Upsert,
        }
    }

    pub fn delete(identity: Identity, observed_generation: u64) -> Self {
        Self {
            identity,
            observed_generation,
            event: EventKind::Delete,
        }
    }

    /// Fold a newer duplicate into this request.
    ///
    /// Keeps the highest generation seen; a delete is never downgraded to an upsert.
    pub fn merge(&mut self, other: ReconcileRequest) {
        debug_assert_eq!(self.identity, other.identity);
        self.observed_generation = self.observed_generation.max(other.observed_generation);
        if other.event == EventKind::Delete {
            self.event = EventKind::Delete;
        }
    }
}

/// Result of one reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub done: bool,
    pub requeue_after: Option<Duration>,
    pub terminal_error: Option<ErrorKind>,
}

impl Outcome {
    pub fn done() -> Self {
        Self {
            done: true,
            requeue_after: None,
            terminal_error: None,
        }
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            done: false,
            requeue_after: Some(after),
            terminal_error: None,
        }
    }

    pub fn terminal(kind: ErrorKind) -> Self {
        Self {
            done: true,
            requeue_after: None,
            terminal_error: Some(kind),
        }
    }
}
