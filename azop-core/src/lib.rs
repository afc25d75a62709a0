pub mod backoff;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod manager;
pub mod model;
pub mod resolver;
pub mod status;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use backoff::BackoffPolicy;
pub use config::{ConfigError, EngineConfig};
pub use dispatch::{Dispatcher, WorkQueue};
pub use engine::ReconcileEngine;
pub use error::{ErrorKind, ManagerError, StatusError, StoreError, StoreResult};
pub use manager::{Interrupted, Manager, ManagerRegistry, Progress, ReconcileContext};
pub use model::{
    EventKind, Identity, LifecycleState, Outcome, ParentReference, ReconcileRequest,
    ResourceKind, ResourceRecord, ResourceSpec, ResourceStatus, Version,
};
pub use resolver::{DependencyResolver, Readiness, ResolveError, WaitReason};
pub use status::StatusTracker;
pub use store::{MemoryStore, RecordStore, StoreEvent};
pub use telemetry::{AuditSink, NoopSink, ObservabilitySink};
