//! Shared test utilities for azop-core integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use azop_core::{
    BackoffPolicy, EngineConfig, ErrorKind, Identity, Manager, ManagerError, ManagerRegistry,
    MemoryStore, ParentReference, Progress, ReconcileContext, ReconcileEngine, RecordStore,
    ResourceRecord, ResourceSpec, ResourceStatus, StoreError, StoreResult, Version,
};
use tokio_util::sync::CancellationToken;

pub const NS: &str = "default";

pub fn id(name: &str) -> Identity {
    Identity::new(NS, name)
}

// =============================================================================
// Spec
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    ResourceGroup,
    EventhubNamespace,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spec {
    pub kind: Kind,
    pub location: String,
    pub parents: Vec<String>,
}

impl Spec {
    pub fn group(location: &str) -> Self {
        Self {
            kind: Kind::ResourceGroup,
            location: location.to_string(),
            parents: Vec::new(),
        }
    }

    pub fn namespace(location: &str, group: &str) -> Self {
        Self {
            kind: Kind::EventhubNamespace,
            location: location.to_string(),
            parents: vec![group.to_string()],
        }
    }
}

impl ResourceSpec for Spec {
    type Kind = Kind;

    fn kind(&self) -> Kind {
        self.kind
    }
}

// =============================================================================
// Scripted manager
// =============================================================================

/// A manager call as seen by the stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ensure(Identity),
    Delete(Identity),
}

/// Manager stub that replays scripted results and detects re-entrant calls.
///
/// Unscripted calls succeed with `Progress::Complete`.
#[derive(Default)]
pub struct ScriptedManager {
    ensure_script: Mutex<HashMap<Identity, VecDeque<Result<Progress, ManagerError>>>>,
    delete_script: Mutex<HashMap<Identity, VecDeque<Result<Progress, ManagerError>>>>,
    calls: Mutex<Vec<Call>>,
    in_flight: Mutex<HashSet<Identity>>,
    parents_calls: AtomicUsize,
    reentries: AtomicUsize,
    latency: Mutex<Duration>,
}

impl ScriptedManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_ensure(&self, identity: &Identity, results: Vec<Result<Progress, ManagerError>>) {
        self.ensure_script
            .lock()
            .unwrap()
            .entry(identity.clone())
            .or_default()
            .extend(results);
    }

    pub fn script_delete(&self, identity: &Identity, results: Vec<Result<Progress, ManagerError>>) {
        self.delete_script
            .lock()
            .unwrap()
            .entry(identity.clone())
            .or_default()
            .extend(results);
    }

    /// Every call sleeps this long while holding its identity.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ensure_count(&self, identity: &Identity) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == Call::Ensure(identity.clone()))
            .count()
    }

    pub fn delete_count(&self, identity: &Identity) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == Call::Delete(identity.clone()))
            .count()
    }

    pub fn parents_count(&self) -> usize {
        self.parents_calls.load(Ordering::SeqCst)
    }

    pub fn reentries(&self) -> usize {
        self.reentries.load(Ordering::SeqCst)
    }

    async fn run(
        &self,
        call: Call,
        identity: &Identity,
        script: &Mutex<HashMap<Identity, VecDeque<Result<Progress, ManagerError>>>>,
    ) -> Result<Progress, ManagerError> {
        if !self.in_flight.lock().unwrap().insert(identity.clone()) {
            self.reentries.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push(call);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let result = script
            .lock()
            .unwrap()
            .get_mut(identity)
            .and_then(|q| q.pop_front())
            .unwrap_or(Ok(Progress::Complete));
        self.in_flight.lock().unwrap().remove(identity);
        result
    }
}

#[async_trait]
impl Manager<Spec> for ScriptedManager {
    async fn ensure(
        &self,
        _ctx: &ReconcileContext,
        record: &ResourceRecord<Spec>,
    ) -> Result<Progress, ManagerError> {
        let identity = &record.identity;
        self.run(Call::Ensure(identity.clone()), identity, &self.ensure_script)
            .await
    }

    async fn delete(
        &self,
        _ctx: &ReconcileContext,
        record: &ResourceRecord<Spec>,
    ) -> Result<Progress, ManagerError> {
        let identity = &record.identity;
        self.run(Call::Delete(identity.clone()), identity, &self.delete_script)
            .await
    }

    fn parents(&self, record: &ResourceRecord<Spec>) -> Result<Vec<ParentReference<Kind>>, ManagerError> {
        self.parents_calls.fetch_add(1, Ordering::SeqCst);
        Ok(record
            .spec
            .parents
            .iter()
            .map(|p| {
                ParentReference::new(
                    Identity::new(record.identity.namespace.clone(), p.clone()),
                    Kind::ResourceGroup,
                )
            })
            .collect())
    }
}

// =============================================================================
// Conflict-injecting store
// =============================================================================

/// Wraps a `MemoryStore` and fails the next `n` status writes with a version mismatch.
pub struct ConflictingStore {
    pub inner: Arc<MemoryStore<Spec>>,
    conflicts: AtomicUsize,
}

impl ConflictingStore {
    pub fn new(inner: Arc<MemoryStore<Spec>>, conflicts: usize) -> Self {
        Self {
            inner,
            conflicts: AtomicUsize::new(conflicts),
        }
    }
}

#[async_trait]
impl RecordStore<Spec> for ConflictingStore {
    async fn get(&self, identity: &Identity) -> StoreResult<Option<ResourceRecord<Spec>>> {
        self.inner.get(identity).await
    }

    async fn list(&self) -> StoreResult<Vec<ResourceRecord<Spec>>> {
        self.inner.list().await
    }

    async fn update_status(
        &self,
        identity: &Identity,
        expected: Version,
        status: ResourceStatus,
    ) -> StoreResult<ResourceRecord<Spec>> {
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::VersionMismatch {
                expected,
                actual: expected + 1,
            });
        }
        self.inner.update_status(identity, expected, status).await
    }

    async fn remove(&self, identity: &Identity, expected: Version) -> StoreResult<()> {
        self.inner.remove(identity, expected).await
    }
}

// =============================================================================
// Recording sink
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Start(Identity),
    Success(Identity),
    Failure(Identity, ErrorKind),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl azop_core::ObservabilitySink for RecordingSink {
    fn record_start(&self, identity: &Identity) {
        self.events.lock().unwrap().push(SinkEvent::Start(identity.clone()));
    }

    fn record_success(&self, identity: &Identity, _elapsed: Duration) {
        self.events.lock().unwrap().push(SinkEvent::Success(identity.clone()));
    }

    fn record_failure(&self, identity: &Identity, kind: ErrorKind) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Failure(identity.clone(), kind));
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Engine configuration without jitter, so delays are exact.
pub fn config() -> EngineConfig {
    EngineConfig {
        workers: 4,
        request_timeout: Duration::from_secs(60),
        call_timeout: Duration::from_secs(10),
        backoff: BackoffPolicy {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            cap_exponent: 10,
            jitter: 0.0,
            soft_wait: Duration::from_secs(2),
            poll: Duration::from_secs(5),
        },
        max_unknown_retries: 3,
        conflict_retries: 2,
        resync_interval: Duration::from_secs(3600),
    }
}

pub fn ctx() -> ReconcileContext {
    let config = config();
    ReconcileContext::new(
        config.request_timeout,
        config.call_timeout,
        CancellationToken::new(),
    )
}

/// Store, manager, sink and engine wired together, one manager for both kinds.
pub struct Harness {
    pub store: Arc<MemoryStore<Spec>>,
    pub manager: Arc<ScriptedManager>,
    pub sink: Arc<RecordingSink>,
    pub engine: Arc<ReconcileEngine<Spec>>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_store(store.clone(), store)
    }

    /// Build the engine over `engine_store`, which usually wraps `store`.
    pub fn with_store(store: Arc<MemoryStore<Spec>>, engine_store: Arc<dyn RecordStore<Spec>>) -> Self {
        let manager = ScriptedManager::new();
        let sink = Arc::new(RecordingSink::default());
        let registry = ManagerRegistry::<Spec>::new()
            .with(Kind::ResourceGroup, manager.clone())
            .with(Kind::EventhubNamespace, manager.clone());
        let engine = Arc::new(ReconcileEngine::new(
            engine_store,
            registry,
            sink.clone(),
            &config(),
        ));
        Self {
            store,
            manager,
            sink,
            engine,
        }
    }

    pub async fn record(&self, name: &str) -> Option<ResourceRecord<Spec>> {
        self.store.get(&id(name)).await.unwrap()
    }

    pub async fn status(&self, name: &str) -> ResourceStatus {
        self.record(name).await.expect("record exists").status
    }

    /// Reconcile `name` at its current generation.
    pub async fn reconcile(&self, name: &str) -> azop_core::Outcome {
        let record = self.record(name).await;
        let (generation, delete) = record
            .map(|r| (r.generation, r.deletion_requested))
            .unwrap_or((1, false));
        let request = if delete {
            azop_core::ReconcileRequest::delete(id(name), generation)
        } else {
            azop_core::ReconcileRequest::upsert(id(name), generation)
        };
        self.engine.reconcile(&ctx(), &request).await
    }
}
