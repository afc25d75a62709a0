//! Reconciliation engine - the per-record state machine.
//!
//! One call to [`ReconcileEngine::reconcile`] handles one request for one
//! identity. The engine re-reads the record and derives everything from its
//! current state, so duplicated, reordered or stale requests are harmless.
//!
//! ```text
//! Pending ──► Provisioning ──► Provisioned
//!    ▲              │
//!    │              └────────► Failed        (terminal until the spec changes)
//!    └── generation bump
//!
//! delete intent ──► Deleting ──► Deleted (record removed)
//! ```
//!
//! The delivery layer must never run two reconciles for the same identity at
//! once; managers rely on it.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::config::EngineConfig;
use crate::error::{ErrorKind, ManagerError, StatusError};
use crate::manager::{Interrupted, Manager, ManagerRegistry, Progress, ReconcileContext};
use crate::model::{
    EventKind, LifecycleState, Outcome, ReconcileRequest, ResourceRecord, ResourceSpec,
    ResourceStatus,
};
use crate::resolver::{DependencyResolver, Readiness, ResolveError};
use crate::status::StatusTracker;
use crate::store::RecordStore;
use crate::telemetry::ObservabilitySink;

/// Why a reconcile attempt stopped before producing an outcome.
#[derive(Debug)]
enum Abort {
    /// Status write lost an optimistic-concurrency race.
    Conflict(String),
    /// The record left the store mid-reconcile.
    Gone,
    Cancelled,
    /// The store could not be reached.
    Unavailable(String),
}

impl From<StatusError> for Abort {
    fn from(e: StatusError) -> Self {
        match e {
            StatusError::Conflict(msg) => Abort::Conflict(msg),
            StatusError::Gone => Abort::Gone,
            StatusError::Transient(msg) => Abort::Unavailable(msg),
            StatusError::Cancelled => Abort::Cancelled,
        }
    }
}

type Step = Result<Outcome, Abort>;

pub struct ReconcileEngine<S: ResourceSpec> {
    store: Arc<dyn RecordStore<S>>,
    registry: ManagerRegistry<S>,
    resolver: DependencyResolver<S>,
    tracker: StatusTracker<S>,
    backoff: BackoffPolicy,
    sink: Arc<dyn ObservabilitySink>,
    max_unknown_retries: u32,
    conflict_retries: u32,
}

impl<S: ResourceSpec> ReconcileEngine<S> {
    pub fn new(
        store: Arc<dyn RecordStore<S>>,
        registry: ManagerRegistry<S>,
        sink: Arc<dyn ObservabilitySink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            resolver: DependencyResolver::new(store.clone()),
            tracker: StatusTracker::new(store.clone()),
            store,
            registry,
            backoff: config.backoff.clone(),
            sink,
            max_unknown_retries: config.max_unknown_retries,
            conflict_retries: config.conflict_retries,
        }
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Converge one identity and say whether and when to look at it again.
    pub async fn reconcile(&self, ctx: &ReconcileContext, request: &ReconcileRequest) -> Outcome {
        let started = Instant::now();
        let identity = &request.identity;
        let mut conflicts = 0;

        loop {
            match self.reconcile_once(ctx, request, started).await {
                Ok(outcome) => return outcome,
                Err(Abort::Conflict(msg)) if conflicts < self.conflict_retries => {
                    conflicts += 1;
                    debug!(identity = %identity, attempt = conflicts, "{msg}; re-reading record");
                }
                Err(Abort::Conflict(msg)) => {
                    warn!(identity = %identity, "{msg}; giving up after {conflicts} reruns");
                    return Outcome::requeue(self.backoff.failure_delay(identity, 0));
                }
                Err(Abort::Gone) => {
                    debug!(identity = %identity, "record removed during reconcile");
                    return Outcome::done();
                }
                Err(Abort::Cancelled) => {
                    info!(identity = %identity, "reconcile cancelled; status left unchanged");
                    return Outcome::requeue(self.backoff.poll_delay());
                }
                Err(Abort::Unavailable(msg)) => {
                    warn!(identity = %identity, "record store unavailable: {msg}");
                    return Outcome::requeue(self.backoff.failure_delay(identity, 0));
                }
            }
        }
    }

    async fn reconcile_once(
        &self,
        ctx: &ReconcileContext,
        request: &ReconcileRequest,
        started: Instant,
    ) -> Step {
        let record = match ctx.call(self.store.get(&request.identity)).await {
            Err(Interrupted::Cancelled) => return Err(Abort::Cancelled),
            Err(Interrupted::TimedOut) => {
                return Err(Abort::Unavailable("record lookup timed out".into()));
            }
            Ok(Err(e)) => return Err(Abort::Unavailable(e.to_string())),
            Ok(Ok(None)) => {
                debug!(identity = %request.identity, "record no longer exists");
                return Ok(Outcome::done());
            }
            Ok(Ok(Some(record))) => record,
        };

        if request.observed_generation < record.generation {
            debug!(
                identity = %record.identity,
                observed = request.observed_generation,
                current = record.generation,
                "request superseded by newer generation"
            );
            return Ok(Outcome::done());
        }

        if record.deletion_requested {
            return self.finalize(ctx, &record, started).await;
        }
        if request.event == EventKind::Delete {
            debug!(identity = %record.identity, "delete request without delete intent on record");
        }
        self.converge(ctx, &record, started).await
    }

    /// Upsert path: drive the record towards `Provisioned`.
    async fn converge(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<S>,
        started: Instant,
    ) -> Step {
        let mut status = record.status.clone();

        if status.last_attempt_generation != record.generation {
            if status.last_attempt_generation != 0 {
                info!(
                    identity = %record.identity,
                    from = status.last_attempt_generation,
                    to = record.generation,
                    "spec changed; restarting cycle"
                );
            }
            status = ResourceStatus {
                state: LifecycleState::Pending,
                message: String::new(),
                last_attempt_generation: record.generation,
                retry_count: 0,
                unknown_failures: 0,
                error: None,
            };
        } else {
            match status.state {
                LifecycleState::Provisioned => {
                    debug!(identity = %record.identity, "up to date");
                    return Ok(Outcome::done());
                }
                LifecycleState::Failed => {
                    debug!(identity = %record.identity, "failed; waiting for a spec change");
                    return Ok(Outcome::done());
                }
                _ => {}
            }
        }

        let kind = record.kind();
        let Some(manager) = self.registry.get(kind) else {
            let err = ManagerError::configuration(format!("no manager registered for kind {kind}"));
            return self.record_error(ctx, record, status, err).await;
        };

        let readiness = match self.resolver.resolve(ctx, manager.as_ref(), record).await {
            Ok(readiness) => readiness,
            Err(ResolveError::Interrupted(Interrupted::Cancelled)) => return Err(Abort::Cancelled),
            Err(ResolveError::Manager(e)) => return self.record_error(ctx, record, status, e).await,
            Err(e) => {
                let err = ManagerError::transient(e.to_string());
                return self.record_error(ctx, record, status, err).await;
            }
        };

        if let Readiness::Waiting {
            blocking,
            reason,
            unmet,
        } = readiness
        {
            debug!(
                identity = %record.identity,
                parent = %blocking.identity,
                parent_kind = %blocking.kind,
                %reason,
                unmet,
                "waiting for parent"
            );
            // Waiting is not a status change; only a pending generation reset is persisted.
            self.tracker.write(ctx, record, status).await?;
            return Ok(Outcome::requeue(self.backoff.soft_wait_delay()));
        }

        let entering = status.state != LifecycleState::Provisioning;
        status.state = LifecycleState::Provisioning;
        let record = self.tracker.write(ctx, record, status.clone()).await?;
        if entering {
            self.sink.record_start(&record.identity);
        }

        match ctx.call(manager.ensure(ctx, &record)).await {
            Err(Interrupted::Cancelled) => Err(Abort::Cancelled),
            Err(Interrupted::TimedOut) => {
                let err = ManagerError::transient("ensure timed out");
                self.record_error(ctx, &record, status, err).await
            }
            Ok(Ok(Progress::Complete)) => {
                status.state = LifecycleState::Provisioned;
                status.message = "successfully provisioned".into();
                status.retry_count = 0;
                status.unknown_failures = 0;
                status.error = None;
                self.tracker.write(ctx, &record, status).await?;

                info!(identity = %record.identity, generation = record.generation, "provisioned");
                self.sink.record_success(&record.identity, started.elapsed());
                Ok(Outcome::done())
            }
            Ok(Ok(Progress::InProgress)) => {
                status.message = "provisioning in progress".into();
                status.retry_count = 0;
                status.unknown_failures = 0;
                status.error = None;
                self.tracker.write(ctx, &record, status).await?;
                Ok(Outcome::requeue(self.backoff.poll_delay()))
            }
            Ok(Err(e)) => self.record_error(ctx, &record, status, e).await,
        }
    }

    /// Delete path: tear down, then drop the deletion guard.
    async fn finalize(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<S>,
        started: Instant,
    ) -> Step {
        let mut status = record.status.clone();

        if status.last_attempt_generation == record.generation
            && status.state == LifecycleState::Deleting
            && self.is_terminal(&status)
        {
            debug!(identity = %record.identity, "deletion failed permanently; waiting for operator");
            return Ok(Outcome::done());
        }

        if status.last_attempt_generation != record.generation {
            status.last_attempt_generation = record.generation;
            status.retry_count = 0;
            status.unknown_failures = 0;
            status.error = None;
        }
        let entering = status.state != LifecycleState::Deleting;
        if entering {
            info!(identity = %record.identity, "deletion requested; tearing down");
            status.state = LifecycleState::Deleting;
            status.message = "deletion in progress".into();
            status.retry_count = 0;
            status.unknown_failures = 0;
            status.error = None;
        }

        let kind = record.kind();
        let Some(manager) = self.registry.get(kind) else {
            let err = ManagerError::configuration(format!("no manager registered for kind {kind}"));
            return self.record_error(ctx, record, status, err).await;
        };

        let record = self.tracker.write(ctx, record, status.clone()).await?;
        if entering {
            self.sink.record_start(&record.identity);
        }

        match ctx.call(manager.delete(ctx, &record)).await {
            Err(Interrupted::Cancelled) => Err(Abort::Cancelled),
            Err(Interrupted::TimedOut) => {
                let err = ManagerError::transient("delete timed out");
                self.record_error(ctx, &record, status, err).await
            }
            Ok(Ok(Progress::Complete)) => {
                status.state = LifecycleState::Deleted;
                status.message = "successfully deleted".into();
                status.retry_count = 0;
                status.unknown_failures = 0;
                status.error = None;
                let record = self.tracker.write(ctx, &record, status).await?;
                self.tracker.release(ctx, &record).await?;

                info!(identity = %record.identity, "deleted");
                self.sink.record_success(&record.identity, started.elapsed());
                Ok(Outcome::done())
            }
            Ok(Ok(Progress::InProgress)) => {
                status.message = "deletion in progress".into();
                status.retry_count = 0;
                status.unknown_failures = 0;
                status.error = None;
                self.tracker.write(ctx, &record, status).await?;
                Ok(Outcome::requeue(self.backoff.poll_delay()))
            }
            Ok(Err(e)) => self.record_error(ctx, &record, status, e).await,
        }
    }

    /// Record a failed attempt and decide between retry and terminal failure.
    ///
    /// Terminal failures leave `Deleting` records in `Deleting` so the
    /// deletion guard keeps holding them.
    async fn record_error(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<S>,
        mut status: ResourceStatus,
        err: ManagerError,
    ) -> Step {
        let kind = err.kind;
        if kind == ErrorKind::Unknown {
            status.unknown_failures = status.unknown_failures.saturating_add(1);
        }
        let exhausted =
            kind == ErrorKind::Unknown && status.unknown_failures > self.max_unknown_retries;
        self.sink.record_failure(&record.identity, kind);

        if kind.is_terminal() || exhausted {
            error!(
                identity = %record.identity,
                generation = record.generation,
                %kind,
                retries = status.retry_count,
                unknown_failures = status.unknown_failures,
                "reconcile failed permanently: {}",
                err.message
            );
            if status.state != LifecycleState::Deleting {
                status.state = LifecycleState::Failed;
            }
            status.message = err.message;
            status.error = Some(kind);
            self.tracker.write(ctx, record, status).await?;
            return Ok(Outcome::terminal(kind));
        }

        let delay = self.backoff.failure_delay(&record.identity, status.retry_count);
        status.retry_count = status.retry_count.saturating_add(1);
        warn!(
            identity = %record.identity,
            %kind,
            retries = status.retry_count,
            delay_ms = delay.as_millis() as u64,
            "reconcile failed, will retry: {}",
            err.message
        );
        status.message = err.message;
        status.error = Some(kind);
        self.tracker.write(ctx, record, status).await?;
        Ok(Outcome::requeue(delay))
    }

    /// Whether the recorded error forbids further automatic attempts.
    fn is_terminal(&self, status: &ResourceStatus) -> bool {
        match status.error {
            Some(kind) if kind.is_terminal() => true,
            Some(ErrorKind::Unknown) => status.unknown_failures > self.max_unknown_retries,
            _ => false,
        }
    }
}

