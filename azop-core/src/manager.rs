//! Manager capability contract and the per-kind manager table.
//!
//! A manager is the only extension point for a new resource kind. The engine
//! never looks inside a spec; it hands the record to the manager registered
//! for the record's kind and acts on the classified result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ManagerError;
use crate::model::{ParentReference, ResourceRecord, ResourceSpec};

/// Progress reported by `ensure`/`delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The backend reached the desired end state.
    Complete,
    /// A long-running operation is still in flight; poll again later.
    InProgress,
}

/// Backend for one resource kind.
///
/// `ensure` and `delete` must be idempotent: repeated calls with an unchanged
/// spec converge to the same end state without duplicating external
/// resources. They are never invoked concurrently for the same identity.
#[async_trait]
pub trait Manager<S: ResourceSpec>: Send + Sync {
    /// Create or update the external resource.
    async fn ensure(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<S>,
    ) -> Result<Progress, ManagerError>;

    /// Tear down the external resource.
    async fn delete(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<S>,
    ) -> Result<Progress, ManagerError>;

    /// Records that must be provisioned before this one. Pure and deterministic.
    fn parents(
        &self,
        record: &ResourceRecord<S>,
    ) -> Result<Vec<ParentReference<S::Kind>>, ManagerError>;
}

/// Why a bounded call did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interrupted {
    #[error("reconcile cancelled")]
    Cancelled,
    #[error("call timed out")]
    TimedOut,
}

/// Deadline and cancellation scope of a single reconcile.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    deadline: Instant,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl ReconcileContext {
    pub fn new(request_timeout: Duration, call_timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + request_timeout,
            call_timeout,
            cancel,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time a single call may take: the per-call timeout, cut short by the request deadline.
    pub fn call_budget(&self) -> Duration {
        self.deadline
            .saturating_duration_since(Instant::now())
            .min(self.call_timeout)
    }

    /// Run one suspension point under the call budget and the cancellation token.
    pub async fn call<F, T>(&self, fut: F) -> Result<T, Interrupted>
    where
        F: Future<Output = T>,
    {
        if self.cancel.is_cancelled() {
            return Err(Interrupted::Cancelled);
        }
        let budget = self.call_budget();
        if budget.is_zero() {
            return Err(Interrupted::TimedOut);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            res = tokio::time::timeout(budget, fut) => res.map_err(|_| Interrupted::TimedOut),
        }
    }
}

/// Explicit table of managers keyed by kind, built once at startup.
pub struct ManagerRegistry<S: ResourceSpec> {
    managers: HashMap<S::Kind, Arc<dyn Manager<S>>>,
}

impl<S: ResourceSpec> ManagerRegistry<S> {
    pub fn new() -> Self {
        Self {
            managers: HashMap::new(),
        }
    }

    /// Register the manager for `kind`, replacing any previous entry.
    pub fn register(&mut self, kind: S::Kind, manager: Arc<dyn Manager<S>>) -> &mut Self {
        self.managers.insert(kind, manager);
        self
    }

    pub fn with(mut self, kind: S::Kind, manager: Arc<dyn Manager<S>>) -> Self {
        self.register(kind, manager);
        self
    }

    pub fn get(&self, kind: S::Kind) -> Option<Arc<dyn Manager<S>>> {
        self.managers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = S::Kind> + '_ {
        self.managers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

impl<S: ResourceSpec> Default for ManagerRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn call_times_out_at_call_timeout() {
        let ctx = ReconcileContext::new(
            Duration::from_secs(60),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        let res = ctx
            .call(tokio::time::sleep(Duration::from_secs(10)))
            .await;
        assert_eq!(res, Err(Interrupted::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn call_budget_shrinks_with_deadline() {
        let ctx = ReconcileContext::new(
            Duration::from_secs(8),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        assert_eq!(ctx.call_budget(), Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(ctx.call_budget(), Duration::from_secs(2));
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(
            ctx.call(async { 1 }).await,
            Err(Interrupted::TimedOut),
            "no budget left after the deadline"
        );
    }

    #[tokio::test]
    async fn call_aborts_on_cancel() {
        let token = CancellationToken::new();
        let ctx = ReconcileContext::new(Duration::from_secs(60), Duration::from_secs(60), token.clone());
        token.cancel();
        let res = ctx.call(std::future::pending::<()>()).await;
        assert_eq!(res, Err(Interrupted::Cancelled));
    }

    #[tokio::test]
    async fn call_returns_value() {
        let ctx = ReconcileContext::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            CancellationToken::new(),
        );
        assert_eq!(ctx.call(async { 42 }).await, Ok(42));
    }
}
