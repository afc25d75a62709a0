//! Status tracker - optimistic-concurrency writes of record status.
//!
//! Every write carries the version token of the record it was derived from.
//! A concurrent write by anyone else surfaces as `StatusError::Conflict`; the
//! engine answers that by re-reading and re-running the whole reconcile, so
//! the tracker itself never retries.

use std::sync::Arc;

use tracing::debug;

use crate::error::StatusError;
use crate::manager::{Interrupted, ReconcileContext};
use crate::model::{ResourceRecord, ResourceSpec, ResourceStatus};
use crate::store::RecordStore;

pub struct StatusTracker<S: ResourceSpec> {
    store: Arc<dyn RecordStore<S>>,
}

impl<S: ResourceSpec> StatusTracker<S> {
    pub fn new(store: Arc<dyn RecordStore<S>>) -> Self {
        Self { store }
    }

    /// Persist `status` for `record`.
    ///
    /// Returns the record as stored afterwards. An unchanged status is not
    /// written and the given record is returned as is.
    pub async fn write(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<S>,
        status: ResourceStatus,
    ) -> Result<ResourceRecord<S>, StatusError> {
        if record.status == status {
            return Ok(record.clone());
        }

        debug!(
            identity = %record.identity,
            version = record.version,
            from = %record.status.state,
            to = %status.state,
            "writing status"
        );

        let updated = ctx
            .call(
                self.store
                    .update_status(&record.identity, record.version, status),
            )
            .await
            .map_err(interrupted)??;
        Ok(updated)
    }

    /// Drop the deletion guard: remove the record from the store.
    pub async fn release(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<S>,
    ) -> Result<(), StatusError> {
        debug!(identity = %record.identity, version = record.version, "releasing record");
        ctx.call(self.store.remove(&record.identity, record.version))
            .await
            .map_err(interrupted)??;
        Ok(())
    }
}

fn interrupted(e: Interrupted) -> StatusError {
    match e {
        Interrupted::Cancelled => StatusError::Cancelled,
        Interrupted::TimedOut => StatusError::Transient("status store call timed out".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Identity, LifecycleState};
    use crate::store::MemoryStore;
    use crate::testing::TestSpec;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ReconcileContext {
        ReconcileContext::new(
            Duration::from_secs(30),
            Duration::from_secs(5),
            CancellationToken::new(),
        )
    }

    fn provisioning() -> ResourceStatus {
        ResourceStatus {
            state: LifecycleState::Provisioning,
            last_attempt_generation: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn write_persists_and_returns_new_version() {
        let store = Arc::new(MemoryStore::new());
        let record = store
            .apply(Identity::new("default", "a"), TestSpec::new("v1"))
            .await;
        let tracker = StatusTracker::<TestSpec>::new(store.clone());

        let updated = tracker.write(&ctx(), &record, provisioning()).await.unwrap();
        assert!(updated.version > record.version);

        let stored = store.get(&record.identity).await.unwrap().unwrap();
        assert_eq!(stored.status.state, LifecycleState::Provisioning);
    }

    #[tokio::test]
    async fn unchanged_status_is_not_written() {
        let store = Arc::new(MemoryStore::new());
        let record = store
            .apply(Identity::new("default", "a"), TestSpec::new("v1"))
            .await;
        let tracker = StatusTracker::<TestSpec>::new(store.clone());

        let same = tracker
            .write(&ctx(), &record, record.status.clone())
            .await
            .unwrap();
        assert_eq!(same.version, record.version);
    }

    #[tokio::test]
    async fn stale_record_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let stale = store
            .apply(Identity::new("default", "a"), TestSpec::new("v1"))
            .await;
        // Author edits the spec behind the tracker's back.
        store
            .apply(Identity::new("default", "a"), TestSpec::new("v2"))
            .await;
        let tracker = StatusTracker::<TestSpec>::new(store.clone());

        let err = tracker.write(&ctx(), &stale, provisioning()).await.unwrap_err();
        assert!(matches!(err, StatusError::Conflict(_)));
    }

    #[tokio::test]
    async fn release_removes_record() {
        let store = Arc::new(MemoryStore::new());
        let record = store
            .apply(Identity::new("default", "a"), TestSpec::new("v1"))
            .await;
        let tracker = StatusTracker::<TestSpec>::new(store.clone());

        tracker.release(&ctx(), &record).await.unwrap();
        assert!(store.is_empty().await);

        let err = tracker.release(&ctx(), &record).await.unwrap_err();
        assert_eq!(err, StatusError::Gone);
    }
}
