//! In-memory versioned record store.
//!
//! Besides the engine-facing `RecordStore` contract it exposes the author
//! side: declaring specs and recording delete intent.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use super::event::StoreEvent;
use super::traits::RecordStore;
use crate::error::{StoreError, StoreResult};
use crate::model::{Identity, ResourceRecord, ResourceSpec, ResourceStatus, Version};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

struct Inner<S> {
    records: HashMap<Identity, ResourceRecord<S>>,
    last_version: Version,
}

pub struct MemoryStore<S> {
    inner: RwLock<Inner<S>>,
    events: broadcast::Sender<StoreEvent>,
}

impl<S> MemoryStore<S>
where
    S: ResourceSpec + PartialEq,
{
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(Inner {
                records: HashMap::new(),
                last_version: 0,
            }),
            events,
        }
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Declare the desired spec for `identity`.
    ///
    /// Creates the record at generation 1, or bumps the generation when the
    /// spec differs from the stored one. An identical spec is a no-op.
    pub async fn apply(&self, identity: Identity, spec: S) -> ResourceRecord<S> {
        let mut inner = self.inner.write().await;
        let version = inner.last_version + 1;

        let record = match inner.records.get_mut(&identity) {
            Some(existing) if existing.spec == spec => return existing.clone(),
            Some(existing) => {
                existing.spec = spec;
                existing.generation += 1;
                existing.version = version;
                existing.clone()
            }
            None => {
                let record = ResourceRecord {
                    identity: identity.clone(),
                    generation: 1,
                    spec,
                    status: ResourceStatus::default(),
                    version,
                    deletion_requested: false,
                };
                inner.records.insert(identity.clone(), record.clone());
                record
            }
        };
        inner.last_version = version;
        drop(inner);

        debug!(identity = %identity, generation = record.generation, "record applied");
        self.emit(StoreEvent::Applied {
            identity,
            generation: record.generation,
        });
        record
    }

    /// Record delete intent. The record stays until the engine releases it.
    pub async fn request_deletion(&self, identity: &Identity) -> StoreResult<ResourceRecord<S>> {
        let mut inner = self.inner.write().await;
        let version = inner.last_version + 1;

        let record = inner
            .records
            .get_mut(identity)
            .ok_or_else(|| StoreError::NotFound(identity.to_string()))?;
        if record.deletion_requested {
            return Ok(record.clone());
        }
        record.deletion_requested = true;
        record.version = version;
        let record = record.clone();
        inner.last_version = version;
        drop(inner);

        debug!(identity = %identity, "deletion requested");
        self.emit(StoreEvent::DeletionRequested {
            identity: identity.clone(),
            generation: record.generation,
        });
        Ok(record)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

impl<S> Default for MemoryStore<S>
where
    S: ResourceSpec + PartialEq,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S> RecordStore<S> for MemoryStore<S>
where
    S: ResourceSpec + PartialEq,
{
    async fn get(&self, identity: &Identity) -> StoreResult<Option<ResourceRecord<S>>> {
        Ok(self.inner.read().await.records.get(identity).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<ResourceRecord<S>>> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner.records.values().cloned().collect();
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(records)
    }

    async fn update_status(
        &self,
        identity: &Identity,
        expected: Version,
        status: ResourceStatus,
    ) -> StoreResult<ResourceRecord<S>> {
        let mut inner = self.inner.write().await;
        let version = inner.last_version + 1;

        let record = inner
            .records
            .get_mut(identity)
            .ok_or_else(|| StoreError::NotFound(identity.to_string()))?;
        if record.version != expected {
            return Err(StoreError::VersionMismatch {
                expected,
                actual: record.version,
            });
        }
        let state = status.state;
        record.status = status;
        record.version = version;
        let record = record.clone();
        inner.last_version = version;
        drop(inner);

        self.emit(StoreEvent::StatusUpdated {
            identity: identity.clone(),
            state,
        });
        Ok(record)
    }

    async fn remove(&self, identity: &Identity, expected: Version) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get(identity)
            .ok_or_else(|| StoreError::NotFound(identity.to_string()))?;
        if record.version != expected {
            return Err(StoreError::VersionMismatch {
                expected,
                actual: record.version,
            });
        }
        inner.records.remove(identity);
        drop(inner);

        debug!(identity = %identity, "record removed");
        self.emit(StoreEvent::Removed {
            identity: identity.clone(),
        });
        Ok(())
    }
}
