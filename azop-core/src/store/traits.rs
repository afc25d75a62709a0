//! RecordStore trait definition.
//!
//! The engine reads records and writes status through this trait only; the
//! backing store owns the data and hands out version tokens.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::model::{Identity, ResourceRecord, ResourceSpec, ResourceStatus, Version};

#[async_trait]
pub trait RecordStore<S: ResourceSpec>: Send + Sync {
    /// Get a record by identity.
    async fn get(&self, identity: &Identity) -> StoreResult<Option<ResourceRecord<S>>>;

    /// List all records.
    async fn list(&self) -> StoreResult<Vec<ResourceRecord<S>>>;

    /// Replace the status of a record if its version still equals `expected`.
    ///
    /// Returns the record with its new version.
    async fn update_status(
        &self,
        identity: &Identity,
        expected: Version,
        status: ResourceStatus,
    ) -> StoreResult<ResourceRecord<S>>;

    /// Remove a record if its version still equals `expected`.
    async fn remove(&self, identity: &Identity, expected: Version) -> StoreResult<()>;
}
