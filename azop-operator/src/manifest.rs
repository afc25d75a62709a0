//! Declaration manifest: the desired set of resources, read from a JSON file.
//!
//! ```json
//! { "resources": [
//!     { "namespace": "default", "name": "rg-orders",
//!       "kind": "ResourceGroup", "spec": { "location": "westeurope" } }
//! ] }
//! ```

use std::collections::HashSet;
use std::path::Path;

use azop_core::{Identity, MemoryStore, RecordStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::kind::AzureSpec;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0} is declared more than once")]
    Duplicate(Identity),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    #[serde(flatten)]
    pub spec: AzureSpec,
}

impl Declaration {
    pub fn identity(&self) -> Identity {
        Identity::new(self.namespace.clone(), self.name.clone())
    }
}

fn default_namespace() -> String {
    "default".into()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub resources: Vec<Declaration>,
}

impl Manifest {
    pub async fn load(path: &Path) -> Result<Self, ManifestError> {
        let bytes = tokio::fs::read(path).await?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// What one sync changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub applied: usize,
    pub unchanged: usize,
    pub deletion_requested: usize,
}

/// Make the store's declared set match `manifest`.
///
/// New or changed declarations are applied; records no longer declared get
/// delete intent. The manifest is validated as a whole before the store is
/// touched.
pub async fn sync_manifest(
    store: &MemoryStore<AzureSpec>,
    manifest: &Manifest,
) -> Result<SyncReport, ManifestError> {
    let mut declared = HashSet::new();
    for decl in &manifest.resources {
        let identity = decl.identity();
        if !declared.insert(identity.clone()) {
            return Err(ManifestError::Duplicate(identity));
        }
    }

    let mut report = SyncReport::default();
    for decl in &manifest.resources {
        let identity = decl.identity();
        match store.get(&identity).await? {
            Some(existing) if existing.spec == decl.spec => {
                if existing.deletion_requested {
                    warn!(identity = %identity, "declared again while being deleted");
                }
                report.unchanged += 1;
            }
            _ => {
                let record = store.apply(identity.clone(), decl.spec.clone()).await;
                debug!(identity = %identity, generation = record.generation, "declaration applied");
                report.applied += 1;
            }
        }
    }

    for record in store.list().await? {
        if record.deletion_requested || declared.contains(&record.identity) {
            continue;
        }
        match store.request_deletion(&record.identity).await {
            Ok(_) => report.deletion_requested += 1,
            // Finished deleting since the listing.
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    if report.applied > 0 || report.deletion_requested > 0 {
        info!(
            applied = report.applied,
            unchanged = report.unchanged,
            deletion_requested = report.deletion_requested,
            "manifest synced"
        );
    }
    Ok(report)
}
