//! Secret gateway: where managers publish credentials of provisioned resources.
//!
//! Two backends: JSON files in a local directory, or a Vault KV v2 engine.

mod local;
mod vault;

pub use local::LocalSecretStore;
pub use vault::VaultSecretStore;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use azop_core::{Identity, ManagerError};
use thiserror::Error;
use tracing::info;

/// Key/value pairs of one secret.
pub type SecretData = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("invalid secret key: {0}")]
    InvalidKey(String),

    #[error("secret backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<SecretError> for ManagerError {
    fn from(e: SecretError) -> Self {
        match e {
            SecretError::InvalidKey(_) => ManagerError::configuration(e.to_string()),
            SecretError::Serialization(_) => ManagerError::unknown(e.to_string()),
            _ => ManagerError::transient(e.to_string()),
        }
    }
}

#[async_trait]
pub trait SecretGateway: Send + Sync {
    /// Create or replace the secret stored under `key`.
    async fn upsert(&self, key: &Identity, data: SecretData) -> Result<(), SecretError>;

    async fn get(&self, key: &Identity) -> Result<SecretData, SecretError>;

    /// Remove the secret. Removing a missing secret succeeds.
    async fn delete(&self, key: &Identity) -> Result<(), SecretError>;

    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Backend selection made at startup.
#[derive(Debug, Clone)]
pub enum SecretBackend {
    Local {
        dir: PathBuf,
    },
    Vault {
        addr: String,
        token: String,
        mount: String,
    },
}

/// Build the gateway for `backend`.
pub fn connect(backend: SecretBackend) -> Result<Arc<dyn SecretGateway>, SecretError> {
    match backend {
        SecretBackend::Local { dir } => {
            info!(dir = %dir.display(), "using local secret store");
            Ok(Arc::new(LocalSecretStore::new(dir)))
        }
        SecretBackend::Vault { addr, token, mount } => {
            info!(%addr, %mount, "using vault secret store");
            Ok(Arc::new(VaultSecretStore::new(&addr, token, mount)?))
        }
    }
}

/// A key component must be a single, non-traversing path segment.
pub(crate) fn check_segment(segment: &str) -> Result<(), SecretError> {
    let ok = !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(SecretError::InvalidKey(segment.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azop_core::ErrorKind;

    #[test]
    fn segments_cannot_traverse() {
        assert!(check_segment("orders-hub").is_ok());
        assert!(check_segment("..").is_err());
        assert!(check_segment("a/b").is_err());
        assert!(check_segment("").is_err());
    }

    #[test]
    fn secret_errors_classify() {
        let e: ManagerError = SecretError::Backend("503".into()).into();
        assert_eq!(e.kind, ErrorKind::Transient);
        let e: ManagerError = SecretError::InvalidKey("..".into()).into();
        assert_eq!(e.kind, ErrorKind::Configuration);
    }
}
