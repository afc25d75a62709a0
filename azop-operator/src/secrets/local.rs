//! File-backed secret store: `<dir>/<namespace>/<name>.json`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use azop_core::Identity;
use tokio::fs;
use tracing::debug;

use super::{SecretData, SecretError, SecretGateway, check_segment};

pub struct LocalSecretStore {
    dir: PathBuf,
}

impl LocalSecretStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &Identity) -> Result<PathBuf, SecretError> {
        check_segment(&key.namespace)?;
        check_segment(&key.name)?;
        Ok(self
            .dir
            .join(&key.namespace)
            .join(format!("{}.json", key.name)))
    }
}

#[async_trait]
impl SecretGateway for LocalSecretStore {
    async fn upsert(&self, key: &Identity, data: SecretData) -> Result<(), SecretError> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see a partial file.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&data)?).await?;
        fs::rename(&tmp, &path).await?;

        debug!(key = %key, path = %path.display(), "secret written");
        Ok(())
    }

    async fn get(&self, key: &Identity) -> Result<SecretData, SecretError> {
        let path = self.path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(SecretError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &Identity) -> Result<(), SecretError> {
        let path = self.path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, "secret removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> SecretData {
        SecretData::from([
            ("primaryKey".to_string(), "k1".to_string()),
            ("secondaryKey".to_string(), "k2".to_string()),
        ])
    }

    #[tokio::test]
    async fn upsert_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalSecretStore::new(dir.path());
        let key = Identity::new("default", "orders");

        store.upsert(&key, data()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), data());
        assert!(dir.path().join("default").join("orders.json").exists());

        store.delete(&key).await.unwrap();
        assert!(matches!(
            store.get(&key).await,
            Err(SecretError::NotFound(_))
        ));
        // Idempotent
        store.delete(&key).await.unwrap();
    }

    #[tokio::test]
    async fn upsert_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalSecretStore::new(dir.path());
        let key = Identity::new("default", "orders");

        store.upsert(&key, data()).await.unwrap();
        let mut updated = data();
        updated.insert("primaryKey".into(), "rotated".into());
        store.upsert(&key, updated.clone()).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn rejects_traversing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalSecretStore::new(dir.path());
        let key = Identity::new("..", "passwd");
        assert!(matches!(
            store.upsert(&key, data()).await,
            Err(SecretError::InvalidKey(_))
        ));
    }
}
