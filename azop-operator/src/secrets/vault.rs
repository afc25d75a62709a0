//! HashiCorp Vault KV v2 secret store.
//!
//! Secrets live at `<mount>/data/azop/<namespace>/<name>`; deletes remove
//! the metadata so no versions linger.

use std::time::Duration;

use async_trait::async_trait;
use azop_core::Identity;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{SecretData, SecretError, SecretGateway, check_segment};

const PATH_PREFIX: &str = "azop";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct VaultSecretStore {
    client: Client,
    addr: String,
    token: String,
    mount: String,
}

#[derive(Deserialize)]
struct ReadResponse {
    data: ReadData,
}

#[derive(Deserialize)]
struct ReadData {
    data: SecretData,
}

impl VaultSecretStore {
    pub fn new(addr: &str, token: String, mount: String) -> Result<Self, SecretError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            addr: addr.trim_end_matches('/').to_string(),
            token,
            mount: mount.trim_matches('/').to_string(),
        })
    }

    /// URL of `key` under the `data` or `metadata` tree.
    fn url(&self, tree: &str, key: &Identity) -> Result<String, SecretError> {
        check_segment(&key.namespace)?;
        check_segment(&key.name)?;
        Ok(format!(
            "{}/v1/{}/{}/{}/{}/{}",
            self.addr, self.mount, tree, PATH_PREFIX, key.namespace, key.name
        ))
    }

    async fn backend_error(resp: reqwest::Response) -> SecretError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        SecretError::Backend(format!("vault returned {status}: {body}"))
    }
}

#[async_trait]
impl SecretGateway for VaultSecretStore {
    async fn upsert(&self, key: &Identity, data: SecretData) -> Result<(), SecretError> {
        let url = self.url("data", key)?;
        let resp = self
            .client
            .post(&url)
            .header("X-Vault-Token", &self.token)
            .json(&json!({ "data": data }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::backend_error(resp).await);
        }
        debug!(key = %key, "secret written to vault");
        Ok(())
    }

    async fn get(&self, key: &Identity) -> Result<SecretData, SecretError> {
        let url = self.url("data", key)?;
        let resp = self
            .client
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(SecretError::NotFound(key.to_string())),
            s if s.is_success() => Ok(resp.json::<ReadResponse>().await?.data.data),
            _ => Err(Self::backend_error(resp).await),
        }
    }

    async fn delete(&self, key: &Identity) -> Result<(), SecretError> {
        let url = self.url("metadata", key)?;
        let resp = self
            .client
            .delete(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(()),
            s if s.is_success() => {
                debug!(key = %key, "secret removed from vault");
                Ok(())
            }
            _ => Err(Self::backend_error(resp).await),
        }
    }

    fn backend(&self) -> &'static str {
        "vault"
    }
}
