//! Storage accounts. Account keys are published as a secret named
//! `storageaccount-<name>` next to the record.

use std::sync::Arc;

use async_trait::async_trait;
use azop_core::{
    Identity, ManagerError, ParentReference, Progress, ReconcileContext, ResourceRecord,
};
use serde_json::json;
use tracing::info;

use super::{CloudContext, KindManager, bounded, converge, parent, teardown};
use crate::cloud::CloudResourceId;
use crate::kind::{AzureSpec, Kind, StorageAccountSpec};
use crate::naming;
use crate::secrets::{SecretData, SecretGateway};

const SKUS: &[&str] = &[
    "Standard_LRS",
    "Standard_GRS",
    "Standard_RAGRS",
    "Standard_ZRS",
    "Premium_LRS",
];
const ACCOUNT_KINDS: &[&str] = &["StorageV2", "Storage", "BlobStorage"];
const ACCESS_TIERS: &[&str] = &["Hot", "Cool"];

pub struct StorageAccountManager {
    cloud: CloudContext,
    secrets: Arc<dyn SecretGateway>,
}

impl StorageAccountManager {
    pub fn new(cloud: CloudContext, secrets: Arc<dyn SecretGateway>) -> Self {
        Self { cloud, secrets }
    }

    fn id(&self, record: &ResourceRecord<AzureSpec>, spec: &StorageAccountSpec) -> CloudResourceId {
        self.cloud
            .resource_group_id(&spec.resource_group)
            .provider_resource("Microsoft.Storage", "storageAccounts", &record.identity.name)
    }

    fn secret_key(record: &ResourceRecord<AzureSpec>) -> Identity {
        Identity::new(
            record.identity.namespace.clone(),
            format!("storageaccount-{}", record.identity.name),
        )
    }
}

fn connection_string(account: &str, key: &str) -> String {
    format!(
        "DefaultEndpointsProtocol=https;AccountName={account};AccountKey={key};EndpointSuffix=core.windows.net"
    )
}

#[async_trait]
impl KindManager for StorageAccountManager {
    type Spec = StorageAccountSpec;

    async fn ensure(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &StorageAccountSpec,
    ) -> Result<Progress, ManagerError> {
        naming::validate(Kind::StorageAccount, &record.identity.name)?;
        naming::require_one_of("sku", &spec.sku, SKUS)?;
        naming::require_one_of("account_kind", &spec.account_kind, ACCOUNT_KINDS)?;
        naming::require_one_of("access_tier", &spec.access_tier, ACCESS_TIERS)?;
        let location = self.cloud.location(&spec.location);
        naming::require_location(location)?;

        let plane = self.cloud.plane.as_ref();
        let id = self.id(record, spec);
        let properties = json!({
            "sku": { "name": spec.sku },
            "kind": spec.account_kind,
            "accessTier": spec.access_tier,
            "supportsHttpsTrafficOnly": spec.https_only,
        });
        if converge(ctx, plane, &id, Some(location), properties).await? == Progress::InProgress {
            return Ok(Progress::InProgress);
        }

        let keys = bounded(ctx, plane.list_keys(&id)).await?;
        let account = &record.identity.name;
        let data = SecretData::from([
            ("StorageAccountName".to_string(), account.clone()),
            ("connectionString0".to_string(), connection_string(account, &keys.primary_key)),
            ("connectionString1".to_string(), connection_string(account, &keys.secondary_key)),
            ("key0".to_string(), keys.primary_key),
            ("key1".to_string(), keys.secondary_key),
        ]);
        let key = Self::secret_key(record);
        self.secrets.upsert(&key, data).await?;
        info!(secret = %key, backend = self.secrets.backend(), "storage account keys published");

        Ok(Progress::Complete)
    }

    async fn delete(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &StorageAccountSpec,
    ) -> Result<Progress, ManagerError> {
        let progress = teardown(ctx, self.cloud.plane.as_ref(), &self.id(record, spec)).await?;
        if progress == Progress::Complete {
            self.secrets.delete(&Self::secret_key(record)).await?;
        }
        Ok(progress)
    }

    fn parents(
        &self,
        record: &ResourceRecord<AzureSpec>,
        spec: &StorageAccountSpec,
    ) -> Vec<ParentReference<Kind>> {
        vec![parent(record, &spec.resource_group, Kind::ResourceGroup)]
    }
}
