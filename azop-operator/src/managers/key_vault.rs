use async_trait::async_trait;
use azop_core::{ManagerError, ParentReference, Progress, ReconcileContext, ResourceRecord};
use serde_json::json;

use super::{CloudContext, KindManager, converge, parent, teardown};
use crate::cloud::CloudResourceId;
use crate::kind::{AzureSpec, Kind, KeyVaultSpec};
use crate::naming;

const SKUS: &[&str] = &["standard", "premium"];

pub struct KeyVaultManager {
    cloud: CloudContext,
}

impl KeyVaultManager {
    pub fn new(cloud: CloudContext) -> Self {
        Self { cloud }
    }

    fn id(&self, record: &ResourceRecord<AzureSpec>, spec: &KeyVaultSpec) -> CloudResourceId {
        self.cloud
            .resource_group_id(&spec.resource_group)
            .provider_resource("Microsoft.KeyVault", "vaults", &record.identity.name)
    }
}

#[async_trait]
impl KindManager for KeyVaultManager {
    type Spec = KeyVaultSpec;

    async fn ensure(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &KeyVaultSpec,
    ) -> Result<Progress, ManagerError> {
        naming::validate(Kind::KeyVault, &record.identity.name)?;
        naming::require_one_of("sku", &spec.sku, SKUS)?;
        let location = self.cloud.location(&spec.location);
        naming::require_location(location)?;

        let tenant = spec
            .tenant_id
            .as_deref()
            .unwrap_or(&self.cloud.settings.tenant_id);
        let properties = json!({
            "tenantId": tenant,
            "sku": { "family": "A", "name": spec.sku.to_ascii_lowercase() },
        });
        let id = self.id(record, spec);
        converge(ctx, self.cloud.plane.as_ref(), &id, Some(location), properties).await
    }

    async fn delete(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &KeyVaultSpec,
    ) -> Result<Progress, ManagerError> {
        teardown(ctx, self.cloud.plane.as_ref(), &self.id(record, spec)).await
    }

    fn parents(
        &self,
        record: &ResourceRecord<AzureSpec>,
        spec: &KeyVaultSpec,
    ) -> Vec<ParentReference<Kind>> {
        vec![parent(record, &spec.resource_group, Kind::ResourceGroup)]
    }
}
