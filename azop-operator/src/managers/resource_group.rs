use async_trait::async_trait;
use azop_core::{ManagerError, ParentReference, Progress, ReconcileContext, ResourceRecord};
use serde_json::json;

use super::{CloudContext, KindManager, converge, teardown};
use crate::kind::{AzureSpec, Kind, ResourceGroupSpec};
use crate::naming;

pub struct ResourceGroupManager {
    cloud: CloudContext,
}

impl ResourceGroupManager {
    pub fn new(cloud: CloudContext) -> Self {
        Self { cloud }
    }
}

#[async_trait]
impl KindManager for ResourceGroupManager {
    type Spec = ResourceGroupSpec;

    async fn ensure(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &ResourceGroupSpec,
    ) -> Result<Progress, ManagerError> {
        naming::validate(Kind::ResourceGroup, &record.identity.name)?;
        let location = self.cloud.location(&spec.location);
        naming::require_location(location)?;

        let id = self.cloud.resource_group_id(&record.identity.name);
        converge(ctx, self.cloud.plane.as_ref(), &id, Some(location), json!({})).await
    }

    async fn delete(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        _spec: &ResourceGroupSpec,
    ) -> Result<Progress, ManagerError> {
        let id = self.cloud.resource_group_id(&record.identity.name);
        teardown(ctx, self.cloud.plane.as_ref(), &id).await
    }

    fn parents(
        &self,
        _record: &ResourceRecord<AzureSpec>,
        _spec: &ResourceGroupSpec,
    ) -> Vec<ParentReference<Kind>> {
        Vec::new()
    }
}
