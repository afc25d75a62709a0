use async_trait::async_trait;
use azop_core::{ManagerError, ParentReference, Progress, ReconcileContext, ResourceRecord};
use serde_json::json;

use super::{CloudContext, KindManager, converge, parent, teardown};
use crate::cloud::CloudResourceId;
use crate::kind::{AzureSpec, EventhubNamespaceSpec, Kind};
use crate::naming;

const SKUS: &[&str] = &["Basic", "Standard", "Premium"];

pub struct EventhubNamespaceManager {
    cloud: CloudContext,
}

impl EventhubNamespaceManager {
    pub fn new(cloud: CloudContext) -> Self {
        Self { cloud }
    }

    fn id(&self, record: &ResourceRecord<AzureSpec>, spec: &EventhubNamespaceSpec) -> CloudResourceId {
        self.cloud
            .resource_group_id(&spec.resource_group)
            .provider_resource("Microsoft.EventHub", "namespaces", &record.identity.name)
    }
}

#[async_trait]
impl KindManager for EventhubNamespaceManager {
    type Spec = EventhubNamespaceSpec;

    async fn ensure(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &EventhubNamespaceSpec,
    ) -> Result<Progress, ManagerError> {
        naming::validate(Kind::EventhubNamespace, &record.identity.name)?;
        naming::require_one_of("sku", &spec.sku, SKUS)?;
        naming::require_range("capacity", spec.capacity, 1, 20)?;
        let location = self.cloud.location(&spec.location);
        naming::require_location(location)?;

        let properties = json!({
            "sku": { "name": spec.sku, "capacity": spec.capacity },
        });
        let id = self.id(record, spec);
        converge(ctx, self.cloud.plane.as_ref(), &id, Some(location), properties).await
    }

    async fn delete(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &EventhubNamespaceSpec,
    ) -> Result<Progress, ManagerError> {
        teardown(ctx, self.cloud.plane.as_ref(), &self.id(record, spec)).await
    }

    fn parents(
        &self,
        record: &ResourceRecord<AzureSpec>,
        spec: &EventhubNamespaceSpec,
    ) -> Vec<ParentReference<Kind>> {
        vec![parent(record, &spec.resource_group, Kind::ResourceGroup)]
    }
}
