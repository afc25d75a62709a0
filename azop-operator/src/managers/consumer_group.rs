use async_trait::async_trait;
use azop_core::{ManagerError, ParentReference, Progress, ReconcileContext, ResourceRecord};
use serde_json::json;

use super::{CloudContext, KindManager, converge, parent, teardown};
use crate::cloud::CloudResourceId;
use crate::kind::{AzureSpec, ConsumerGroupSpec, Kind};
use crate::naming;

pub struct ConsumerGroupManager {
    cloud: CloudContext,
}

impl ConsumerGroupManager {
    pub fn new(cloud: CloudContext) -> Self {
        Self { cloud }
    }

    fn name<'a>(record: &'a ResourceRecord<AzureSpec>, spec: &'a ConsumerGroupSpec) -> &'a str {
        spec.consumer_group_name
            .as_deref()
            .unwrap_or(&record.identity.name)
    }

    fn id(&self, record: &ResourceRecord<AzureSpec>, spec: &ConsumerGroupSpec) -> CloudResourceId {
        self.cloud
            .resource_group_id(&spec.resource_group)
            .provider_resource("Microsoft.EventHub", "namespaces", &spec.namespace)
            .child("eventhubs", &spec.eventhub)
            .child("consumergroups", Self::name(record, spec))
    }
}

#[async_trait]
impl KindManager for ConsumerGroupManager {
    type Spec = ConsumerGroupSpec;

    async fn ensure(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &ConsumerGroupSpec,
    ) -> Result<Progress, ManagerError> {
        naming::validate(Kind::ConsumerGroup, Self::name(record, spec))?;
        let id = self.id(record, spec);
        converge(ctx, self.cloud.plane.as_ref(), &id, None, json!({})).await
    }

    async fn delete(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &ConsumerGroupSpec,
    ) -> Result<Progress, ManagerError> {
        teardown(ctx, self.cloud.plane.as_ref(), &self.id(record, spec)).await
    }

    fn parents(
        &self,
        record: &ResourceRecord<AzureSpec>,
        spec: &ConsumerGroupSpec,
    ) -> Vec<ParentReference<Kind>> {
        vec![
            parent(record, &spec.eventhub, Kind::Eventhub),
            parent(record, &spec.namespace, Kind::EventhubNamespace),
            parent(record, &spec.resource_group, Kind::ResourceGroup),
        ]
    }
}
