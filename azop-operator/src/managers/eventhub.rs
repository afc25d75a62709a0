//! Event hubs, their shared access rule and the published connection secret.
//!
//! The hub and the rule converge first; keys are read and published only
//! once both settled, and the secret is rewritten on every complete pass.

use std::sync::Arc;

use async_trait::async_trait;
use azop_core::{
    Identity, ManagerError, ParentReference, Progress, ReconcileContext, ResourceRecord,
};
use serde_json::json;
use tracing::info;

use super::{CloudContext, KindManager, bounded, converge, parent, teardown};
use crate::cloud::CloudResourceId;
use crate::kind::{AzureSpec, EventhubSpec, Kind};
use crate::naming;
use crate::secrets::{SecretData, SecretGateway};

pub struct EventhubManager {
    cloud: CloudContext,
    secrets: Arc<dyn SecretGateway>,
}

impl EventhubManager {
    pub fn new(cloud: CloudContext, secrets: Arc<dyn SecretGateway>) -> Self {
        Self { cloud, secrets }
    }

    fn id(&self, record: &ResourceRecord<AzureSpec>, spec: &EventhubSpec) -> CloudResourceId {
        self.cloud
            .resource_group_id(&spec.resource_group)
            .provider_resource("Microsoft.EventHub", "namespaces", &spec.namespace)
            .child("eventhubs", &record.identity.name)
    }

    fn secret_key(record: &ResourceRecord<AzureSpec>, spec: &EventhubSpec) -> Identity {
        let name = spec.secret_name.as_deref().unwrap_or(&record.identity.name);
        Identity::new(record.identity.namespace.clone(), name)
    }
}

#[async_trait]
impl KindManager for EventhubManager {
    type Spec = EventhubSpec;

    async fn ensure(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &EventhubSpec,
    ) -> Result<Progress, ManagerError> {
        naming::validate(Kind::Eventhub, &record.identity.name)?;
        naming::require_range("partition_count", spec.partition_count, 1, 32)?;
        naming::require_range("message_retention_days", spec.message_retention_days, 1, 7)?;
        if spec.authorization_rule.is_empty() {
            return Err(ManagerError::configuration("authorization_rule must not be empty"));
        }

        let plane = self.cloud.plane.as_ref();
        let id = self.id(record, spec);
        let properties = json!({
            "partitionCount": spec.partition_count,
            "messageRetentionInDays": spec.message_retention_days,
        });
        if converge(ctx, plane, &id, None, properties).await? == Progress::InProgress {
            return Ok(Progress::InProgress);
        }

        let rule = id.child("authorizationRules", &spec.authorization_rule);
        let rights = json!({ "rights": ["Listen", "Send", "Manage"] });
        if converge(ctx, plane, &rule, None, rights).await? == Progress::InProgress {
            return Ok(Progress::InProgress);
        }

        let keys = bounded(ctx, plane.list_keys(&rule)).await?;
        let data = SecretData::from([
            ("primaryConnectionString".to_string(), keys.primary_connection_string),
            ("secondaryConnectionString".to_string(), keys.secondary_connection_string),
            ("primaryKey".to_string(), keys.primary_key),
            ("secondaryKey".to_string(), keys.secondary_key),
            ("sharedaccessKey".to_string(), keys.key_name),
            ("eventhubNamespace".to_string(), spec.namespace.clone()),
            ("eventhubName".to_string(), record.identity.name.clone()),
        ]);
        let key = Self::secret_key(record, spec);
        self.secrets.upsert(&key, data).await?;
        info!(secret = %key, backend = self.secrets.backend(), "eventhub credentials published");

        Ok(Progress::Complete)
    }

    async fn delete(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &EventhubSpec,
    ) -> Result<Progress, ManagerError> {
        let progress = teardown(ctx, self.cloud.plane.as_ref(), &self.id(record, spec)).await?;
        if progress == Progress::Complete {
            self.secrets.delete(&Self::secret_key(record, spec)).await?;
        }
        Ok(progress)
    }

    fn parents(
        &self,
        record: &ResourceRecord<AzureSpec>,
        spec: &EventhubSpec,
    ) -> Vec<ParentReference<Kind>> {
        vec![
            parent(record, &spec.namespace, Kind::EventhubNamespace),
            parent(record, &spec.resource_group, Kind::ResourceGroup),
        ]
    }
}
