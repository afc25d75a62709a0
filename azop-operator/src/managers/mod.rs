//! Managers - one per resource kind.
//!
//! Each manager is written against its own typed spec through [`KindManager`];
//! [`Typed`] adapts it to the engine's `Manager<AzureSpec>` contract. The
//! registry built by [`build_registry`] keys every adapter by the kind of
//! the spec type it was constructed with, so routing and extraction cannot
//! disagree.

mod consumer_group;
mod eventhub;
mod eventhub_namespace;
mod key_vault;
mod resource_group;
mod storage_account;

pub use consumer_group::ConsumerGroupManager;
pub use eventhub::EventhubManager;
pub use eventhub_namespace::EventhubNamespaceManager;
pub use key_vault::KeyVaultManager;
pub use resource_group::ResourceGroupManager;
pub use storage_account::StorageAccountManager;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use azop_core::{
    Identity, Interrupted, Manager, ManagerError, ManagerRegistry, ParentReference, Progress,
    ReconcileContext, ResourceRecord,
};
use serde_json::Value;
use tracing::debug;

use crate::cloud::{CloudError, CloudResourceId, ControlPlane, ProvisioningState};
use crate::kind::{AzureSpec, Kind, TypedSpec};
use crate::secrets::SecretGateway;
use crate::settings::CloudSettings;

/// Handles shared by all managers.
#[derive(Clone)]
pub struct CloudContext {
    pub plane: Arc<dyn ControlPlane>,
    pub settings: Arc<CloudSettings>,
}

impl CloudContext {
    pub fn new(plane: Arc<dyn ControlPlane>, settings: CloudSettings) -> Self {
        Self {
            plane,
            settings: Arc::new(settings),
        }
    }

    pub fn resource_group_id(&self, resource_group: &str) -> CloudResourceId {
        CloudResourceId::resource_group(&self.settings.subscription_id, resource_group)
    }

    /// The declared location, or the default one when none is declared.
    pub fn location<'a>(&'a self, declared: &'a str) -> &'a str {
        if declared.is_empty() {
            &self.settings.default_location
        } else {
            declared
        }
    }
}

/// Manager for one kind, written against its typed spec.
#[async_trait]
pub trait KindManager: Send + Sync + 'static {
    type Spec: TypedSpec;

    async fn ensure(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &Self::Spec,
    ) -> Result<Progress, ManagerError>;

    async fn delete(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
        spec: &Self::Spec,
    ) -> Result<Progress, ManagerError>;

    fn parents(
        &self,
        record: &ResourceRecord<AzureSpec>,
        spec: &Self::Spec,
    ) -> Vec<ParentReference<Kind>>;
}

/// Adapter from a [`KindManager`] to the engine's manager contract.
pub struct Typed<M>(pub M);

impl<M: KindManager> Typed<M> {
    fn spec<'a>(&self, record: &'a ResourceRecord<AzureSpec>) -> Result<&'a M::Spec, ManagerError> {
        <M::Spec as TypedSpec>::from_spec(&record.spec).ok_or_else(|| {
            ManagerError::configuration(format!(
                "{} manager cannot handle a {} record",
                <M::Spec as TypedSpec>::KIND,
                record.kind()
            ))
        })
    }
}

#[async_trait]
impl<M: KindManager> Manager<AzureSpec> for Typed<M> {
    async fn ensure(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
    ) -> Result<Progress, ManagerError> {
        let spec = self.spec(record)?;
        self.0.ensure(ctx, record, spec).await
    }

    async fn delete(
        &self,
        ctx: &ReconcileContext,
        record: &ResourceRecord<AzureSpec>,
    ) -> Result<Progress, ManagerError> {
        let spec = self.spec(record)?;
        self.0.delete(ctx, record, spec).await
    }

    fn parents(
        &self,
        record: &ResourceRecord<AzureSpec>,
    ) -> Result<Vec<ParentReference<Kind>>, ManagerError> {
        let spec = self.spec(record)?;
        Ok(self.0.parents(record, spec))
    }
}

/// The registry with a manager for every kind.
pub fn build_registry(
    cloud: CloudContext,
    secrets: Arc<dyn SecretGateway>,
) -> ManagerRegistry<AzureSpec> {
    let mut registry = ManagerRegistry::new();
    register(&mut registry, ResourceGroupManager::new(cloud.clone()));
    register(&mut registry, EventhubNamespaceManager::new(cloud.clone()));
    register(
        &mut registry,
        EventhubManager::new(cloud.clone(), secrets.clone()),
    );
    register(&mut registry, ConsumerGroupManager::new(cloud.clone()));
    register(&mut registry, StorageAccountManager::new(cloud.clone(), secrets));
    register(&mut registry, KeyVaultManager::new(cloud));
    registry
}

fn register<M: KindManager>(registry: &mut ManagerRegistry<AzureSpec>, manager: M) {
    registry.register(<M::Spec as TypedSpec>::KIND, Arc::new(Typed(manager)));
}

/// Parent in the same namespace as `record`.
pub(crate) fn parent(
    record: &ResourceRecord<AzureSpec>,
    name: &str,
    kind: Kind,
) -> ParentReference<Kind> {
    ParentReference::new(Identity::new(record.identity.namespace.clone(), name), kind)
}

fn interrupted(e: Interrupted) -> ManagerError {
    ManagerError::transient(format!("control plane call: {e}"))
}

/// Run one control-plane call under the reconcile's call budget.
pub(crate) async fn bounded<T, F>(ctx: &ReconcileContext, fut: F) -> Result<T, ManagerError>
where
    F: Future<Output = Result<T, CloudError>>,
{
    ctx.call(fut).await.map_err(interrupted)?.map_err(ManagerError::from)
}

fn progress(state: ProvisioningState) -> Progress {
    if state.is_settled() {
        Progress::Complete
    } else {
        Progress::InProgress
    }
}

/// Drive `id` towards `properties`.
///
/// Reads first and only starts an operation when the resource is missing or
/// differs, so repeated calls never stack operations.
pub(crate) async fn converge(
    ctx: &ReconcileContext,
    plane: &dyn ControlPlane,
    id: &CloudResourceId,
    location: Option<&str>,
    properties: Value,
) -> Result<Progress, ManagerError> {
    if let Some(current) = bounded(ctx, plane.get(id)).await? {
        match current.provisioning_state {
            ProvisioningState::Creating | ProvisioningState::Updating => {
                debug!(id = %id, state = ?current.provisioning_state, "operation in flight");
                return Ok(Progress::InProgress);
            }
            ProvisioningState::Deleting => {
                return Err(ManagerError::transient(format!(
                    "{id} is still being deleted"
                )));
            }
            ProvisioningState::Succeeded
                if current.properties == properties
                    && (location.is_none() || current.location.as_deref() == location) =>
            {
                return Ok(Progress::Complete);
            }
            ProvisioningState::Succeeded => {}
        }
    }

    let resource = bounded(ctx, plane.begin_create_or_update(id, location, properties)).await?;
    Ok(progress(resource.provisioning_state))
}

/// Tear `id` down. A resource that does not exist counts as deleted.
pub(crate) async fn teardown(
    ctx: &ReconcileContext,
    plane: &dyn ControlPlane,
    id: &CloudResourceId,
) -> Result<Progress, ManagerError> {
    match bounded(ctx, plane.get(id)).await? {
        None => return Ok(Progress::Complete),
        Some(r) if r.provisioning_state == ProvisioningState::Deleting => {
            return Ok(Progress::InProgress);
        }
        Some(_) => {}
    }

    match ctx.call(plane.begin_delete(id)).await.map_err(interrupted)? {
        Ok(None) | Err(CloudError::NotFound(_)) => Ok(Progress::Complete),
        Ok(Some(_)) => Ok(Progress::InProgress),
        Err(e) => Err(e.into()),
    }
}
