//! Cloud control-plane contract and an in-process simulation of it.
//!
//! Resources are addressed by hierarchical ids
//! (`/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}/...`).
//! Mutations are long-running operations: `begin_*` starts them and later
//! `get` calls observe their progress.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use async_trait::async_trait;
use azop_core::{ErrorKind, ManagerError};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Hierarchical resource id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CloudResourceId {
    pub subscription: String,
    pub resource_group: String,
    /// Provider namespace, e.g. `Microsoft.EventHub`. `None` for the resource group itself.
    pub provider: Option<String>,
    /// `(type, name)` pairs below the provider, outermost first.
    pub segments: Vec<(String, String)>,
}

impl CloudResourceId {
    pub fn resource_group(subscription: &str, resource_group: &str) -> Self {
        Self {
            subscription: subscription.to_string(),
            resource_group: resource_group.to_string(),
            provider: None,
            segments: Vec::new(),
        }
    }

    /// A top-level resource of `provider` inside this resource group.
    pub fn provider_resource(&self, provider: &str, kind: &str, name: &str) -> Self {
        Self {
            subscription: self.subscription.clone(),
            resource_group: self.resource_group.clone(),
            provider: Some(provider.to_string()),
            segments: vec![(kind.to_string(), name.to_string())],
        }
    }

    /// A nested resource below this one.
    pub fn child(&self, kind: &str, name: &str) -> Self {
        let mut id = self.clone();
        id.segments.push((kind.to_string(), name.to_string()));
        id
    }

    /// Id of the enclosing resource. `None` for a resource group.
    pub fn parent(&self) -> Option<Self> {
        let mut id = self.clone();
        match id.segments.len() {
            0 => None,
            1 => {
                id.segments.clear();
                id.provider = None;
                Some(id)
            }
            _ => {
                id.segments.pop();
                Some(id)
            }
        }
    }

    pub fn name(&self) -> &str {
        self.segments
            .last()
            .map(|(_, name)| name.as_str())
            .unwrap_or(&self.resource_group)
    }

    pub fn is_resource_group(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for CloudResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription, self.resource_group
        )?;
        if let Some(provider) = &self.provider {
            write!(f, "/providers/{provider}")?;
        }
        for (kind, name) in &self.segments {
            write!(f, "/{kind}/{name}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Creating,
    Updating,
    Succeeded,
    Deleting,
}

impl ProvisioningState {
    pub fn is_settled(self) -> bool {
        self == ProvisioningState::Succeeded
    }
}

/// A resource as reported by the control plane.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudResource {
    pub id: CloudResourceId,
    pub location: Option<String>,
    pub properties: Value,
    pub provisioning_state: ProvisioningState,
}

/// Shared access keys of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeys {
    pub key_name: String,
    pub primary_key: String,
    pub secondary_key: String,
    pub primary_connection_string: String,
    pub secondary_connection_string: String,
}

/// Errors returned by the control plane.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CloudError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("throttled: {0}")]
    Throttled(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CloudError {
    /// Retry class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::NotFound(_)
            | CloudError::Throttled(_)
            | CloudError::Unavailable(_)
            | CloudError::Timeout(_)
            | CloudError::Conflict(_) => ErrorKind::Transient,
            CloudError::BadRequest(_) => ErrorKind::Configuration,
            CloudError::Forbidden(_) => ErrorKind::Permission,
            CloudError::Internal(_) => ErrorKind::Unknown,
        }
    }
}

impl From<CloudError> for ManagerError {
    fn from(e: CloudError) -> Self {
        ManagerError::new(e.kind(), e.to_string())
    }
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Current state of `id`, `None` if it does not exist.
    async fn get(&self, id: &CloudResourceId) -> Result<Option<CloudResource>, CloudError>;

    /// Start creating or updating `id`. Idempotent for unchanged properties.
    async fn begin_create_or_update(
        &self,
        id: &CloudResourceId,
        location: Option<&str>,
        properties: Value,
    ) -> Result<CloudResource, CloudError>;

    /// Start deleting `id`. Returns the resource while teardown is in flight,
    /// `None` once it is gone. Fails with `NotFound` if it never existed.
    async fn begin_delete(&self, id: &CloudResourceId)
    -> Result<Option<CloudResource>, CloudError>;

    async fn list_keys(&self, id: &CloudResourceId) -> Result<AccessKeys, CloudError>;
}

/// Operation selector for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    CreateOrUpdate,
    Delete,
    ListKeys,
}

struct Entry {
    resource: CloudResource,
    /// Polls left until the in-flight operation settles.
    remaining: u32,
    keys: AccessKeys,
}

struct Fault {
    operation: Operation,
    name: Option<String>,
    error: CloudError,
}

#[derive(Default)]
struct Inner {
    resources: BTreeMap<CloudResourceId, Entry>,
    faults: VecDeque<Fault>,
    mutations: u64,
}

/// In-memory control plane.
///
/// Every operation takes `lro_polls` further `get` calls to settle; zero
/// settles immediately. Faults queued with `inject` fail the next matching
/// call.
pub struct SimulatedControlPlane {
    inner: Mutex<Inner>,
    lro_polls: u32,
}

impl SimulatedControlPlane {
    pub fn new(lro_polls: u32) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            lro_polls,
        }
    }

    /// Fail the next `operation` (optionally only on resources named `name`) with `error`.
    pub async fn inject(&self, operation: Operation, name: Option<&str>, error: CloudError) {
        self.inner.lock().await.faults.push_back(Fault {
            operation,
            name: name.map(str::to_string),
            error,
        });
    }

    /// Number of create, update and delete operations started so far.
    pub async fn mutations(&self) -> u64 {
        self.inner.lock().await.mutations
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.resources.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of a resource without advancing its operation.
    pub async fn peek(&self, id: &CloudResourceId) -> Option<CloudResource> {
        self.inner
            .lock()
            .await
            .resources
            .get(id)
            .map(|e| e.resource.clone())
    }

    fn take_fault(inner: &mut Inner, operation: Operation, id: &CloudResourceId) -> Option<CloudError> {
        let pos = inner.faults.iter().position(|f| {
            f.operation == operation && f.name.as_deref().is_none_or(|n| n == id.name())
        })?;
        inner.faults.remove(pos).map(|f| f.error)
    }

    /// Drop `id` and everything nested below it.
    fn purge(inner: &mut Inner, id: &CloudResourceId) {
        inner.resources.retain(|other, _| !is_within(other, id));
    }
}

/// Whether `id` equals `ancestor` or is nested below it.
fn is_within(id: &CloudResourceId, ancestor: &CloudResourceId) -> bool {
    if id.subscription != ancestor.subscription || id.resource_group != ancestor.resource_group {
        return false;
    }
    if ancestor.is_resource_group() {
        return true;
    }
    id.provider == ancestor.provider && id.segments.starts_with(&ancestor.segments)
}

fn generate_keys(id: &CloudResourceId) -> AccessKeys {
    let primary = uuid::Uuid::new_v4().simple().to_string();
    let secondary = uuid::Uuid::new_v4().simple().to_string();
    let key_name = id.name().to_string();
    // Endpoints are named after the top-level resource, e.g. the namespace.
    let host = id.segments.first().map_or(id.name(), |(_, name)| name.as_str());
    let endpoint = format!("sb://{host}.simulated.local/");
    AccessKeys {
        primary_connection_string: format!(
            "Endpoint={endpoint};SharedAccessKeyName={key_name};SharedAccessKey={primary}"
        ),
        secondary_connection_string: format!(
            "Endpoint={endpoint};SharedAccessKeyName={key_name};SharedAccessKey={secondary}"
        ),
        key_name,
        primary_key: primary,
        secondary_key: secondary,
    }
}

#[async_trait]
impl ControlPlane for SimulatedControlPlane {
    async fn get(&self, id: &CloudResourceId) -> Result<Option<CloudResource>, CloudError> {
        let mut inner = self.inner.lock().await;
        if let Some(e) = Self::take_fault(&mut inner, Operation::Get, id) {
            return Err(e);
        }

        let Some(entry) = inner.resources.get_mut(id) else {
            return Ok(None);
        };
        if entry.resource.provisioning_state.is_settled() {
            return Ok(Some(entry.resource.clone()));
        }

        entry.remaining = entry.remaining.saturating_sub(1);
        if entry.remaining > 0 {
            return Ok(Some(entry.resource.clone()));
        }
        if entry.resource.provisioning_state == ProvisioningState::Deleting {
            debug!(id = %id, "delete settled");
            Self::purge(&mut inner, id);
            return Ok(None);
        }
        entry.resource.provisioning_state = ProvisioningState::Succeeded;
        debug!(id = %id, "operation settled");
        Ok(Some(entry.resource.clone()))
    }

    async fn begin_create_or_update(
        &self,
        id: &CloudResourceId,
        location: Option<&str>,
        properties: Value,
    ) -> Result<CloudResource, CloudError> {
        let mut inner = self.inner.lock().await;
        if let Some(e) = Self::take_fault(&mut inner, Operation::CreateOrUpdate, id) {
            return Err(e);
        }

        if let Some(parent) = id.parent() {
            match inner.resources.get(&parent) {
                Some(p) if p.resource.provisioning_state != ProvisioningState::Deleting => {}
                _ => return Err(CloudError::NotFound(format!("parent {parent} does not exist"))),
            }
        }

        let location = location.map(str::to_string);
        let lro_polls = self.lro_polls;
        let settled = |creating| {
            if lro_polls == 0 {
                ProvisioningState::Succeeded
            } else if creating {
                ProvisioningState::Creating
            } else {
                ProvisioningState::Updating
            }
        };

        match inner.resources.get_mut(id) {
            Some(entry) => match entry.resource.provisioning_state {
                ProvisioningState::Deleting => {
                    return Err(CloudError::Conflict(format!("{id} is being deleted")));
                }
                ProvisioningState::Succeeded
                    if entry.resource.properties == properties
                        && entry.resource.location == location =>
                {
                    return Ok(entry.resource.clone());
                }
                _ => {
                    if entry.resource.location.is_some() && entry.resource.location != location {
                        return Err(CloudError::BadRequest(format!(
                            "location of {id} cannot be changed"
                        )));
                    }
                    entry.resource.properties = properties;
                    entry.resource.provisioning_state = settled(false);
                    entry.remaining = lro_polls;
                }
            },
            None => {
                let resource = CloudResource {
                    id: id.clone(),
                    location,
                    properties,
                    provisioning_state: settled(true),
                };
                inner.resources.insert(
                    id.clone(),
                    Entry {
                        resource,
                        remaining: lro_polls,
                        keys: generate_keys(id),
                    },
                );
            }
        }
        inner.mutations += 1;
        debug!(id = %id, "create or update started");

        inner
            .resources
            .get(id)
            .map(|e| e.resource.clone())
            .ok_or_else(|| CloudError::Internal(format!("{id} vanished")))
    }

    async fn begin_delete(
        &self,
        id: &CloudResourceId,
    ) -> Result<Option<CloudResource>, CloudError> {
        let mut inner = self.inner.lock().await;
        if let Some(e) = Self::take_fault(&mut inner, Operation::Delete, id) {
            return Err(e);
        }

        let lro_polls = self.lro_polls;
        let Some(entry) = inner.resources.get_mut(id) else {
            return Err(CloudError::NotFound(id.to_string()));
        };
        if entry.resource.provisioning_state == ProvisioningState::Deleting {
            return Ok(Some(entry.resource.clone()));
        }
        if lro_polls == 0 {
            Self::purge(&mut inner, id);
            inner.mutations += 1;
            return Ok(None);
        }
        entry.resource.provisioning_state = ProvisioningState::Deleting;
        entry.remaining = lro_polls;
        let resource = entry.resource.clone();
        inner.mutations += 1;
        debug!(id = %id, "delete started");
        Ok(Some(resource))
    }

    async fn list_keys(&self, id: &CloudResourceId) -> Result<AccessKeys, CloudError> {
        let mut inner = self.inner.lock().await;
        if let Some(e) = Self::take_fault(&mut inner, Operation::ListKeys, id) {
            return Err(e);
        }
        match inner.resources.get(id) {
            Some(entry) if entry.resource.provisioning_state.is_settled() => Ok(entry.keys.clone()),
            Some(_) => Err(CloudError::Conflict(format!("{id} is not provisioned"))),
            None => Err(CloudError::NotFound(id.to_string())),
        }
    }
}
