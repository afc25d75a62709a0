//! Resource kinds the operator manages and their declared specs.

use std::fmt;

use azop_core::ResourceSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    ResourceGroup,
    EventhubNamespace,
    Eventhub,
    ConsumerGroup,
    StorageAccount,
    KeyVault,
}

impl Kind {
    pub const ALL: [Kind; 6] = [
        Kind::ResourceGroup,
        Kind::EventhubNamespace,
        Kind::Eventhub,
        Kind::ConsumerGroup,
        Kind::StorageAccount,
        Kind::KeyVault,
    ];
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::ResourceGroup => "ResourceGroup",
            Kind::EventhubNamespace => "EventhubNamespace",
            Kind::Eventhub => "Eventhub",
            Kind::ConsumerGroup => "ConsumerGroup",
            Kind::StorageAccount => "StorageAccount",
            Kind::KeyVault => "KeyVault",
        };
        f.write_str(s)
    }
}

/// Declared spec of one record, tagged by kind.
///
/// Serialized as `{"kind": "...", "spec": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "spec")]
pub enum AzureSpec {
    ResourceGroup(ResourceGroupSpec),
    EventhubNamespace(EventhubNamespaceSpec),
    Eventhub(EventhubSpec),
    ConsumerGroup(ConsumerGroupSpec),
    StorageAccount(StorageAccountSpec),
    KeyVault(KeyVaultSpec),
}

impl ResourceSpec for AzureSpec {
    type Kind = Kind;

    fn kind(&self) -> Kind {
        match self {
            AzureSpec::ResourceGroup(_) => Kind::ResourceGroup,
            AzureSpec::EventhubNamespace(_) => Kind::EventhubNamespace,
            AzureSpec::Eventhub(_) => Kind::Eventhub,
            AzureSpec::ConsumerGroup(_) => Kind::ConsumerGroup,
            AzureSpec::StorageAccount(_) => Kind::StorageAccount,
            AzureSpec::KeyVault(_) => Kind::KeyVault,
        }
    }
}

/// A per-kind spec type, extractable from the tagged enum.
pub trait TypedSpec: Send + Sync + 'static {
    const KIND: Kind;

    fn from_spec(spec: &AzureSpec) -> Option<&Self>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceGroupSpec {
    /// Empty selects the operator's default location.
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventhubNamespaceSpec {
    #[serde(default)]
    pub location: String,
    pub resource_group: String,
    #[serde(default = "default_eventhub_sku")]
    pub sku: String,
    /// Throughput units.
    #[serde(default = "one")]
    pub capacity: u32,
}

/// An eventhub has no location of its own; it lives in its namespace's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventhubSpec {
    pub resource_group: String,
    pub namespace: String,
    #[serde(default = "one")]
    pub partition_count: u32,
    #[serde(default = "one")]
    pub message_retention_days: u32,
    /// Shared access rule whose keys are published.
    #[serde(default = "default_authorization_rule")]
    pub authorization_rule: String,
    /// Name of the published secret; defaults to the record name.
    #[serde(default)]
    pub secret_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerGroupSpec {
    pub resource_group: String,
    pub namespace: String,
    pub eventhub: String,
    /// Cloud-side name; defaults to the record name.
    #[serde(default)]
    pub consumer_group_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageAccountSpec {
    #[serde(default)]
    pub location: String,
    pub resource_group: String,
    #[serde(default = "default_storage_sku")]
    pub sku: String,
    #[serde(default = "default_storage_kind")]
    pub account_kind: String,
    #[serde(default = "default_access_tier")]
    pub access_tier: String,
    #[serde(default = "yes")]
    pub https_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyVaultSpec {
    #[serde(default)]
    pub location: String,
    pub resource_group: String,
    /// Tenant owning the vault; defaults to the operator's tenant.
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default = "default_vault_sku")]
    pub sku: String,
}

fn one() -> u32 {
    1
}

fn yes() -> bool {
    true
}

fn default_eventhub_sku() -> String {
    "Standard".into()
}

fn default_authorization_rule() -> String {
    "RootManageSharedAccessKey".into()
}

fn default_storage_sku() -> String {
    "Standard_LRS".into()
}

fn default_storage_kind() -> String {
    "StorageV2".into()
}

fn default_access_tier() -> String {
    "Hot".into()
}

fn default_vault_sku() -> String {
    "standard".into()
}

impl TypedSpec for ResourceGroupSpec {
    const KIND: Kind = Kind::ResourceGroup;

    fn from_spec(spec: &AzureSpec) -> Option<&Self> {
        match spec {
            AzureSpec::ResourceGroup(s) => Some(s),
            _ => None,
        }
    }
}

impl TypedSpec for EventhubNamespaceSpec {
    const KIND: Kind = Kind::EventhubNamespace;

    fn from_spec(spec: &AzureSpec) -> Option<&Self> {
        match spec {
            AzureSpec::EventhubNamespace(s) => Some(s),
            _ => None,
        }
    }
}

impl TypedSpec for EventhubSpec {
    const KIND: Kind = Kind::Eventhub;

    fn from_spec(spec: &AzureSpec) -> Option<&Self> {
        match spec {
            AzureSpec::Eventhub(s) => Some(s),
            _ => None,
        }
    }
}

impl TypedSpec for ConsumerGroupSpec {
    const KIND: Kind = Kind::ConsumerGroup;

    fn from_spec(spec: &AzureSpec) -> Option<&Self> {
        match spec {
            AzureSpec::ConsumerGroup(s) => Some(s),
            _ => None,
        }
    }
}

impl TypedSpec for StorageAccountSpec {
    const KIND: Kind = Kind::StorageAccount;

    fn from_spec(spec: &AzureSpec) -> Option<&Self> {
        match spec {
            AzureSpec::StorageAccount(s) => Some(s),
            _ => None,
        }
    }
}

impl TypedSpec for KeyVaultSpec {
    const KIND: Kind = Kind::KeyVault;

    fn from_spec(spec: &AzureSpec) -> Option<&Self> {
        match spec {
            AzureSpec::KeyVault(s) => Some(s),
            _ => None,
        }
    }
}
