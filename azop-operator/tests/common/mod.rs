//! Shared test utilities for azop-operator integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use azop_core::{
    BackoffPolicy, EngineConfig, Identity, LifecycleState, MemoryStore, NoopSink, Outcome,
    ReconcileContext, ReconcileEngine, ReconcileRequest, RecordStore, ResourceStatus,
};
use azop_operator::kind::{
    ConsumerGroupSpec, EventhubNamespaceSpec, EventhubSpec, ResourceGroupSpec, StorageAccountSpec,
};
use azop_operator::secrets::LocalSecretStore;
use azop_operator::{AzureSpec, CloudContext, CloudSettings, SimulatedControlPlane, build_registry};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const NS: &str = "default";
pub const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000001";

pub fn id(name: &str) -> Identity {
    Identity::new(NS, name)
}

pub fn settings() -> CloudSettings {
    CloudSettings {
        subscription_id: SUBSCRIPTION.into(),
        tenant_id: "tenant".into(),
        default_location: "westeurope".into(),
        operator_keyvault: None,
    }
}

pub fn config() -> EngineConfig {
    EngineConfig {
        workers: 4,
        request_timeout: Duration::from_secs(30),
        call_timeout: Duration::from_secs(5),
        backoff: BackoffPolicy {
            base: Duration::from_millis(20),
            max_delay: Duration::from_millis(200),
            cap_exponent: 4,
            jitter: 0.0,
            soft_wait: Duration::from_millis(20),
            poll: Duration::from_millis(20),
        },
        max_unknown_retries: 3,
        conflict_retries: 2,
        resync_interval: Duration::from_secs(60),
    }
}

// =============================================================================
// Specs
// =============================================================================

pub fn group() -> AzureSpec {
    AzureSpec::ResourceGroup(ResourceGroupSpec {
        location: String::new(),
    })
}

pub fn namespace(group: &str) -> AzureSpec {
    AzureSpec::EventhubNamespace(EventhubNamespaceSpec {
        location: String::new(),
        resource_group: group.into(),
        sku: "Standard".into(),
        capacity: 1,
    })
}

pub fn eventhub(group: &str, namespace: &str) -> AzureSpec {
    AzureSpec::Eventhub(EventhubSpec {
        resource_group: group.into(),
        namespace: namespace.into(),
        partition_count: 2,
        message_retention_days: 1,
        authorization_rule: "RootManageSharedAccessKey".into(),
        secret_name: None,
    })
}

pub fn consumer_group(group: &str, namespace: &str, eventhub: &str) -> AzureSpec {
    AzureSpec::ConsumerGroup(ConsumerGroupSpec {
        resource_group: group.into(),
        namespace: namespace.into(),
        eventhub: eventhub.into(),
        consumer_group_name: None,
    })
}

pub fn storage_account(group: &str) -> AzureSpec {
    AzureSpec::StorageAccount(StorageAccountSpec {
        location: String::new(),
        resource_group: group.into(),
        sku: "Standard_LRS".into(),
        account_kind: "StorageV2".into(),
        access_tier: "Hot".into(),
        https_only: true,
    })
}

// =============================================================================
// Operator harness
// =============================================================================

/// Engine wired to a simulated control plane and a local secret store.
pub struct Operator {
    pub plane: Arc<SimulatedControlPlane>,
    pub secrets: Arc<LocalSecretStore>,
    pub store: Arc<MemoryStore<AzureSpec>>,
    pub engine: Arc<ReconcileEngine<AzureSpec>>,
    _dir: TempDir,
}

impl Operator {
    pub fn new(lro_polls: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let plane = Arc::new(SimulatedControlPlane::new(lro_polls));
        let secrets = Arc::new(LocalSecretStore::new(dir.path()));
        let store = Arc::new(MemoryStore::new());
        let registry = build_registry(
            CloudContext::new(plane.clone(), settings()),
            secrets.clone(),
        );
        let engine = Arc::new(ReconcileEngine::new(
            store.clone(),
            registry,
            Arc::new(NoopSink),
            &config(),
        ));
        Self {
            plane,
            secrets,
            store,
            engine,
            _dir: dir,
        }
    }

    pub async fn declare(&self, name: &str, spec: AzureSpec) {
        self.store.apply(id(name), spec).await;
    }

    /// Reconcile `name` at its current generation, the way the dispatcher would.
    pub async fn reconcile(&self, name: &str) -> Outcome {
        let Some(record) = self.store.get(&id(name)).await.unwrap() else {
            return Outcome::done();
        };
        let request = if record.deletion_requested {
            ReconcileRequest::delete(record.identity, record.generation)
        } else {
            ReconcileRequest::upsert(record.identity, record.generation)
        };
        let ctx = ReconcileContext::new(
            Duration::from_secs(30),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        self.engine.reconcile(&ctx, &request).await
    }

    /// Reconcile `names` in order for `rounds` passes.
    pub async fn settle(&self, names: &[&str], rounds: usize) {
        for _ in 0..rounds {
            for name in names {
                self.reconcile(name).await;
            }
        }
    }

    pub async fn status(&self, name: &str) -> Option<ResourceStatus> {
        self.store
            .get(&id(name))
            .await
            .unwrap()
            .map(|r| r.status)
    }

    pub async fn state(&self, name: &str) -> Option<LifecycleState> {
        self.status(name).await.map(|s| s.state)
    }
}
