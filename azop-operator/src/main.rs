use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use azop_core::{AuditSink, Dispatcher, EngineConfig, MemoryStore, ReconcileEngine};
use azop_operator::secrets::{self, SecretBackend};
use azop_operator::{
    AzureSpec, CloudContext, CloudSettings, ControlPlane, Manifest, SimulatedControlPlane,
    build_registry, sync_manifest,
};

#[derive(Parser)]
#[command(name = "azop-operator")]
#[command(about = "azop operator - reconciles declared cloud resources against the control plane")]
struct Args {
    /// Declaration manifest (JSON), re-read every resync interval
    #[arg(short, long, default_value = "/etc/azop/manifest.json")]
    manifest: PathBuf,

    /// Engine configuration file (JSON); flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of reconcile workers
    #[arg(long)]
    workers: Option<usize>,

    /// Deadline of one reconcile in seconds
    #[arg(long)]
    request_timeout: Option<f64>,

    /// Bound on a single control-plane or store call in seconds
    #[arg(long)]
    call_timeout: Option<f64>,

    /// First retry delay in seconds
    #[arg(long)]
    backoff_base: Option<f64>,

    /// Maximum retry delay in seconds
    #[arg(long)]
    backoff_max: Option<f64>,

    /// Full resync period in seconds
    #[arg(long)]
    resync_interval: Option<f64>,

    /// Retries before an unclassified error becomes terminal
    #[arg(long)]
    max_unknown_retries: Option<u32>,

    /// Directory of the local secret store
    #[arg(long, default_value = "/var/lib/azop/secrets")]
    secrets_dir: PathBuf,

    /// Vault address; selects the vault secret backend
    #[arg(long)]
    vault_addr: Option<String>,

    /// Vault token (falls back to VAULT_TOKEN)
    #[arg(long)]
    vault_token: Option<String>,

    /// Polls a simulated long-running operation takes to settle
    #[arg(long, default_value_t = 2)]
    lro_polls: u32,
}

fn secs(value: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid duration {value}"))
}

async fn engine_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(v) = args.request_timeout {
        config.request_timeout = secs(v)?;
    }
    if let Some(v) = args.call_timeout {
        config.call_timeout = secs(v)?;
    }
    if let Some(v) = args.backoff_base {
        config.backoff.base = secs(v)?;
    }
    if let Some(v) = args.backoff_max {
        config.backoff.max_delay = secs(v)?;
    }
    if let Some(v) = args.resync_interval {
        config.resync_interval = secs(v)?;
    }
    if let Some(v) = args.max_unknown_retries {
        config.max_unknown_retries = v;
    }

    config.validate()?;
    Ok(config)
}

fn secret_backend(args: &Args, settings: &CloudSettings) -> anyhow::Result<SecretBackend> {
    let Some(addr) = &args.vault_addr else {
        return Ok(SecretBackend::Local {
            dir: args.secrets_dir.clone(),
        });
    };
    let token = args
        .vault_token
        .clone()
        .or_else(|| std::env::var("VAULT_TOKEN").ok())
        .context("--vault-token or VAULT_TOKEN is required with --vault-addr")?;
    Ok(SecretBackend::Vault {
        addr: addr.clone(),
        token,
        mount: settings
            .operator_keyvault
            .clone()
            .unwrap_or_else(|| "secret".into()),
    })
}

/// Re-read the manifest and apply it. Errors leave the store as it was.
async fn sync_from(path: &Path, store: &MemoryStore<AzureSpec>) {
    let result = match Manifest::load(path).await {
        Ok(manifest) => sync_manifest(store, &manifest).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        warn!(manifest = %path.display(), "manifest sync failed: {e}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("azop_core=info".parse()?)
                .add_directive("azop_operator=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = engine_config(&args).await?;
    let settings = CloudSettings::from_env()?;

    info!(
        subscription = %settings.subscription_id,
        location = %settings.default_location,
        workers = config.workers,
        "starting azop-operator"
    );

    let secrets = secrets::connect(secret_backend(&args, &settings)?)?;
    let plane: Arc<dyn ControlPlane> = Arc::new(SimulatedControlPlane::new(args.lro_polls));
    let registry = build_registry(CloudContext::new(plane, settings), secrets);

    let store = Arc::new(MemoryStore::<AzureSpec>::new());
    let events = store.subscribe();

    // A broken manifest at startup is fatal; later it only logs.
    let manifest = Manifest::load(&args.manifest)
        .await
        .with_context(|| format!("loading {}", args.manifest.display()))?;
    sync_manifest(&store, &manifest).await?;

    let engine = Arc::new(ReconcileEngine::new(
        store.clone(),
        registry,
        Arc::new(AuditSink::new("azop-operator")),
        &config,
    ));
    let dispatcher = Arc::new(Dispatcher::new(engine, store.clone(), &config));
    let cancel = dispatcher.cancellation_token();

    let dispatch = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.run(events).await }
    });

    let watch = tokio::spawn({
        let store = store.clone();
        let cancel = cancel.clone();
        let path = args.manifest.clone();
        let period = config.resync_interval;
        async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => sync_from(&path, &store).await,
                }
            }
        }
    });

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            info!("received SIGINT");
        }
        _ = sigterm.recv() => info!("received SIGTERM"),
    }

    dispatcher.shutdown();
    dispatch.await?;
    watch.await?;
    info!("azop-operator stopped");
    Ok(())
}
