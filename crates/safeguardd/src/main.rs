//! safeguardd - The safeguard enforcement service
//!
//! This is the main entry point for the safeguardd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization (block log + audit log)
//! - Enforcement engine
//! - Replay host (signal stream, simulated screen, location providers)

mod replay;
mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use safeguard_api::{ProviderId, SignalRecord};
use safeguard_config::{EnforcementTimings, SharedPolicyStore, load_config};
use safeguard_core::{CoreEvent, EngineHost, EnforcementEngine};
use safeguard_host_api::{
    HostCapabilities, LocationProvider, LocationSignal, request_fix_from_all,
    start_continuous_updates, stop_continuous_updates,
};
use safeguard_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use safeguard_util::{DATABASE_FILENAME, MonotonicInstant, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::replay::{ReplayLocationProvider, ReplayScreen};
use crate::signals::{SignalSource, spawn_reader};

/// safeguardd - Access enforcement service
#[derive(Parser, Debug)]
#[command(name = "safeguardd")]
#[command(about = "Blocks chosen apps outside an allowed area and verifies the block stuck", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/safeguard/config.toml)
    #[arg(short, long, env = "SAFEGUARD_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set SAFEGUARD_DATA_DIR env var)
    #[arg(short, long, env = "SAFEGUARD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// NDJSON signal stream to replay (`-` for stdin)
    #[arg(short, long)]
    signals: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

/// Main service state
struct Service {
    config_path: PathBuf,
    engine: EnforcementEngine,
    policy: SharedPolicyStore,
    store: Arc<dyn Store>,
    screen: Arc<ReplayScreen>,
    providers: Vec<Arc<ReplayLocationProvider>>,
    tick_interval: Duration,
    fix_timeout: Duration,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let config = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            blocked = config.policy.blocked_packages.len(),
            hidden = config.policy.hidden_packages.len(),
            gate = config.policy.location_gate_enabled,
            "Configuration loaded"
        );

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| config.daemon.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join(DATABASE_FILENAME);
        let sqlite = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );
        info!(db_path = %db_path.display(), "Store initialized");

        let store: Arc<dyn Store> = sqlite.clone();
        store.append_audit(AuditEvent::new(AuditEventType::DaemonStarted))?;

        let policy = SharedPolicyStore::new(config.policy);
        let screen = Arc::new(ReplayScreen::new());
        let providers: Vec<Arc<ReplayLocationProvider>> = ProviderId::ALL
            .iter()
            .map(|id| Arc::new(ReplayLocationProvider::new(*id)))
            .collect();

        let host = EngineHost {
            presenter: screen.clone(),
            foreground: screen.clone(),
            recorder: sqlite,
            capabilities: HostCapabilities::full(),
        };

        let engine = EnforcementEngine::new(
            Arc::new(policy.clone()),
            store.clone(),
            host,
            config.timings,
            config.daemon.own_package.clone(),
        )
        .context("Failed to start enforcement engine")?;

        Ok(Self {
            config_path: args.config.clone(),
            engine,
            policy,
            store,
            screen,
            providers,
            tick_interval: config.daemon.tick_interval,
            fix_timeout: config.daemon.fix_timeout,
        })
    }

    fn location_providers(&self) -> Vec<Arc<dyn LocationProvider>> {
        self.providers
            .iter()
            .map(|p| p.clone() as Arc<dyn LocationProvider>)
            .collect()
    }

    async fn run(mut self, source: Option<SignalSource>) -> Result<()> {
        let providers = self.location_providers();
        for event in self.engine.seed_location(&providers) {
            debug!(event = ?event, "Seeded location");
        }

        let (record_tx, mut records) = mpsc::unbounded_channel();
        let replaying = source.is_some();
        let mut stream_open = match source {
            Some(source) => {
                spawn_reader(source, record_tx);
                true
            }
            None => {
                drop(record_tx);
                false
            }
        };
        let (location_tx, mut location_signals) = mpsc::unbounded_channel::<LocationSignal>();
        let subscribed = start_continuous_updates(&providers, location_tx.clone());
        info!(providers = subscribed, "Location updates running");

        let engine = Arc::new(Mutex::new(self.engine));
        let ctx = LoopContext {
            config_path: self.config_path,
            policy: self.policy,
            store: self.store.clone(),
            screen: self.screen,
            providers: self.providers,
            location_tx,
            fix_timeout: self.fix_timeout,
        };

        let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        let mut tick_timer = tokio::time::interval(self.tick_interval);

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // SIGHUP - reload config
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    let mut engine = engine.lock().await;
                    ctx.reload(&mut engine);
                }

                _ = tick_timer.tick() => {
                    let events = {
                        let mut engine = engine.lock().await;
                        engine.tick(MonotonicInstant::now())
                    };
                    ctx.handle_core_events(events);

                    // Replay finished: exit once nothing is pending
                    if replaying && !stream_open && engine.lock().await.next_deadline().is_none() {
                        info!("Signal stream drained and no work pending");
                        break;
                    }
                }

                record = records.recv(), if stream_open => {
                    match record {
                        Some(record) => {
                            let mut engine = engine.lock().await;
                            let events = ctx.handle_record(&mut engine, record);
                            drop(engine);
                            ctx.handle_core_events(events);
                        }
                        None => stream_open = false,
                    }
                }

                Some(location) = location_signals.recv() => {
                    let events = engine.lock().await.on_location_signal(location);
                    ctx.handle_core_events(events);
                }
            }
        }

        info!("Shutting down safeguardd");
        stop_continuous_updates(&providers);

        {
            let mut engine = engine.lock().await;
            let events = engine.shutdown(MonotonicInstant::now());
            ctx.handle_core_events(events);

            let status = engine.status(safeguard_util::now(), MonotonicInstant::now());
            match serde_json::to_string(&status) {
                Ok(json) => info!(status = %json, "Final engine status"),
                Err(e) => warn!(error = %e, "Failed to serialize engine status"),
            }
        }

        let today = safeguard_util::now().date_naive();
        match self.store.block_stats_for_day(today) {
            Ok(stats) => info!(
                total = stats.total_blocks,
                unique = stats.unique_packages,
                most_blocked = ?stats.most_blocked,
                "Blocks today"
            ),
            Err(e) => warn!(error = %e, "Failed to read block stats"),
        }

        if let Err(e) = self.store.append_audit(AuditEvent::new(AuditEventType::DaemonStopped)) {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Everything the loop needs besides the engine itself
struct LoopContext {
    config_path: PathBuf,
    policy: SharedPolicyStore,
    store: Arc<dyn Store>,
    screen: Arc<ReplayScreen>,
    providers: Vec<Arc<ReplayLocationProvider>>,
    location_tx: mpsc::UnboundedSender<LocationSignal>,
    fix_timeout: Duration,
}

impl LoopContext {
    fn handle_record(&self, engine: &mut EnforcementEngine, record: SignalRecord) -> Vec<CoreEvent> {
        let now = safeguard_util::now();
        let now_mono = MonotonicInstant::now();

        match record {
            SignalRecord::Foreground { .. } => match record.to_foreground_event(now) {
                Some(event) => {
                    self.screen.set_foreground(&event.package);
                    engine.on_foreground_app_changed(&event, now, now_mono)
                }
                None => Vec::new(),
            },
            SignalRecord::Fix { .. } => match record.to_fix(now) {
                Some(fix) => {
                    // Subscribed providers hand the fix to the loop as an update
                    let mut delivered = false;
                    for provider in &self.providers {
                        delivered |= provider.observe(&fix);
                    }
                    if delivered {
                        Vec::new()
                    } else {
                        engine.on_location_signal(LocationSignal::Fix(fix))
                    }
                }
                None => Vec::new(),
            },
            SignalRecord::ProviderFailed { provider, error } => {
                engine.on_location_signal(LocationSignal::Failed { provider, error })
            }
            SignalRecord::UserAction { action } => engine.on_user_action(action, now_mono),
            SignalRecord::ReloadPolicy => {
                self.reload(engine);
                Vec::new()
            }
            // Served by the reader
            SignalRecord::Wait { .. } => Vec::new(),
        }
    }

    fn reload(&self, engine: &mut EnforcementEngine) {
        let success = match load_config(&self.config_path) {
            Ok(config) => {
                self.apply(engine, config.policy, config.timings);
                true
            }
            Err(e) => {
                warn!(error = %e, "Config reload failed, keeping current policy");
                false
            }
        };

        if let Err(e) = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::ConfigReloaded { success }))
        {
            warn!(error = %e, "Failed to log config reload");
        }
    }

    fn apply(&self, engine: &mut EnforcementEngine, policy: safeguard_config::Policy, timings: EnforcementTimings) {
        self.policy.replace(policy);
        engine.set_timings(timings);
        let event = engine.on_policy_changed();
        self.handle_core_events(vec![event]);
    }

    fn handle_core_events(&self, events: Vec<CoreEvent>) {
        for event in events {
            match &event {
                CoreEvent::FreshFixRequested { assessment } => {
                    let providers: Vec<Arc<dyn LocationProvider>> = self
                        .providers
                        .iter()
                        .map(|p| p.clone() as Arc<dyn LocationProvider>)
                        .collect();
                    let started =
                        request_fix_from_all(&providers, self.fix_timeout, self.location_tx.clone());
                    info!(assessment = ?assessment, providers = started, "Fresh fix requested");
                }
                CoreEvent::Blocked {
                    package, reason, ..
                } => {
                    info!(package = %package, reason = ?reason, "App blocked");
                }
                CoreEvent::VerificationFinished {
                    package, outcome, ..
                } => {
                    info!(package = %package, outcome = ?outcome, "Verification finished");
                }
                other => debug!(event = ?other, "Core event"),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "safeguardd starting"
    );

    let source = args.signals.as_deref().map(SignalSource::from_arg);
    let service = Service::new(&args)?;
    service.run(source).await
}
