// # bronnd - Bronn audit daemon
//
// This daemon is a THIN integration layer. All caching, diffing, routing
// and suppression logic lives in bronn-core.
//
// The bronnd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime and tracing
// 3. Wiring the pipeline in its defined order
// 4. Replaying newline-delimited JSON platform events from stdin
//
// Rendered audit blocks are written to stdout, one JSON object per line.
// Logs go to stderr.
//
// ## Configuration
//
// ### Snapshot Store
// - `BRONN_STORE_TYPE`: Type of snapshot store (memory, file)
// - `BRONN_STORE_PATH`: Path to the store file (for file store)
//
// ### Suppression Ledger
// - `BRONN_SUPPRESSION_TTL_SECS`: Lifetime of an armed entry
// - `BRONN_SWEEP_INTERVAL_SECS`: Interval of the expiry sweep
//
// ### Audit Router
// - `BRONN_EDIT_GRACE_MILLIS`: Wait before a raw edit is logged
//
// ### Logging
// - `BRONN_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export BRONN_STORE_TYPE=file
// export BRONN_STORE_PATH=/var/lib/bronn/guilds.json
//
// bronnd < events.ndjson
// ```

use anyhow::Result;
use async_trait::async_trait;
use bronn_core::audit::{AuditOutcome, AuditRouter, SuppressionLedger};
use bronn_core::cache::{FilterCache, GuildConfigCache};
use bronn_core::config::{AuditConfig, BronnConfig, StoreConfig, SuppressionConfig};
use bronn_core::events::PlatformEvent;
use bronn_core::model::ChannelId;
use bronn_core::modlog::ModLog;
use bronn_core::registry::StoreRegistry;
use bronn_core::traits::{ChannelSink, DeliveryError, RenderedBlock, SnapshotStore};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum BronnExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<BronnExitCode> for ExitCode {
    fn from(code: BronnExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    store_type: String,
    store_path: Option<String>,
    suppression_ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    edit_grace_millis: Option<u64>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            store_type: env::var("BRONN_STORE_TYPE").unwrap_or_else(|_| "memory".to_string()),
            store_path: env::var("BRONN_STORE_PATH").ok(),
            suppression_ttl_secs: parse_env("BRONN_SUPPRESSION_TTL_SECS")?,
            sweep_interval_secs: parse_env("BRONN_SWEEP_INTERVAL_SECS")?,
            edit_grace_millis: parse_env("BRONN_EDIT_GRACE_MILLIS")?,
            log_level: env::var("BRONN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.store_type.as_str() {
            "memory" => {}
            "file" => {
                let Some(path) = self.store_path.as_deref().filter(|p| !p.is_empty()) else {
                    anyhow::bail!(
                        "BRONN_STORE_PATH is required when BRONN_STORE_TYPE=file. \
                        Set it via: export BRONN_STORE_PATH=/var/lib/bronn/guilds.json"
                    );
                };
                if let Some(parent) = std::path::Path::new(path).parent()
                    && !parent.as_os_str().is_empty()
                    && !parent.exists()
                {
                    anyhow::bail!(
                        "BRONN_STORE_PATH parent directory does not exist: {}",
                        parent.display()
                    );
                }
            }
            other => anyhow::bail!(
                "BRONN_STORE_TYPE '{}' is not supported. Supported types: memory, file",
                other
            ),
        }

        if let Some(ttl) = self.suppression_ttl_secs
            && !(1..=3600).contains(&ttl)
        {
            anyhow::bail!(
                "BRONN_SUPPRESSION_TTL_SECS must be between 1 and 3600 seconds. Got: {}",
                ttl
            );
        }

        if let Some(interval) = self.sweep_interval_secs
            && !(1..=3600).contains(&interval)
        {
            anyhow::bail!(
                "BRONN_SWEEP_INTERVAL_SECS must be between 1 and 3600 seconds. Got: {}",
                interval
            );
        }

        if let Some(grace) = self.edit_grace_millis
            && grace > 60_000
        {
            anyhow::bail!("BRONN_EDIT_GRACE_MILLIS must be at most 60000. Got: {}", grace);
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "BRONN_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Core configuration with env overrides applied over the defaults
    fn to_core(&self) -> BronnConfig {
        let store = match (self.store_type.as_str(), &self.store_path) {
            ("file", Some(path)) => StoreConfig::File { path: path.clone() },
            _ => StoreConfig::Memory,
        };

        let mut audit = AuditConfig::default();
        if let Some(grace) = self.edit_grace_millis {
            audit.edit_grace_millis = grace;
        }

        let mut suppression = SuppressionConfig::default();
        if let Some(ttl) = self.suppression_ttl_secs {
            suppression.ttl_secs = ttl;
        }
        if let Some(interval) = self.sweep_interval_secs {
            suppression.sweep_interval_secs = interval;
        }

        BronnConfig {
            store,
            audit,
            suppression,
        }
    }
}

fn parse_env(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} must be a non-negative integer: {}", name, e)),
        Err(_) => Ok(None),
    }
}

/// Sink that writes each block to stdout as one JSON line
struct StdoutSink;

#[async_trait]
impl ChannelSink for StdoutSink {
    async fn deliver(
        &self,
        channel_id: ChannelId,
        block: &RenderedBlock,
    ) -> Result<(), DeliveryError> {
        let line = serde_json::json!({ "channel_id": channel_id, "block": block });
        println!("{}", line);
        Ok(())
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return BronnExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return BronnExitCode::ConfigError.into();
    }

    let core_config = config.to_core();
    if let Err(e) = core_config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return BronnExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries audit blocks
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return BronnExitCode::ConfigError.into();
    }

    info!("Starting bronnd daemon");
    info!("Snapshot store: {}", core_config.store.type_name());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return BronnExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(core_config).await {
            error!("Daemon error: {}", e);
            BronnExitCode::RuntimeError
        } else {
            BronnExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: BronnConfig) -> Result<()> {
    // 1. Snapshot store
    let registry = StoreRegistry::with_builtin();
    let store: Arc<dyn SnapshotStore> = Arc::from(registry.create(&config.store).await?);

    // 2. Caches
    let guilds = GuildConfigCache::new(Arc::clone(&store));
    let filters = FilterCache::new(Arc::clone(&store));
    let loaded = guilds.bulk_load().await?;
    info!("Loaded {} guild config(s)", loaded);

    // 3. Suppression ledger
    let ledger = SuppressionLedger::new(config.suppression.ttl());
    let sweeper = ledger.spawn_sweeper(config.suppression.sweep_interval());

    // 4. Router and mod log
    let router = AuditRouter::new(guilds, ledger, Arc::new(StdoutSink), config.audit.clone());
    let modlog = ModLog::new(router, filters, &config.audit);

    info!("Daemon initialized, reading events from stdin");
    let outcome = replay_events(&modlog).await;

    sweeper.abort();
    store.flush().await?;
    info!("Shutting down daemon");
    outcome
}

/// Feed stdin events into the mod log until EOF or a shutdown signal
///
/// Events are handled in input order. Raw message edits wait out the edit
/// grace period, so they run as their own tasks.
async fn replay_events(modlog: &ModLog) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending = JoinSet::new();
    let mut handled = 0usize;

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            signal = &mut shutdown => {
                info!("Received shutdown signal: {}", signal?);
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("End of input");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let event: PlatformEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed event: {}", e);
                continue;
            }
        };

        handled += 1;
        if matches!(event, PlatformEvent::RawMessageEdit { .. }) {
            let modlog = modlog.clone();
            pending.spawn(async move {
                report_outcomes(&modlog.handle(event).await);
            });
        } else {
            report_outcomes(&modlog.handle(event).await);
        }
    }

    while pending.join_next().await.is_some() {}
    info!("Handled {} event(s)", handled);
    Ok(())
}

/// Log what happened to one event's records; returns how many were capped
fn report_outcomes(outcomes: &[AuditOutcome]) -> usize {
    let capped = outcomes.iter().filter(|o| o.truncation_applied()).count();
    if capped > 0 {
        info!("{} record(s) delivered with a capped body", capped);
    }
    debug!("Event routed: {:?}", outcomes);
    capped
}

/// Wait for a shutdown signal (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for a shutdown signal (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
