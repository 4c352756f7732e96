use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;

use triad_core::events::RunEvent;
use triad_engine::activity::DORMANT_THRESHOLD_SECS;
use triad_engine::PipelineRunner;
use triad_llm::{BackendRegistry, ChatCompletionsBackend, FallbackDispatcher, HttpBackendConfig};
use triad_server::{EngineOrchestrator, RunOrchestrator, ServerConfig};
use triad_settings::TriadSettings;
use triad_store::{Database, MemoryStore, RunArchive, RunStore, SqliteStore};
use triad_telemetry::{init_telemetry, parse_level, TelemetryConfig};

#[derive(Parser)]
#[command(name = "triad")]
#[command(version, about = "Sequential multi-phase reasoning over a chain of LLM backends")]
struct Cli {
    /// Keep runs in memory instead of the SQLite database
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        host: Option<String>,
    },
    /// Execute one run and print its events
    Run {
        problem: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (settings, settings_error) = triad_settings::load_settings();

    init_telemetry(TelemetryConfig {
        log_level: parse_level(&settings.logging.level).unwrap_or(tracing::Level::INFO),
        module_levels: Vec::new(),
        json: settings.logging.json,
    });
    if let Some(e) = settings_error {
        tracing::warn!(error = %e, "settings file ignored, using defaults and env overrides");
    }

    let (store, archive) = open_store(&settings, cli.ephemeral)?;
    let (orchestrator, dispatcher) = build_orchestrator(&settings, store)?;
    let orchestrator = Arc::new(orchestrator);

    let result = match cli.command {
        Commands::Serve { port, host } => {
            let config = ServerConfig {
                host: host.unwrap_or_else(|| settings.server.host.clone()),
                port: port.unwrap_or(settings.server.port),
                keep_alive_secs: settings.server.keep_alive_secs,
            };
            serve(config, orchestrator, archive).await
        }
        Commands::Run { problem } => run_once(orchestrator.as_ref(), &problem).await,
    };

    tracing::info!(
        attempts = dispatcher.total_attempts(),
        degraded = dispatcher.total_degraded(),
        "dispatcher totals"
    );
    result
}

fn open_store(
    settings: &TriadSettings,
    ephemeral: bool,
) -> Result<(Arc<dyn RunStore>, Arc<dyn RunArchive>)> {
    if ephemeral {
        let store = Arc::new(MemoryStore::new());
        let archive: Arc<dyn RunArchive> = store.clone();
        return Ok((store, archive));
    }

    let path = triad_settings::resolve_db_path(settings);
    let db = Database::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    let store = Arc::new(SqliteStore::new(db));
    let archive: Arc<dyn RunArchive> = store.clone();
    Ok((store, archive))
}

fn build_orchestrator(
    settings: &TriadSettings,
    store: Arc<dyn RunStore>,
) -> Result<(EngineOrchestrator, Arc<FallbackDispatcher>)> {
    let backend_settings = &settings.backend;
    let api_key = std::env::var(&backend_settings.api_key_env).unwrap_or_else(|_| {
        tracing::warn!(
            env = %backend_settings.api_key_env,
            "API key not set; backend calls will be rejected"
        );
        String::new()
    });

    let config = HttpBackendConfig {
        api_url: backend_settings.api_url.clone(),
        api_key: SecretString::from(api_key),
        connect_timeout: Duration::from_millis(backend_settings.connect_timeout_ms),
        request_timeout: Duration::from_millis(backend_settings.request_timeout_ms),
    };
    let backend = ChatCompletionsBackend::new(config).context("failed to build HTTP backend")?;

    let dispatcher = Arc::new(
        FallbackDispatcher::new(Arc::new(backend))
            .with_max_output_tokens(backend_settings.max_output_tokens),
    );
    let registry = BackendRegistry::from_ids(backend_settings.backends.iter())
        .context("invalid backend list")?;

    tracing::info!(
        backends = registry.len(),
        primary = %registry.primary(),
        dormant_threshold_secs = DORMANT_THRESHOLD_SECS,
        "pipeline ready"
    );

    let runner = PipelineRunner::new(Arc::clone(&dispatcher), Arc::new(registry), store);
    let orchestrator = EngineOrchestrator::new(Arc::new(runner))
        .with_event_buffer(settings.server.event_buffer);
    Ok((orchestrator, dispatcher))
}

async fn serve(
    config: ServerConfig,
    orchestrator: Arc<EngineOrchestrator>,
    archive: Arc<dyn RunArchive>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let handle = triad_server::start(config, orchestrator, archive)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(port = handle.port, "triad server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    handle.shutdown().await;
    Ok(())
}

async fn run_once(orchestrator: &dyn RunOrchestrator, problem: &str) -> Result<()> {
    let mut submission = orchestrator.submit(problem).await?;

    while let Some(event) = submission.events.recv().await {
        match event {
            RunEvent::DormantNotice { .. } => {
                println!(">> DORMANT AWAKENING: high-density mode engaged\n");
            }
            RunEvent::PhaseStarted { label, .. } => {
                println!("== {label} ==");
            }
            RunEvent::PhaseCompleted { output, .. } => {
                println!("{output}\n");
            }
            RunEvent::RunComplete { run_id } => {
                println!("-- run {run_id} complete --");
            }
        }
    }
    Ok(())
}
