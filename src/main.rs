//! Mitti Mitra service entry point
//!
//! Runs the HTTP recommendation service, or one of the offline subcommands:
//!
//! ```text
//! mitti-mitra [--addr HOST:PORT] [--config FILE] [--model-dir DIR]
//! mitti-mitra recommend --input request.json
//! mitti-mitra import-zones --input zones.json
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mitti_mitra::api::{create_app, AdvisorState};
use mitti_mitra::config::AdvisorConfig;
use mitti_mitra::inference::{
    ArtifactPaths, FallbackPredictor, ModelRegistry, PipelineSettings, RecommendationPipeline,
};
use mitti_mitra::storage::{AuditSink, FieldStore, SensorLog, ZoneLookup};
use mitti_mitra::types::FeatureRecord;
use mitti_mitra::weather::{self, WeatherProvider};

#[derive(Parser, Debug)]
#[command(name = "mitti-mitra")]
#[command(about = "Mitti Mitra crop and fertilizer recommendation service")]
#[command(version)]
struct CliArgs {
    /// Override the server address (default: "0.0.0.0:5000")
    #[arg(short, long)]
    addr: Option<String>,

    /// Path to an advisor_config.toml (skips the normal search order)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the model artifacts
    #[arg(long, value_name = "DIR")]
    model_dir: Option<String>,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the pipeline once on a JSON request file and print the result
    Recommend {
        /// Path to a JSON object with the request fields
        #[arg(long)]
        input: PathBuf,
    },

    /// Load a JSON object of `"state": "zone"` pairs into the field store
    ImportZones {
        /// Path to the JSON zone table
        #[arg(long)]
        input: PathBuf,
    },
}

// ============================================================================
// Startup
// ============================================================================

fn load_config(args: &CliArgs) -> Result<AdvisorConfig> {
    let mut advisor_config = match &args.config {
        Some(path) => {
            let mut loaded = AdvisorConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            loaded.apply_env_overrides();
            loaded
        }
        None => AdvisorConfig::load(),
    };

    if let Some(addr) = &args.addr {
        advisor_config.server.addr.clone_from(addr);
    }
    if let Some(dir) = &args.model_dir {
        advisor_config.models.dir.clone_from(dir);
    }
    advisor_config
        .validate()
        .context("Invalid configuration after command-line overrides")?;
    Ok(advisor_config)
}

/// Open the field store. A store that cannot be opened (missing permissions,
/// another process holding the lock) degrades to running without one.
fn open_store(advisor_config: &AdvisorConfig) -> Option<Arc<FieldStore>> {
    match FieldStore::open(&advisor_config.storage.path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(
                path = %advisor_config.storage.path,
                error = %format!("{e:#}"),
                "Field store unavailable, running without zone enrichment, audit or sensor storage"
            );
            None
        }
    }
}

fn build_pipeline(
    advisor_config: &AdvisorConfig,
    store: Option<&Arc<FieldStore>>,
) -> RecommendationPipeline {
    let registry = Arc::new(ModelRegistry::new(ArtifactPaths::from_config(&advisor_config.models)));
    // Load artifacts now rather than on the first request.
    let bundle = registry.bundle();
    info!(
        can_classify = bundle.can_classify(),
        can_predict_yield = bundle.can_predict_yield(),
        "Model bundle ready"
    );

    let mut pipeline =
        RecommendationPipeline::new(registry, PipelineSettings::from_config(advisor_config))
            .with_fallback(FallbackPredictor::new(advisor_config.inference.fallback_seed));

    if let Some(store) = store {
        pipeline = pipeline.with_zone_lookup(Arc::clone(store) as Arc<dyn ZoneLookup>);
        if advisor_config.storage.audit_enabled {
            pipeline = pipeline.with_audit_sink(Arc::clone(store) as Arc<dyn AuditSink>);
        }
    }
    pipeline
}

fn read_json_object(path: &Path) -> Result<serde_json::Map<String, serde_json::Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {} as JSON", path.display()))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

// ============================================================================
// Subcommands
// ============================================================================

async fn run_recommend(advisor_config: &AdvisorConfig, input: &Path) -> Result<()> {
    let map = read_json_object(input)?;
    let mut record = FeatureRecord::from_json_map(&map);

    let provider = weather::build_provider(&advisor_config.weather);
    let filled = weather::fill_missing_climate(
        &mut record,
        provider.as_ref(),
        &advisor_config.weather.default_location,
    )
    .await;
    if filled > 0 {
        info!(filled, provider = provider.provider_name(), "Filled missing climate readings");
    }

    let store = open_store(advisor_config);
    let pipeline = build_pipeline(advisor_config, store.as_ref());
    let recommendation = pipeline.recommend(&record)?;

    println!("{}", serde_json::to_string_pretty(&recommendation)?);

    if let Some(store) = store {
        store.flush()?;
    }
    Ok(())
}

fn run_import_zones(advisor_config: &AdvisorConfig, input: &Path) -> Result<()> {
    let map = read_json_object(input)?;
    let mut pairs = Vec::with_capacity(map.len());
    for (state, zone) in &map {
        let Some(zone) = zone.as_str() else {
            bail!("zone for '{state}' must be a string");
        };
        pairs.push((state.as_str(), zone));
    }

    let store = FieldStore::open(&advisor_config.storage.path)?;
    let written = store.seed_zones(pairs)?;
    store.flush()?;
    info!(written, total = store.zone_count(), "Zone table imported");
    Ok(())
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(advisor_config: &AdvisorConfig, cancel_token: CancellationToken) -> Result<()> {
    let server_addr = advisor_config.server_addr()?;

    let store = open_store(advisor_config);
    let pipeline = Arc::new(build_pipeline(advisor_config, store.as_ref()));
    let provider: Arc<dyn WeatherProvider> = weather::build_provider(&advisor_config.weather);
    info!(provider = provider.provider_name(), "Weather provider ready");

    let mut state = AdvisorState::new(pipeline)
        .with_weather(provider, &advisor_config.weather.default_location)
        .with_service_name(&advisor_config.service.name);
    if let Some(store) = &store {
        state = state
            .with_sensor_log(Arc::clone(store) as Arc<dyn SensorLog>)
            .with_zone_table(Arc::clone(store) as Arc<dyn ZoneLookup>);
    }
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("Failed to bind to {server_addr}"))?;
    info!("✓ HTTP server listening on {}", server_addr);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            info!("[HttpServer] Received shutdown signal");
        })
        .await;

    if let Some(store) = store {
        if let Err(e) = store.flush() {
            warn!(error = %e, "Failed to flush field store on shutdown");
        }
    }

    match result {
        Ok(()) => {
            info!("[HttpServer] Graceful shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("[HttpServer] Server error: {}", e);
            Err(anyhow::anyhow!("HTTP server error: {}", e))
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let advisor_config = load_config(&args)?;

    // Subcommand dispatch
    match &args.command {
        Some(SubCommand::Recommend { input }) => {
            return run_recommend(&advisor_config, input).await;
        }
        Some(SubCommand::ImportZones { input }) => {
            return run_import_zones(&advisor_config, input);
        }
        None => {}
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  {} v{}", advisor_config.service.name, env!("CARGO_PKG_VERSION"));
    info!("  Crop and fertilizer recommendation service");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    run_server(&advisor_config, cancel_token).await
}
