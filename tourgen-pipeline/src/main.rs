//! tourgen-pipeline - location pipeline service
//!
//! Default port 5730. Configuration: `--config` → `TOURGEN_CONFIG` → user config
//! dir → compiled defaults. `RUST_LOG` overrides the configured log level.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tourgen_pipeline::config::PipelineConfig;
use tourgen_pipeline::orchestrator::build_pipeline;
use tourgen_pipeline::resilience::BreakerRegistry;
use tourgen_pipeline::AppState;

#[derive(Debug, Parser)]
#[command(name = "tourgen-pipeline", version, about = "Location pipeline for generated audio tours")]
struct Args {
    /// Configuration file (TOML)
    #[arg(long, env = "TOURGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Bind address (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Log level when RUST_LOG is unset (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Configuration is loaded before the subscriber exists; load errors surface through anyhow
    let mut config = PipelineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.service.port = port;
    }
    if let Some(bind) = args.bind {
        config.service.bind = bind;
    }
    if let Some(level) = args.log_level {
        config.service.log_level = level;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tourgen-pipeline");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let breakers = Arc::new(BreakerRegistry::new(config.breaker.clone()));
    let orchestrator = build_pipeline(&config, Arc::clone(&breakers)).await?;
    info!("Pipeline initialized, {} breakers registered", breakers.len());

    let state = AppState::new(Arc::new(orchestrator), breakers);
    let app = tourgen_pipeline::build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.service.bind, config.service.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
