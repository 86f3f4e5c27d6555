//! Forecaster - hourly temperature forecasting service
//!
//! Runs the hourly inference and daily training jobs and serves health,
//! metrics and the forecast history over HTTP. `train` and `infer` run a
//! single cycle and exit.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forecast_lib::{
    collector::OpenWeatherCollector,
    health::{components, HealthRegistry},
    model::ArtifactStore,
    observability::{ForecastMetrics, StructuredLogger},
    predictor::{ForecastContext, InferenceCycle, JobScheduler, TrainingCycle},
    store::{EvaluationEngine, ForecastStore},
};
use forecaster::{api, config::ForecasterConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const FORECASTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "forecaster")]
#[command(author, version, about = "Hourly temperature forecasting service")]
struct Cli {
    /// Config file used in place of ./forecaster.{toml,yaml,json}
    #[arg(short, long, env = "FORECAST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduled jobs and the HTTP API (default)
    Serve,
    /// Run one training cycle and exit
    Train,
    /// Run one inference cycle and exit
    Infer,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let config = ForecasterConfig::load_from(cli.config.as_deref())?;
    info!(
        location = %config.location(),
        database = %config.database_path.display(),
        artifact = %config.artifact_path.display(),
        "Forecaster configured"
    );

    let health_registry = HealthRegistry::new();
    for name in components::ALL {
        health_registry.register(name).await;
    }

    let metrics = ForecastMetrics::new();
    let logger = StructuredLogger::new(config.location());

    let store = Arc::new(
        ForecastStore::open(&config.database_path)
            .context("Failed to open forecast store")?
            .with_evaluation(EvaluationEngine::new(config.evaluation_rows)?),
    );
    let artifacts = ArtifactStore::new(&config.artifact_path);
    let current = artifacts.current_version().context("Failed to read pipeline artifact")?;
    if let Some(version) = &current {
        metrics.set_artifact(&version.version, &version.checksum);
    }

    let collector = Arc::new(
        OpenWeatherCollector::new(config.collector.clone()).context("Failed to create collector")?,
    );
    let ctx = ForecastContext {
        collector,
        store: Arc::clone(&store),
        artifacts: artifacts.clone(),
        health: health_registry.clone(),
        metrics: metrics.clone(),
        logger: logger.clone(),
    };

    let inference = Arc::new(InferenceCycle::new(ctx.clone(), &config.features, &config.inference));
    let training = Arc::new(TrainingCycle::new(ctx, config.features.clone(), &config.training)?);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Train => {
            let outcome = training.run().await?;
            info!(version = %outcome.artifact.version, rows = outcome.training_rows, "Training finished");
            return Ok(());
        }
        Commands::Infer => {
            let outcome = inference.run().await?;
            info!(
                timestamp = %outcome.prediction.timestamp,
                value = outcome.prediction.predicted_value,
                "Inference finished"
            );
            return Ok(());
        }
        Commands::Serve => {}
    }

    logger.log_startup(FORECASTER_VERSION, current.as_ref().map(|v| v.version.as_str()));

    let (shutdown_tx, _) = broadcast::channel(1);
    let scheduler = Arc::new(JobScheduler::new(inference, training, config.schedule.clone()));
    let job_handles = scheduler.spawn(&shutdown_tx);

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        store,
        artifacts,
    ));
    health_registry.set_ready(true).await;

    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let reason = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            "SIGINT received"
        }
        served = &mut api_handle => {
            match served {
                Ok(Ok(())) => "API server stopped",
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    "API server failed"
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    "API server task panicked"
                }
            }
        }
    };

    logger.log_shutdown(reason);
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    for handle in job_handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Job task ended abnormally");
        }
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
