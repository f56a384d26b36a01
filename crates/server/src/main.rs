//! Rent pricing service
//!
//! Loads the preprocessing artifacts and model manifests from one directory
//! and serves price predictions over HTTP.

use anyhow::{Context, Result};
use pricing_lib::{
    health::{components, HealthRegistry},
    observability::{PricingMetrics, StructuredLogger},
    AlgorithmTable, ArtifactStore, InferencePipeline, ModelRegistry,
};
use pricing_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ServerConfig::load()?;
    let artifacts_dir = config.artifacts_dir.display().to_string();

    let logger = StructuredLogger::new("rent-pricing-server");
    logger.log_startup(SERVICE_VERSION, &artifacts_dir);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::PIPELINE).await;

    // Missing or malformed artifacts leave nothing to serve
    let artifacts = ArtifactStore::load(&config.artifacts_dir)
        .with_context(|| format!("Failed to load artifacts from {}", artifacts_dir))?;
    health_registry.set_healthy(components::ARTIFACTS).await;

    let metrics = PricingMetrics::new();
    metrics.set_artifact_info(
        &artifacts_dir,
        artifacts.vocabulary_count(),
        artifacts.binned_column_count(),
    );
    logger.log_artifacts_loaded(
        &artifacts_dir,
        artifacts.vocabulary_count(),
        artifacts.binned_column_count(),
    );

    let registry = ModelRegistry::from_dir(AlgorithmTable::default(), &config.artifacts_dir);
    let pipeline = Arc::new(InferencePipeline::new(&artifacts, registry));

    if config.preload_models {
        let warm = Arc::clone(&pipeline);
        let outcome = tokio::task::spawn_blocking(move || warm.warm_up())
            .await
            .context("Model preload task failed")?;
        if let Err(e) = &outcome {
            warn!(error = %e, "Model preload failed; affected algorithms will error per request");
        }
        health_registry
            .record(components::MODEL_REGISTRY, &outcome)
            .await;
    } else {
        health_registry.register(components::MODEL_REGISTRY).await;
        info!("Model preload disabled; models load on first request");
    }

    let app_state = Arc::new(api::AppState::new(
        Arc::clone(&pipeline),
        health_registry.clone(),
        metrics,
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            result.context("API server task panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    Ok(())
}
