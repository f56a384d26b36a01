//! HTTP API: prediction, model listing, health checks and Prometheus metrics

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pricing_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    InferencePipeline, PricingError, PricingMetrics, ValidationErrors,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<InferencePipeline>,
    pub health_registry: HealthRegistry,
    pub metrics: PricingMetrics,
}

impl AppState {
    pub fn new(
        pipeline: Arc<InferencePipeline>,
        health_registry: HealthRegistry,
        metrics: PricingMetrics,
    ) -> Self {
        Self {
            pipeline,
            health_registry,
            metrics,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ValidationErrorBody {
    pub error: &'static str,
    pub fields: ValidationErrors,
    pub hints: BTreeMap<String, String>,
}

/// One entry of `GET /models`
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub algorithm: String,
    pub stem: String,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<usize>,
}

fn bad_request(message: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: "invalid_request".to_string(),
        message: message.into(),
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn error_response(err: PricingError) -> Response {
    match err {
        PricingError::Validation(fields) => {
            let body = ValidationErrorBody {
                error: "validation_failed",
                hints: fields.hints(),
                fields,
            };
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
        }
        other => {
            let body = ErrorBody {
                error: other.kind().to_string(),
                message: other.to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// Price one property record
async fn predict(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let record = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(record)) => record,
        Ok(_) => return bad_request("Request body must be a JSON object"),
        Err(e) => return bad_request(format!("Request body is not valid JSON: {}", e)),
    };

    // First use of a model reads it from disk
    let pipeline = Arc::clone(&state.pipeline);
    let outcome = tokio::task::spawn_blocking(move || pipeline.predict(&record)).await;

    match outcome {
        Ok(Ok(prediction)) => (StatusCode::OK, Json(prediction)).into_response(),
        Ok(Err(err)) => {
            if let PricingError::Configuration(message) = &err {
                state
                    .health_registry
                    .degrade_if_healthy(components::MODEL_REGISTRY, message.clone())
                    .await;
            }
            error_response(err)
        }
        Err(join_error) => {
            error!(error = %join_error, "Prediction task failed");
            let body = ErrorBody {
                error: "internal_error".to_string(),
                message: "Prediction task did not complete".to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// Registered algorithms and their load state
async fn models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.pipeline.registry();
    let models: Vec<ModelInfo> = registry
        .algorithms()
        .iter()
        .map(|(algorithm, stem)| {
            let metadata = registry.loaded_metadata(algorithm);
            ModelInfo {
                algorithm: algorithm.to_string(),
                stem: stem.to_string(),
                loaded: metadata.is_some(),
                version: metadata.as_ref().map(|m| m.version.clone()),
                format: metadata.as_ref().map(|m| m.format.to_string()),
                features: metadata.as_ref().map(|m| m.layout.len()),
            }
        })
        .collect();
    Json(models)
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/models", get(models))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
