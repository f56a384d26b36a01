//! Integration tests for the pricing API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use pricing_lib::{
    health::{components, HealthRegistry},
    AlgorithmTable, InferencePipeline, PricingMetrics,
};
use pricing_server::api::{create_router, AppState};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn write_artifacts(dir: &Path) {
    std::fs::write(
        dir.join("matches.json"),
        r#"{
            "Borough": {"Brooklyn": 0, "Manhattan": 1},
            "District": {"Midtown": 0, "Williamsburg": 1},
            "Room Type": {"Entire home/apt": 0, "Private room": 1}
        }"#,
    )
    .unwrap();
    std::fs::write(dir.join("bins.json"), r#"{"Minimum Nights": [1, 3, 30]}"#).unwrap();
    std::fs::write(
        dir.join("lgbm_model.json"),
        r#"{
            "algorithm": "LightGBM",
            "version": "lgbm-test",
            "feature_order": ["Borough", "Room Type", "Minimum Nights"],
            "binned_features": ["Minimum Nights"],
            "model": {
                "type": "tree_ensemble",
                "base_score": 99.999,
                "split_rule": "less_or_equal",
                "trees": [
                    {"split": {"feature": 0, "threshold": 0.5,
                        "left": {"leaf": {"value": 10.0}},
                        "right": {"leaf": {"value": 50.0}}}}
                ]
            }
        }"#,
    )
    .unwrap();
}

async fn setup_test_app() -> (TempDir, Router, Arc<AppState>) {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());

    let pipeline = InferencePipeline::from_dir(dir.path(), AlgorithmTable::default()).unwrap();

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ARTIFACTS).await;
    health_registry.register(components::MODEL_REGISTRY).await;
    health_registry.register(components::PIPELINE).await;

    let state = Arc::new(AppState::new(
        Arc::new(pipeline),
        health_registry,
        PricingMetrics::new(),
    ));
    let router = create_router(state.clone());

    (dir, router, state)
}

fn property(algorithm: &str) -> Value {
    json!({
        "host_id": 2787,
        "host_name": "John",
        "borough": "Manhattan",
        "district": "Midtown",
        "latitude": 40.75,
        "longitude": -73.98,
        "room_type": "Entire home/apt",
        "min_nights": 2,
        "reviews": 10,
        "last_review": "2023-05-01",
        "monthly_reviews": 1.2,
        "host_listings": 1,
        "availability": 200,
        "algorithm": algorithm
    })
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_predict_returns_rounded_price() {
    let (_dir, app, _state) = setup_test_app().await;

    let (status, body) = send(app, post_json("/predict", property("LightGBM").to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price"], 150.0);
    assert_eq!(body["algorithm"], "LightGBM");
    assert_eq!(body["model_version"], "lgbm-test");
    assert_eq!(body["currency"], "USD");
}

#[tokio::test]
async fn test_predict_validation_failure_is_422_with_hints() {
    let (_dir, app, _state) = setup_test_app().await;

    let mut record = property("LightGBM");
    record["min_nights"] = json!(0);
    record["latitude"] = json!(200);

    let (status, body) = send(app, post_json("/predict", record.to_string())).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_failed");
    assert_eq!(body["fields"]["min_nights"][0], "min value is 1");
    assert!(body["fields"]["latitude"].is_array());
    assert_eq!(
        body["hints"]["latitude"],
        "Latitude values must be between -90 and 90!"
    );
}

#[tokio::test]
async fn test_predict_rejects_non_object_body() {
    let (_dir, app, _state) = setup_test_app().await;

    let (status, _) = send(app.clone(), post_json("/predict", "[1, 2, 3]".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(app, post_json("/predict", "{not json".to_string())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_predict_missing_model_is_500_and_degrades_registry() {
    let (_dir, app, state) = setup_test_app().await;

    let (status, body) = send(app, post_json("/predict", property("XGBoost").to_string())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "configuration_error");
    assert!(body["message"].as_str().unwrap().contains("xgb_model.json"));

    let health = state.health_registry.health().await;
    assert_eq!(
        health.components[components::MODEL_REGISTRY].status,
        pricing_lib::ComponentStatus::Degraded
    );
}

#[tokio::test]
async fn test_failed_request_keeps_failed_warm_up_unready() {
    let (_dir, app, state) = setup_test_app().await;

    let outcome = state.pipeline.warm_up();
    assert!(outcome.is_err());
    state
        .health_registry
        .record(components::MODEL_REGISTRY, &outcome)
        .await;
    state.health_registry.set_ready(true).await;

    let request = post_json("/predict", property("XGBoost").to_string());
    let (status, _) = send(app.clone(), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, readiness) = send(app.clone(), get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
    assert!(readiness["reason"]
        .as_str()
        .unwrap()
        .contains(components::MODEL_REGISTRY));

    let (status, health) = send(app, get("/healthz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["components"]["model_registry"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_models_lists_registered_algorithms() {
    let (_dir, app, state) = setup_test_app().await;
    state.pipeline.registry().get_model("LightGBM").unwrap();

    let (status, body) = send(app, get("/models")).await;

    assert_eq!(status, StatusCode::OK);
    let models = body.as_array().unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models[0]["algorithm"], "LightGBM");
    assert_eq!(models[0]["stem"], "lgbm");
    assert_eq!(models[0]["loaded"], true);
    assert_eq!(models[0]["version"], "lgbm-test");
    assert_eq!(models[0]["features"], 3);
    assert_eq!(models[1]["algorithm"], "XGBoost");
    assert_eq!(models[1]["loaded"], false);
    assert!(models[1].get("version").is_none());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (_dir, app, _state) = setup_test_app().await;

    let (status, health) = send(app, get("/healthz")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["artifacts"].is_object());
    assert!(health["components"]["model_registry"].is_object());
    assert!(health["components"]["pipeline"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (_dir, app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::ARTIFACTS, "bins.json unreadable")
        .await;

    let (status, health) = send(app, get("/healthz")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_registry() {
    let (_dir, app, state) = setup_test_app().await;

    let (status, readiness) = send(app.clone(), get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;
    let (status, readiness) = send(app, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (_dir, app, state) = setup_test_app().await;

    let record = property("LightGBM");
    state
        .pipeline
        .predict(record.as_object().unwrap())
        .unwrap();

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("rent_pricing_prediction_latency_seconds_bucket"));
    assert!(metrics_text.contains("rent_pricing_predictions_total"));
    assert!(metrics_text.contains("rent_pricing_model_loads_total"));
}
