//! Observability infrastructure for the pricing service
//!
//! Provides:
//! - Prometheus metrics (prediction latency, outcomes per algorithm, validation
//!   failures per field, unknown categories, model loads, slow inferences)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PricingMetricsInner> = OnceLock::new();

struct PricingMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    validation_failures: IntCounterVec,
    configuration_errors: IntCounter,
    inference_errors: IntCounter,
    unknown_categories: IntCounterVec,
    model_loads: IntCounterVec,
    slow_inferences: IntCounterVec,
    artifact_info: GaugeVec,
}

impl PricingMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "rent_pricing_prediction_latency_seconds",
                "Time spent validating, encoding and scoring one request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "rent_pricing_predictions_total",
                "Prices returned, by algorithm",
                &["algorithm"]
            )
            .expect("Failed to register predictions_total"),

            validation_failures: register_int_counter_vec!(
                "rent_pricing_validation_failures_total",
                "Rejected request fields, by field name",
                &["field"]
            )
            .expect("Failed to register validation_failures"),

            configuration_errors: register_int_counter!(
                "rent_pricing_configuration_errors_total",
                "Requests aborted because artifacts did not match the model"
            )
            .expect("Failed to register configuration_errors"),

            inference_errors: register_int_counter!(
                "rent_pricing_inference_errors_total",
                "Requests aborted because the model failed to score"
            )
            .expect("Failed to register inference_errors"),

            unknown_categories: register_int_counter_vec!(
                "rent_pricing_unknown_categories_total",
                "Categorical values encoded with the unknown sentinel, by column",
                &["column"]
            )
            .expect("Failed to register unknown_categories"),

            model_loads: register_int_counter_vec!(
                "rent_pricing_model_loads_total",
                "Model artifacts loaded from storage, by algorithm",
                &["algorithm"]
            )
            .expect("Failed to register model_loads"),

            slow_inferences: register_int_counter_vec!(
                "rent_pricing_slow_inferences_total",
                "ONNX inferences slower than the latency target, by algorithm",
                &["algorithm"]
            )
            .expect("Failed to register slow_inferences"),

            artifact_info: register_gauge_vec!(
                "rent_pricing_artifact_info",
                "Information about the loaded preprocessing artifacts",
                &["artifacts_dir", "vocabularies", "binned_columns"]
            )
            .expect("Failed to register artifact_info"),
        }
    }
}

/// Pricing metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct PricingMetrics {
    _private: (),
}

impl Default for PricingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PricingMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PricingMetrics")
    }
}

impl PricingMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PricingMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PricingMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self, algorithm: &str) {
        self.inner()
            .predictions_total
            .with_label_values(&[algorithm])
            .inc();
    }

    pub fn inc_validation_failure(&self, field: &str) {
        self.inner()
            .validation_failures
            .with_label_values(&[field])
            .inc();
    }

    pub fn inc_configuration_errors(&self) {
        self.inner().configuration_errors.inc();
    }

    pub fn inc_inference_errors(&self) {
        self.inner().inference_errors.inc();
    }

    pub fn inc_unknown_category(&self, column: &str) {
        self.inner()
            .unknown_categories
            .with_label_values(&[column])
            .inc();
    }

    pub fn inc_model_loads(&self, algorithm: &str) {
        self.inner().model_loads.with_label_values(&[algorithm]).inc();
    }

    pub fn model_loads(&self, algorithm: &str) -> u64 {
        self.inner().model_loads.with_label_values(&[algorithm]).get()
    }

    pub fn inc_slow_inference(&self, algorithm: &str) {
        self.inner()
            .slow_inferences
            .with_label_values(&[algorithm])
            .inc();
    }

    pub fn slow_inferences(&self, algorithm: &str) -> u64 {
        self.inner()
            .slow_inferences
            .with_label_values(&[algorithm])
            .get()
    }

    pub fn set_artifact_info(&self, artifacts_dir: &str, vocabularies: usize, binned_columns: usize) {
        let vocabularies = vocabularies.to_string();
        let binned_columns = binned_columns.to_string();
        self.inner().artifact_info.reset();
        self.inner()
            .artifact_info
            .with_label_values(&[artifacts_dir, vocabularies.as_str(), binned_columns.as_str()])
            .set(1.0);
    }
}

/// Structured logger for pricing events
///
/// Keeps event names and fields consistent across the library and the
/// service binary.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, artifacts_dir: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            artifacts_dir = %artifacts_dir,
            "Rent pricing service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Rent pricing service shutting down"
        );
    }

    pub fn log_artifacts_loaded(&self, artifacts_dir: &str, vocabularies: usize, binned_columns: usize) {
        info!(
            event = "artifacts_loaded",
            service = %self.service,
            artifacts_dir = %artifacts_dir,
            vocabularies = vocabularies,
            binned_columns = binned_columns,
            "Preprocessing artifacts loaded"
        );
    }

    pub fn log_prediction(&self, algorithm: &str, model_version: &str, price: f64, elapsed_us: u128) {
        info!(
            event = "prediction_served",
            service = %self.service,
            algorithm = %algorithm,
            model_version = %model_version,
            price = price,
            elapsed_us = elapsed_us as u64,
            "Price predicted"
        );
    }

    pub fn log_validation_failure(&self, fields: &[&str]) {
        info!(
            event = "validation_rejected",
            service = %self.service,
            fields = ?fields,
            "Request rejected by validation"
        );
    }

    pub fn log_unknown_categories(&self, algorithm: &str, columns: &[&str]) {
        warn!(
            event = "unknown_category",
            service = %self.service,
            algorithm = %algorithm,
            columns = ?columns,
            "Categories unseen in training encoded with sentinel"
        );
    }

    pub fn log_pipeline_error(&self, kind: &str, message: &str) {
        error!(
            event = "pipeline_error",
            service = %self.service,
            kind = %kind,
            message = %message,
            "Prediction aborted"
        );
    }
}
