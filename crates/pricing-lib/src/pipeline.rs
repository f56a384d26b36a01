//! Inference pipeline: validate -> resolve model -> encode -> score
//!
//! The model is resolved before encoding because its manifest owns the
//! feature order. Nothing past validation runs for an invalid record, and
//! nothing is retried: every stage is deterministic.

use crate::artifacts::ArtifactStore;
use crate::error::{PricingError, Result};
use crate::features::{EncodedFeatureVector, FeatureEncoder};
use crate::models::{round_price, PricePrediction, PropertyRequest};
use crate::observability::{PricingMetrics, StructuredLogger};
use crate::registry::{AlgorithmTable, ModelRegistry};
use crate::validation::{ValidationErrors, ValidationReport, Validator, ValidatorConfig};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Instant;

/// Single entry point for pricing a property
pub struct InferencePipeline {
    validator: Validator,
    encoder: FeatureEncoder,
    registry: ModelRegistry,
    metrics: PricingMetrics,
    logger: StructuredLogger,
}

impl InferencePipeline {
    pub fn new(artifacts: &ArtifactStore, registry: ModelRegistry) -> Self {
        let validator = Validator::new(ValidatorConfig {
            domains: artifacts.domains().clone(),
            algorithms: registry.algorithms().names().map(str::to_string).collect(),
        });
        let encoder = FeatureEncoder::new(artifacts.vocabulary(), artifacts.bins());
        Self {
            validator,
            registry: registry.with_layout_check(encoder.clone()),
            encoder,
            metrics: PricingMetrics::new(),
            logger: StructuredLogger::new("rent-pricing"),
        }
    }

    /// Load artifacts and model manifests from one directory
    pub fn from_dir(dir: &Path, algorithms: AlgorithmTable) -> Result<Self> {
        let artifacts = ArtifactStore::load(dir)?;
        let registry = ModelRegistry::from_dir(algorithms, dir);
        Ok(Self::new(&artifacts, registry))
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Load every registered model; each is checked against the artifacts
    /// before it is cached
    pub fn warm_up(&self) -> Result<()> {
        self.registry.preload_all()
    }

    pub fn validate(&self, record: &Map<String, Value>) -> ValidationReport {
        self.validator.validate(record)
    }

    /// Encode an already validated request for its requested model
    pub fn encode(&self, request: &PropertyRequest) -> Result<EncodedFeatureVector> {
        let model = self.registry.get_model(&request.algorithm)?;
        self.encoder.encode(request, &model.metadata().layout)
    }

    pub fn predict(&self, record: &Map<String, Value>) -> Result<PricePrediction> {
        let start = Instant::now();
        let outcome = self.run(record);
        self.record_outcome(&outcome, start);
        outcome
    }

    /// Price a typed request; it is validated exactly like a raw record
    pub fn predict_request(&self, request: &PropertyRequest) -> Result<PricePrediction> {
        match serde_json::to_value(request) {
            Ok(Value::Object(record)) => self.predict(&record),
            Ok(_) | Err(_) => {
                let mut errors = ValidationErrors::new();
                errors.add("record", "request could not be represented as a JSON object");
                Err(PricingError::Validation(errors))
            }
        }
    }

    fn run(&self, record: &Map<String, Value>) -> Result<PricePrediction> {
        let request = self.validator.parse(record)?;

        let model = self.registry.get_model(&request.algorithm)?;
        let metadata = model.metadata();

        let features = self.encoder.encode(&request, &metadata.layout)?;
        if !features.unknown_categories().is_empty() {
            let columns: Vec<&str> = features.unknown_categories().iter().map(|c| c.name()).collect();
            for column in &columns {
                self.metrics.inc_unknown_category(column);
            }
            self.logger.log_unknown_categories(&request.algorithm, &columns);
        }

        let raw = model.score(&features)?;
        Ok(PricePrediction::usd(
            round_price(raw),
            request.algorithm,
            metadata.version.clone(),
        ))
    }

    fn record_outcome(&self, outcome: &Result<PricePrediction>, start: Instant) {
        let elapsed = start.elapsed();
        match outcome {
            Ok(prediction) => {
                self.metrics.observe_prediction_latency(elapsed.as_secs_f64());
                self.metrics.inc_predictions(&prediction.algorithm);
                self.logger.log_prediction(
                    &prediction.algorithm,
                    &prediction.model_version,
                    prediction.price,
                    elapsed.as_micros(),
                );
            }
            Err(PricingError::Validation(errors)) => {
                let fields: Vec<&str> = errors.fields().collect();
                for field in &fields {
                    self.metrics.inc_validation_failure(field);
                }
                self.logger.log_validation_failure(&fields);
            }
            Err(PricingError::Configuration(message)) => {
                self.metrics.inc_configuration_errors();
                self.logger.log_pipeline_error("configuration_error", message);
            }
            Err(PricingError::Inference(message)) => {
                self.metrics.inc_inference_errors();
                self.logger.log_pipeline_error("inference_error", message);
            }
        }
    }
}

impl std::fmt::Debug for InferencePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferencePipeline")
            .field("registry", &self.registry)
            .finish()
    }
}
