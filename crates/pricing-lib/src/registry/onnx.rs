//! ONNX inference using tract
//!
//! LightGBM and XGBoost regressors exported to ONNX are optimized once at
//! load time and then run on a `[1, n_features]` f32 input, where `n` is the
//! length of the manifest's `feature_order`. The price is the first element
//! of the first graph output; f32 and f64 outputs are both accepted.

use super::{ModelMetadata, TrainedModel};
use crate::error::{PricingError, Result};
use crate::features::EncodedFeatureVector;
use crate::observability::PricingMetrics;
use anyhow::Context;
use std::time::{Duration, Instant};
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Inference latency above which a run is counted as slow
const MAX_INFERENCE: Duration = Duration::from_millis(5);

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-backed regressor
pub struct OnnxModel {
    plan: TractModel,
    metadata: ModelMetadata,
    latency_target: Duration,
    metrics: PricingMetrics,
}

impl OnnxModel {
    pub fn new(model_bytes: &[u8], metadata: ModelMetadata) -> Result<Self> {
        let plan = Self::load_model(model_bytes, metadata.layout.len()).map_err(|e| {
            PricingError::config(format!(
                "Failed to load ONNX model for {}: {:#}",
                metadata.algorithm, e
            ))
        })?;
        Ok(Self {
            plan,
            metadata,
            latency_target: MAX_INFERENCE,
            metrics: PricingMetrics::new(),
        })
    }

    pub fn with_latency_target(mut self, target: Duration) -> Self {
        self.latency_target = target;
        self
    }

    /// Parse and optimize an ONNX model from bytes
    fn load_model(model_bytes: &[u8], n_features: usize) -> anyhow::Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, n_features]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    fn run(&self, features: &EncodedFeatureVector) -> anyhow::Result<f64> {
        let input: Tensor =
            tract_ndarray::Array2::from_shape_vec((1, features.len()), features.to_f32())
                .context("Failed to shape model input")?
                .into();

        let result = self.plan.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        first_value(output)
    }
}

/// First element of a float tensor, widened to f64
fn first_value(output: &Tensor) -> anyhow::Result<f64> {
    let output = output
        .cast_to::<f64>()
        .with_context(|| format!("Unsupported model output type {:?}", output.datum_type()))?;
    let view = output.to_array_view::<f64>()?;
    view.iter().next().copied().context("Model output is empty")
}

impl TrainedModel for OnnxModel {
    fn score(&self, features: &EncodedFeatureVector) -> Result<f64> {
        self.metadata.check_input(features)?;
        let start = Instant::now();

        let prediction = self.run(features).map_err(|e| {
            PricingError::inference(format!("{} inference failed: {:#}", self.metadata.algorithm, e))
        })?;

        let elapsed = start.elapsed();
        if elapsed > self.latency_target {
            self.metrics.inc_slow_inference(&self.metadata.algorithm);
            warn!(
                algorithm = %self.metadata.algorithm,
                elapsed_us = elapsed.as_micros() as u64,
                target_us = self.latency_target.as_micros() as u64,
                "Inference exceeded latency target"
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros() as u64, "Inference completed");
        }

        if !prediction.is_finite() {
            return Err(PricingError::inference(format!(
                "{} produced a non-finite prediction",
                self.metadata.algorithm
            )));
        }
        Ok(prediction)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
