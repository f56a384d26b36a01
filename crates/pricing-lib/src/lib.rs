//! Rental price prediction library
//!
//! This crate provides the core functionality for:
//! - Validating property records against reference domains
//! - Encoding them with the training-time vocabularies and bin thresholds
//! - Loading and caching trained regressors (ONNX or native tree ensembles)
//! - Health checks and observability

pub mod artifacts;
pub mod bins;
pub mod error;
pub mod features;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod validation;
pub mod vocabulary;

pub use artifacts::ArtifactStore;
pub use error::{PricingError, Result};
pub use features::{EncodedFeatureVector, FeatureColumn, FeatureEncoder, FeatureLayout};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PricingMetrics, StructuredLogger};
pub use pipeline::InferencePipeline;
pub use registry::{AlgorithmTable, ModelRegistry, TrainedModel};
pub use validation::{ValidationErrors, ValidationReport, Validator};
