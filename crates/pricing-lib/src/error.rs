//! Error taxonomy for the pricing pipeline
//!
//! Validation failures are user-facing and carry every failing field.
//! Configuration failures mean the deployed artifacts do not match what the
//! model expects; they abort the request but never the process.

use crate::validation::ValidationErrors;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PricingError>;

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Inference error: {0}")]
    Inference(String),
}

impl PricingError {
    pub fn config(message: impl Into<String>) -> Self {
        PricingError::Configuration(message.into())
    }

    pub fn inference(message: impl Into<String>) -> Self {
        PricingError::Inference(message.into())
    }

    /// Stable machine-readable kind, used in API responses and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            PricingError::Validation(_) => "validation_failed",
            PricingError::Configuration(_) => "configuration_error",
            PricingError::Inference(_) => "inference_error",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, PricingError::Validation(_))
    }
}

impl From<ValidationErrors> for PricingError {
    fn from(errors: ValidationErrors) -> Self {
        PricingError::Validation(errors)
    }
}
