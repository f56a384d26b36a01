//! Core data models for the pricing pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A validated description of a rental property, as submitted for pricing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRequest {
    pub host_id: i64,
    pub host_name: String,
    pub borough: String,
    pub district: String,
    pub latitude: f64,
    pub longitude: f64,
    pub room_type: String,
    pub min_nights: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<i64>,
    #[serde(default)]
    pub last_review: Option<NaiveDate>,
    pub monthly_reviews: f64,
    pub host_listings: i64,
    pub availability: i64,
    /// Registered algorithm that should score this request
    pub algorithm: String,
}

/// Scored price returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePrediction {
    /// Price rounded to 2 decimal places
    pub price: f64,
    pub algorithm: String,
    pub model_version: String,
    pub currency: String,
}

impl PricePrediction {
    pub fn usd(price: f64, algorithm: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self {
            price,
            algorithm: algorithm.into(),
            model_version: model_version.into(),
            currency: "USD".to_string(),
        }
    }
}

/// Round a raw model output to cents
pub fn round_price(raw: f64) -> f64 {
    (raw * 100.0).round() / 100.0
}
