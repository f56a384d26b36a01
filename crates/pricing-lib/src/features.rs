//! Feature encoding for model inference
//!
//! Turns a validated [`PropertyRequest`] into the fixed-order numeric vector
//! a trained model expects. The order comes from the model manifest, never
//! from the request, so training and inference always agree on it.

use crate::bins::BinStore;
use crate::error::{PricingError, Result};
use crate::models::PropertyRequest;
use crate::vocabulary::{VocabularyStore, UNKNOWN_CATEGORY};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Category used for a listing that has never been reviewed
pub const MISSING_REVIEW_PERIOD: &str = "N/A";

/// Numeric stand-in for an absent review count
pub const MISSING_NUMERIC: f64 = UNKNOWN_CATEGORY as f64;

/// Model-facing feature columns, named as the training artifacts name them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FeatureColumn {
    HostId,
    HostName,
    Borough,
    District,
    Latitude,
    Longitude,
    RoomType,
    MinimumNights,
    Reviews,
    LastReview,
    MonthlyReviews,
    NumberOfListings,
    DaysAvailable,
}

impl FeatureColumn {
    pub const ALL: [FeatureColumn; 13] = [
        FeatureColumn::HostId,
        FeatureColumn::HostName,
        FeatureColumn::Borough,
        FeatureColumn::District,
        FeatureColumn::Latitude,
        FeatureColumn::Longitude,
        FeatureColumn::RoomType,
        FeatureColumn::MinimumNights,
        FeatureColumn::Reviews,
        FeatureColumn::LastReview,
        FeatureColumn::MonthlyReviews,
        FeatureColumn::NumberOfListings,
        FeatureColumn::DaysAvailable,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::HostId => "Host ID",
            FeatureColumn::HostName => "Host Name",
            FeatureColumn::Borough => "Borough",
            FeatureColumn::District => "District",
            FeatureColumn::Latitude => "Latitude",
            FeatureColumn::Longitude => "Longitude",
            FeatureColumn::RoomType => "Room Type",
            FeatureColumn::MinimumNights => "Minimum Nights",
            FeatureColumn::Reviews => "Reviews",
            FeatureColumn::LastReview => "Last Review",
            FeatureColumn::MonthlyReviews => "Monthly Reviews",
            FeatureColumn::NumberOfListings => "Number of Listings",
            FeatureColumn::DaysAvailable => "Days Available",
        }
    }

    /// Whether the raw value is a string that goes through a vocabulary
    pub fn is_categorical(&self) -> bool {
        matches!(
            self,
            FeatureColumn::HostName
                | FeatureColumn::Borough
                | FeatureColumn::District
                | FeatureColumn::RoomType
                | FeatureColumn::LastReview
        )
    }
}

impl fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureColumn {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self> {
        FeatureColumn::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| PricingError::config(format!("Unknown feature column '{}'", s)))
    }
}

impl TryFrom<String> for FeatureColumn {
    type Error = PricingError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<FeatureColumn> for String {
    fn from(c: FeatureColumn) -> Self {
        c.name().to_string()
    }
}

/// Raw value of one column before encoding
#[derive(Debug, Clone, PartialEq)]
enum RawValue {
    Numeric(f64),
    Category(String),
}

/// Reduce a review date to its year-month period key, e.g. `2023-5`
pub fn review_period(date: Option<NaiveDate>) -> String {
    match date {
        Some(d) => format!("{}-{}", d.year(), d.month()),
        None => MISSING_REVIEW_PERIOD.to_string(),
    }
}

fn raw_value(request: &PropertyRequest, column: FeatureColumn) -> RawValue {
    use RawValue::{Category, Numeric};
    match column {
        FeatureColumn::HostId => Numeric(request.host_id as f64),
        FeatureColumn::HostName => Category(request.host_name.clone()),
        FeatureColumn::Borough => Category(request.borough.clone()),
        FeatureColumn::District => Category(request.district.clone()),
        FeatureColumn::Latitude => Numeric(request.latitude),
        FeatureColumn::Longitude => Numeric(request.longitude),
        FeatureColumn::RoomType => Category(request.room_type.clone()),
        FeatureColumn::MinimumNights => Numeric(request.min_nights as f64),
        FeatureColumn::Reviews => Numeric(request.reviews.map_or(MISSING_NUMERIC, |r| r as f64)),
        FeatureColumn::LastReview => Category(review_period(request.last_review)),
        FeatureColumn::MonthlyReviews => Numeric(request.monthly_reviews),
        FeatureColumn::NumberOfListings => Numeric(request.host_listings as f64),
        FeatureColumn::DaysAvailable => Numeric(request.availability as f64),
    }
}

/// Exact column order a model was trained on, plus the columns it requires
/// bin thresholds for
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayout {
    columns: Vec<FeatureColumn>,
    binned: Vec<FeatureColumn>,
}

impl FeatureLayout {
    pub fn new(columns: Vec<FeatureColumn>, binned: Vec<FeatureColumn>) -> Result<Self> {
        if columns.is_empty() {
            return Err(PricingError::config("Feature order must not be empty"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(**c)) {
            return Err(PricingError::config(format!(
                "Feature order lists '{}' more than once",
                dup
            )));
        }
        if let Some(extra) = binned.iter().find(|c| !columns.contains(*c)) {
            return Err(PricingError::config(format!(
                "Binned feature '{}' is not in the feature order",
                extra
            )));
        }
        Ok(Self { columns, binned })
    }

    /// Layout over every known column in declaration order
    pub fn full(binned: Vec<FeatureColumn>) -> Result<Self> {
        Self::new(FeatureColumn::ALL.to_vec(), binned)
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn binned(&self) -> &[FeatureColumn] {
        &self.binned
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Ordered model input for a single request
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFeatureVector {
    columns: Vec<FeatureColumn>,
    values: Vec<f64>,
    unknown_categories: Vec<FeatureColumn>,
}

impl EncodedFeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn get(&self, column: FeatureColumn) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| *c == column)
            .map(|i| self.values[i])
    }

    /// Categorical columns whose value was not in the vocabulary
    pub fn unknown_categories(&self) -> &[FeatureColumn] {
        &self.unknown_categories
    }

    pub fn to_f32(&self) -> Vec<f32> {
        self.values.iter().map(|v| *v as f32).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Encodes validated requests using the training-time artifacts
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    vocabulary: Arc<VocabularyStore>,
    bins: Arc<BinStore>,
}

impl FeatureEncoder {
    pub fn new(vocabulary: Arc<VocabularyStore>, bins: Arc<BinStore>) -> Self {
        Self { vocabulary, bins }
    }

    /// Check that every artifact `layout` depends on is present
    pub fn check_layout(&self, layout: &FeatureLayout) -> Result<()> {
        for column in layout.columns() {
            if column.is_categorical() && self.vocabulary.vocabulary(column.name()).is_none() {
                return Err(PricingError::config(format!(
                    "No vocabulary for categorical feature '{}'",
                    column
                )));
            }
        }
        for column in layout.binned() {
            if self.bins.thresholds(column.name()).is_none() {
                return Err(PricingError::config(format!(
                    "No bin thresholds for binned feature '{}'",
                    column
                )));
            }
        }
        Ok(())
    }

    pub fn encode(
        &self,
        request: &PropertyRequest,
        layout: &FeatureLayout,
    ) -> Result<EncodedFeatureVector> {
        self.check_layout(layout)?;

        let mut values = Vec::with_capacity(layout.len());
        let mut unknown_categories = Vec::new();

        for &column in layout.columns() {
            let mut value = match raw_value(request, column) {
                RawValue::Numeric(v) => v,
                RawValue::Category(category) => {
                    let vocabulary = self.vocabulary.vocabulary(column.name()).ok_or_else(|| {
                        PricingError::config(format!("No vocabulary for '{}'", column))
                    })?;
                    let code = vocabulary.code(&category);
                    if code == UNKNOWN_CATEGORY {
                        unknown_categories.push(column);
                    }
                    code as f64
                }
            };

            if let Some(thresholds) = self.bins.thresholds(column.name()) {
                value = thresholds.bin_index(value) as f64;
            }

            values.push(value);
        }

        Ok(EncodedFeatureVector {
            columns: layout.columns().to_vec(),
            values,
            unknown_categories,
        })
    }
}
