//! Persisted quantile-bin thresholds built at training time
//!
//! Binning reproduces the training-time convention exactly: the bin index
//! of `x` is the number of thresholds `<= x`, minus one. A value equal to
//! `thresholds[i]` lands in bin `i`; values below the first threshold land
//! in bin `-1`.

use crate::error::{PricingError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Ascending cut points for one numeric column
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<f64>")]
pub struct BinThresholds(Vec<f64>);

impl BinThresholds {
    pub fn new(thresholds: Vec<f64>) -> Result<Self> {
        if thresholds.is_empty() {
            return Err(PricingError::config("Bin thresholds must not be empty"));
        }
        if thresholds.iter().any(|t| !t.is_finite()) {
            return Err(PricingError::config("Bin thresholds must be finite"));
        }
        if thresholds.windows(2).any(|w| w[0] > w[1]) {
            return Err(PricingError::config("Bin thresholds must be ascending"));
        }
        Ok(Self(thresholds))
    }

    /// Zero-based bin index for `value`
    pub fn bin_index(&self, value: f64) -> i64 {
        let position = self.0.partition_point(|&t| t <= value);
        position as i64 - 1
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.0
    }
}

impl TryFrom<Vec<f64>> for BinThresholds {
    type Error = PricingError;

    fn try_from(thresholds: Vec<f64>) -> Result<Self> {
        Self::new(thresholds)
    }
}

/// All bin thresholds, keyed by feature column name
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct BinStore(HashMap<String, BinThresholds>);

impl BinStore {
    pub fn new(columns: HashMap<String, BinThresholds>) -> Self {
        Self(columns)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PricingError::config(format!("Invalid bins artifact: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| PricingError::config(format!("Failed to read bins {:?}: {}", path, e)))?;
        Self::from_json(&json)
    }

    pub fn thresholds(&self, column: &str) -> Option<&BinThresholds> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bins() -> BinThresholds {
        BinThresholds::new(vec![1.0, 3.0, 7.0, 30.0]).unwrap()
    }

    #[test]
    fn test_value_at_threshold_lands_in_that_bin() {
        let b = bins();
        for (i, t) in b.thresholds().iter().enumerate() {
            assert_eq!(b.bin_index(*t), i as i64, "threshold {}", t);
        }
    }

    #[test]
    fn test_value_just_below_threshold_lands_in_previous_bin() {
        let b = bins();
        assert_eq!(b.bin_index(2.999), 0);
        assert_eq!(b.bin_index(3.0), 1);
        assert_eq!(b.bin_index(6.5), 1);
        assert_eq!(b.bin_index(7.0), 2);
    }

    #[test]
    fn test_values_outside_thresholds() {
        let b = bins();
        assert_eq!(b.bin_index(0.5), -1);
        assert_eq!(b.bin_index(-1.0), -1);
        assert_eq!(b.bin_index(30.0), 3);
        assert_eq!(b.bin_index(1_000.0), 3);
    }

    #[test]
    fn test_repeated_thresholds() {
        // Quantile cuts on skewed columns often repeat
        let b = BinThresholds::new(vec![0.0, 0.0, 1.0]).unwrap();
        assert_eq!(b.bin_index(0.0), 1);
        assert_eq!(b.bin_index(0.5), 1);
        assert_eq!(b.bin_index(1.0), 2);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        assert!(BinThresholds::new(vec![]).is_err());
        assert!(BinThresholds::new(vec![3.0, 1.0]).is_err());
        assert!(BinStore::from_json(r#"{"Reviews": [5.0, 2.0]}"#).is_err());
    }

    #[test]
    fn test_store_from_json() {
        let store = BinStore::from_json(r#"{"Minimum Nights": [1, 2, 3, 5, 30]}"#).unwrap();
        let t = store.thresholds("Minimum Nights").unwrap();
        assert_eq!(t.bin_index(2.0), 1);
        assert!(store.thresholds("Reviews").is_none());
    }
}
