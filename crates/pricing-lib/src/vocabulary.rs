//! Persisted category -> code tables built at training time
//!
//! Loaded once and only read afterwards. Categories never seen during
//! training encode to [`UNKNOWN_CATEGORY`] instead of failing.

use crate::error::{PricingError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Code used for categories absent from the vocabulary
pub const UNKNOWN_CATEGORY: i64 = -1;

/// Category codes for one column
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Vocabulary(HashMap<String, i64>);

impl Vocabulary {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Code for `category`, or `None` when it was never seen in training
    pub fn lookup(&self, category: &str) -> Option<i64> {
        self.0.get(category).copied()
    }

    /// Code for `category`, falling back to the unknown-category sentinel
    pub fn code(&self, category: &str) -> i64 {
        self.lookup(category).unwrap_or(UNKNOWN_CATEGORY)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// All vocabularies, keyed by feature column name
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct VocabularyStore(HashMap<String, Vocabulary>);

impl VocabularyStore {
    pub fn new(columns: HashMap<String, Vocabulary>) -> Self {
        Self(columns)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let store: Self = serde_json::from_str(json)
            .map_err(|e| PricingError::config(format!("Invalid vocabulary artifact: {}", e)))?;
        for (column, vocabulary) in &store.0 {
            if let Some((category, code)) = vocabulary.0.iter().find(|(_, code)| **code < 0) {
                return Err(PricingError::config(format!(
                    "Vocabulary '{}' assigns negative code {} to '{}'",
                    column, code, category
                )));
            }
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            PricingError::config(format!("Failed to read vocabulary {:?}: {}", path, e))
        })?;
        Self::from_json(&json)
    }

    pub fn vocabulary(&self, column: &str) -> Option<&Vocabulary> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_categories() {
        let vocab = Vocabulary::from_pairs([("Brooklyn", 0), ("Manhattan", 1)]);
        assert_eq!(vocab.code("Manhattan"), 1);
        assert_eq!(vocab.code("Atlantis"), UNKNOWN_CATEGORY);
        assert_eq!(vocab.lookup("Atlantis"), None);
    }

    #[test]
    fn test_store_from_json() {
        let store = VocabularyStore::from_json(
            r#"{"Borough": {"Bronx": 0, "Brooklyn": 1}, "Room Type": {"Shared room": 2}}"#,
        )
        .unwrap();
        assert_eq!(store.vocabulary("Borough").unwrap().code("Brooklyn"), 1);
        assert_eq!(store.vocabulary("Room Type").unwrap().len(), 1);
        assert!(store.vocabulary("District").is_none());
    }

    #[test]
    fn test_negative_codes_rejected() {
        let err = VocabularyStore::from_json(r#"{"Borough": {"Bronx": -1}}"#).unwrap_err();
        assert!(matches!(err, PricingError::Configuration(_)));
    }

    #[test]
    fn test_malformed_artifact_is_configuration_error() {
        let err = VocabularyStore::from_json(r#"{"Borough": ["Bronx"]}"#).unwrap_err();
        assert!(matches!(err, PricingError::Configuration(_)));
    }
}
