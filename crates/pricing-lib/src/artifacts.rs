//! Training-time preprocessing artifacts, loaded once per process
//!
//! The directory layout mirrors what the offline training job writes:
//! `matches.json` (vocabularies), `bins.json` (bin thresholds) and an
//! optional `reference_domains.json` with the allowed borough, district and
//! room type values.

use crate::bins::BinStore;
use crate::error::{PricingError, Result};
use crate::features::FeatureColumn;
use crate::validation::ReferenceDomains;
use crate::vocabulary::VocabularyStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const VOCABULARY_FILE: &str = "matches.json";
pub const BINS_FILE: &str = "bins.json";
pub const DOMAINS_FILE: &str = "reference_domains.json";

/// Read-only preprocessing artifacts shared by every request
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    vocabulary: Arc<VocabularyStore>,
    bins: Arc<BinStore>,
    domains: ReferenceDomains,
}

impl ArtifactStore {
    pub fn new(
        dir: impl Into<PathBuf>,
        vocabulary: VocabularyStore,
        bins: BinStore,
        domains: ReferenceDomains,
    ) -> Result<Self> {
        check_known_columns("vocabulary", vocabulary.columns())?;
        check_known_columns("bin thresholds", bins.columns())?;
        Ok(Self {
            dir: dir.into(),
            vocabulary: Arc::new(vocabulary),
            bins: Arc::new(bins),
            domains,
        })
    }

    /// Load every artifact from `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(PricingError::config(format!(
                "Artifacts directory {:?} does not exist",
                dir
            )));
        }

        let vocabulary = VocabularyStore::load(&dir.join(VOCABULARY_FILE))?;
        let bins = BinStore::load(&dir.join(BINS_FILE))?;

        let domains_path = dir.join(DOMAINS_FILE);
        let domains = if domains_path.exists() {
            debug!(path = ?domains_path, "Loading reference domains");
            let json = std::fs::read_to_string(&domains_path).map_err(|e| {
                PricingError::config(format!("Failed to read {:?}: {}", domains_path, e))
            })?;
            serde_json::from_str(&json).map_err(|e| {
                PricingError::config(format!("Invalid reference domains {:?}: {}", domains_path, e))
            })?
        } else {
            debug!("No reference domains file, deriving allowed values from vocabularies");
            ReferenceDomains::from_vocabulary(&vocabulary)?
        };

        let store = Self::new(dir, vocabulary, bins, domains)?;
        info!(
            dir = ?dir,
            vocabularies = store.vocabulary.columns().count(),
            binned_columns = store.bins.columns().count(),
            boroughs = store.domains.boroughs.len(),
            districts = store.domains.districts.len(),
            room_types = store.domains.room_types.len(),
            "Artifacts loaded"
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vocabulary(&self) -> Arc<VocabularyStore> {
        Arc::clone(&self.vocabulary)
    }

    pub fn bins(&self) -> Arc<BinStore> {
        Arc::clone(&self.bins)
    }

    pub fn domains(&self) -> &ReferenceDomains {
        &self.domains
    }

    pub fn vocabulary_count(&self) -> usize {
        self.vocabulary.columns().count()
    }

    pub fn binned_column_count(&self) -> usize {
        self.bins.columns().count()
    }
}

fn check_known_columns<'a>(what: &str, columns: impl Iterator<Item = &'a str>) -> Result<()> {
    for column in columns {
        column.parse::<FeatureColumn>().map_err(|_| {
            PricingError::config(format!("{} artifact names unknown column '{}'", what, column))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_minimal(dir: &Path) {
        fs::write(
            dir.join(VOCABULARY_FILE),
            r#"{"Borough": {"Manhattan": 0}, "District": {"Midtown": 0},
                "Room Type": {"Private room": 0}}"#,
        )
        .unwrap();
        fs::write(dir.join(BINS_FILE), r#"{"Minimum Nights": [1, 2, 5]}"#).unwrap();
    }

    #[test]
    fn test_domains_derived_from_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal(dir.path());

        let store = ArtifactStore::load(dir.path()).unwrap();
        assert!(store.domains().boroughs.contains("Manhattan"));
        assert!(store.domains().room_types.contains("Private room"));
        assert_eq!(store.vocabulary_count(), 3);
        assert_eq!(store.binned_column_count(), 1);
    }

    #[test]
    fn test_explicit_domains_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal(dir.path());
        fs::write(
            dir.path().join(DOMAINS_FILE),
            r#"{"boroughs": ["Queens"], "districts": ["Astoria"], "room_types": ["Shared room"]}"#,
        )
        .unwrap();

        let store = ArtifactStore::load(dir.path()).unwrap();
        assert!(store.domains().boroughs.contains("Queens"));
        assert!(!store.domains().boroughs.contains("Manhattan"));
    }

    #[test]
    fn test_missing_files_are_configuration_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, PricingError::Configuration(_)));

        let err = ArtifactStore::load(&dir.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_bins_for_unknown_column_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_minimal(dir.path());
        fs::write(dir.path().join(BINS_FILE), r#"{"Price": [10, 50, 100]}"#).unwrap();

        let err = ArtifactStore::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Price"));
    }
}
