//! Trained model registry
//!
//! Models are registered by algorithm name, loaded from their manifest on
//! first use and cached for the lifetime of the process. Concurrent first
//! requests for the same algorithm load it once, and a model is cached only
//! after its feature layout has been checked against the loaded artifacts.

mod onnx;
mod tree;

pub use onnx::OnnxModel;
pub use tree::{SplitRule, TreeEnsemble, TreeModel, TreeNode};

use crate::error::{PricingError, Result};
use crate::features::{EncodedFeatureVector, FeatureColumn, FeatureEncoder, FeatureLayout};
use crate::observability::PricingMetrics;
use dashmap::DashMap;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info};

/// Scores an encoded feature vector to a raw price
pub trait TrainedModel: Send + Sync {
    fn score(&self, features: &EncodedFeatureVector) -> Result<f64>;

    fn metadata(&self) -> &ModelMetadata;
}

/// Identity and input contract of a loaded model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    pub algorithm: String,
    pub version: String,
    pub layout: FeatureLayout,
    pub format: &'static str,
}

impl ModelMetadata {
    /// Reject vectors that were not built for this model's column order
    pub fn check_input(&self, features: &EncodedFeatureVector) -> Result<()> {
        if features.columns() != self.layout.columns() {
            return Err(PricingError::config(format!(
                "Feature order mismatch for {} {}: model expects {} columns, got {}",
                self.algorithm,
                self.version,
                self.layout.len(),
                features.len()
            )));
        }
        Ok(())
    }
}

/// On-disk description of one trained model
#[derive(Debug, Clone, Deserialize)]
pub struct ModelManifest {
    pub algorithm: String,
    pub version: String,
    pub feature_order: Vec<FeatureColumn>,
    #[serde(default)]
    pub binned_features: Vec<FeatureColumn>,
    pub model: ModelPayload,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelPayload {
    /// ONNX graph stored next to the manifest
    Onnx {
        path: PathBuf,
        #[serde(default)]
        sha256: Option<String>,
    },
    /// Gradient-boosted trees dumped inline
    TreeEnsemble(TreeEnsemble),
}

impl ModelManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PricingError::config(format!("Invalid model manifest: {}", e)))
    }

    pub fn layout(&self) -> Result<FeatureLayout> {
        FeatureLayout::new(self.feature_order.clone(), self.binned_features.clone())
    }
}

/// Algorithm name -> artifact file stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmTable(BTreeMap<String, String>);

impl Default for AlgorithmTable {
    fn default() -> Self {
        Self::empty().with("LightGBM", "lgbm").with("XGBoost", "xgb")
    }
}

impl AlgorithmTable {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, algorithm: impl Into<String>, stem: impl Into<String>) -> Self {
        self.0.insert(algorithm.into(), stem.into());
        self
    }

    pub fn stem(&self, algorithm: &str) -> Option<&str> {
        self.0.get(algorithm).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Where model artifacts come from
pub trait ModelSource: Send + Sync {
    fn load(&self, algorithm: &str, stem: &str) -> Result<Arc<dyn TrainedModel>>;
}

/// Loads `{stem}_model.json` manifests from an artifacts directory
#[derive(Debug, Clone)]
pub struct FileModelSource {
    dir: PathBuf,
}

impl FileModelSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn manifest_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}_model.json", stem))
    }

    fn read_payload(&self, path: &Path, expected_sha256: Option<&str>) -> Result<Vec<u8>> {
        let full = self.dir.join(path);
        let bytes = std::fs::read(&full)
            .map_err(|e| PricingError::config(format!("Failed to read model {:?}: {}", full, e)))?;

        if let Some(expected) = expected_sha256 {
            let actual = hex::encode(Sha256::digest(&bytes));
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(PricingError::config(format!(
                    "Checksum mismatch for {:?}: expected {}, got {}",
                    full, expected, actual
                )));
            }
            debug!(path = ?full, "Model checksum verified");
        }
        Ok(bytes)
    }
}

impl ModelSource for FileModelSource {
    fn load(&self, algorithm: &str, stem: &str) -> Result<Arc<dyn TrainedModel>> {
        let manifest_path = self.manifest_path(stem);
        let json = std::fs::read_to_string(&manifest_path).map_err(|e| {
            PricingError::config(format!("Failed to read manifest {:?}: {}", manifest_path, e))
        })?;
        let manifest = ModelManifest::from_json(&json)?;

        if manifest.algorithm != algorithm {
            return Err(PricingError::config(format!(
                "Manifest {:?} is for '{}', expected '{}'",
                manifest_path, manifest.algorithm, algorithm
            )));
        }

        let layout = manifest.layout()?;
        let model: Arc<dyn TrainedModel> = match manifest.model {
            ModelPayload::Onnx { path, sha256 } => {
                let bytes = self.read_payload(&path, sha256.as_deref())?;
                let metadata = ModelMetadata {
                    algorithm: manifest.algorithm,
                    version: manifest.version,
                    layout,
                    format: "onnx",
                };
                Arc::new(OnnxModel::new(&bytes, metadata)?)
            }
            ModelPayload::TreeEnsemble(ensemble) => {
                let metadata = ModelMetadata {
                    algorithm: manifest.algorithm,
                    version: manifest.version,
                    layout,
                    format: "tree_ensemble",
                };
                Arc::new(TreeModel::new(ensemble, metadata)?)
            }
        };
        Ok(model)
    }
}

/// Load-once cache of trained models keyed by algorithm name
///
/// Loads are serialized per algorithm by a gate in `loading`; finished
/// models live in `models`, which is never locked across a load.
pub struct ModelRegistry {
    algorithms: AlgorithmTable,
    source: Box<dyn ModelSource>,
    models: DashMap<String, Arc<dyn TrainedModel>>,
    loading: DashMap<String, Arc<Mutex<()>>>,
    layout_check: Option<FeatureEncoder>,
    metrics: PricingMetrics,
}

impl ModelRegistry {
    pub fn new(algorithms: AlgorithmTable, source: impl ModelSource + 'static) -> Self {
        Self {
            algorithms,
            source: Box::new(source),
            models: DashMap::new(),
            loading: DashMap::new(),
            layout_check: None,
            metrics: PricingMetrics::new(),
        }
    }

    /// Registry over `{dir}/{stem}_model.json` manifests
    pub fn from_dir(algorithms: AlgorithmTable, dir: impl Into<PathBuf>) -> Self {
        Self::new(algorithms, FileModelSource::new(dir))
    }

    /// Refuse to cache models whose layout `encoder` cannot produce
    pub fn with_layout_check(mut self, encoder: FeatureEncoder) -> Self {
        self.layout_check = Some(encoder);
        self
    }

    pub fn algorithms(&self) -> &AlgorithmTable {
        &self.algorithms
    }

    pub fn get_model(&self, name: &str) -> Result<Arc<dyn TrainedModel>> {
        let stem = match self.algorithms.stem(name) {
            Some(stem) => stem,
            None => {
                // Validation restricts names to the registered set
                error!(algorithm = %name, "Unregistered algorithm reached the model registry");
                return Err(PricingError::config(format!(
                    "Algorithm '{}' is not registered",
                    name
                )));
            }
        };

        if let Some(model) = self.models.get(name) {
            return Ok(Arc::clone(model.value()));
        }

        let gate = Arc::clone(self.loading.entry(name.to_string()).or_default().value());
        let _loading = gate.lock().unwrap_or_else(PoisonError::into_inner);

        // Another caller may have finished while we waited at the gate
        if let Some(model) = self.models.get(name) {
            return Ok(Arc::clone(model.value()));
        }

        let model = self.load(name, stem)?;
        self.models.insert(name.to_string(), Arc::clone(&model));
        Ok(model)
    }

    fn load(&self, name: &str, stem: &str) -> Result<Arc<dyn TrainedModel>> {
        let model = self.source.load(name, stem)?;
        let meta = model.metadata();
        if let Some(encoder) = &self.layout_check {
            encoder.check_layout(&meta.layout)?;
        }

        info!(
            algorithm = %name,
            version = %meta.version,
            format = meta.format,
            features = meta.layout.len(),
            "Model loaded"
        );
        self.metrics.inc_model_loads(name);
        Ok(model)
    }

    /// Load every registered model, stopping at the first failure
    pub fn preload_all(&self) -> Result<()> {
        let names: Vec<String> = self.algorithms.names().map(str::to_string).collect();
        for name in names {
            self.get_model(&name)?;
        }
        Ok(())
    }

    /// Never waits on a load in progress
    pub fn is_loaded(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Metadata of a model if it has already been loaded
    pub fn loaded_metadata(&self, name: &str) -> Option<ModelMetadata> {
        self.models.get(name).map(|m| m.value().metadata().clone())
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("algorithms", &self.algorithms)
            .field("loaded", &self.models.len())
            .field("layout_check", &self.layout_check.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::BinStore;
    use crate::vocabulary::VocabularyStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    struct ConstantModel {
        price: f64,
        metadata: ModelMetadata,
    }

    impl TrainedModel for ConstantModel {
        fn score(&self, _features: &EncodedFeatureVector) -> Result<f64> {
            Ok(self.price)
        }

        fn metadata(&self) -> &ModelMetadata {
            &self.metadata
        }
    }

    #[derive(Clone, Default)]
    struct CountingSource {
        loads: Arc<AtomicUsize>,
    }

    impl ModelSource for CountingSource {
        fn load(&self, algorithm: &str, _stem: &str) -> Result<Arc<dyn TrainedModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(Arc::new(ConstantModel {
                price: 100.0,
                metadata: ModelMetadata {
                    algorithm: algorithm.to_string(),
                    version: "test".to_string(),
                    layout: FeatureLayout::full(vec![]).unwrap(),
                    format: "constant",
                },
            }))
        }
    }

    /// Blocks inside `load` until the test releases it
    struct GatedSource {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ModelSource for GatedSource {
        fn load(&self, algorithm: &str, stem: &str) -> Result<Arc<dyn TrainedModel>> {
            self.started.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            CountingSource::default().load(algorithm, stem)
        }
    }

    #[test]
    fn test_default_algorithm_table() {
        let table = AlgorithmTable::default();
        assert_eq!(table.stem("LightGBM"), Some("lgbm"));
        assert_eq!(table.stem("XGBoost"), Some("xgb"));
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["LightGBM", "XGBoost"]);
    }

    #[test]
    fn test_model_loaded_once_and_cached() {
        let source = CountingSource::default();
        let loads = source.loads.clone();
        let registry = ModelRegistry::new(AlgorithmTable::default(), source);

        assert!(!registry.is_loaded("LightGBM"));
        let a = registry.get_model("LightGBM").unwrap();
        let b = registry.get_model("LightGBM").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(registry.is_loaded("LightGBM"));
        assert!(!registry.is_loaded("XGBoost"));
    }

    #[test]
    fn test_concurrent_first_loads_do_not_race() {
        let source = CountingSource::default();
        let loads = source.loads.clone();
        let registry = Arc::new(ModelRegistry::new(AlgorithmTable::default(), source));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_model("XGBoost").unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_algorithm_is_configuration_error() {
        let registry = ModelRegistry::new(AlgorithmTable::default(), CountingSource::default());
        let err = registry.get_model("CatBoost").err().unwrap();
        assert!(matches!(err, PricingError::Configuration(_)));
    }

    #[test]
    fn test_manifest_parsing() {
        let manifest = ModelManifest::from_json(
            r#"{
                "algorithm": "XGBoost",
                "version": "2.1.0",
                "feature_order": ["Borough", "Latitude"],
                "binned_features": [],
                "model": {"type": "onnx", "path": "xgb_model.onnx", "sha256": "abc"}
            }"#,
        )
        .unwrap();
        assert_eq!(manifest.feature_order, vec![FeatureColumn::Borough, FeatureColumn::Latitude]);
        assert!(matches!(manifest.model, ModelPayload::Onnx { ref sha256, .. } if sha256.as_deref() == Some("abc")));

        let err = ModelManifest::from_json(
            r#"{"algorithm": "XGBoost", "version": "1", "feature_order": ["Price"],
                "model": {"type": "onnx", "path": "x.onnx"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, PricingError::Configuration(_)));
    }

    #[test]
    fn test_file_source_rejects_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lgbm_model.onnx"), b"not really onnx").unwrap();
        std::fs::write(
            dir.path().join("lgbm_model.json"),
            r#"{"algorithm": "LightGBM", "version": "1", "feature_order": ["Latitude"],
                "model": {"type": "onnx", "path": "lgbm_model.onnx", "sha256": "00ff"}}"#,
        )
        .unwrap();

        let err = FileModelSource::new(dir.path()).load("LightGBM", "lgbm").err().unwrap();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_file_source_rejects_wrong_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("xgb_model.json"),
            r#"{"algorithm": "LightGBM", "version": "1", "feature_order": ["Latitude"],
                "model": {"type": "tree_ensemble", "trees": [{"leaf": {"value": 1.0}}]}}"#,
        )
        .unwrap();

        let err = FileModelSource::new(dir.path()).load("XGBoost", "xgb").err().unwrap();
        assert!(matches!(err, PricingError::Configuration(_)));
    }

    #[test]
    fn test_missing_manifest_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::from_dir(AlgorithmTable::default(), dir.path());
        let err = registry.get_model("LightGBM").err().unwrap();
        assert!(matches!(err, PricingError::Configuration(_)));
        assert!(!registry.is_loaded("LightGBM"));
    }

    #[test]
    fn test_status_queries_do_not_wait_for_loads() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let registry = Arc::new(ModelRegistry::new(
            AlgorithmTable::default(),
            GatedSource {
                started: Mutex::new(started_tx),
                release: Mutex::new(release_rx),
            },
        ));

        let loader = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.get_model("LightGBM").map(|_| ()))
        };
        started_rx.recv().unwrap();

        assert!(!registry.is_loaded("LightGBM"));
        assert!(registry.loaded_metadata("LightGBM").is_none());
        assert!(registry.loaded_metadata("XGBoost").is_none());

        release_tx.send(()).unwrap();
        loader.join().unwrap().unwrap();
        assert!(registry.is_loaded("LightGBM"));
        assert_eq!(registry.loaded_metadata("LightGBM").unwrap().version, "test");
    }

    #[test]
    fn test_layout_without_artifacts_is_never_cached() {
        let source = CountingSource::default();
        let loads = source.loads.clone();
        let encoder = FeatureEncoder::new(
            Arc::new(VocabularyStore::default()),
            Arc::new(BinStore::default()),
        );
        let registry =
            ModelRegistry::new(AlgorithmTable::default(), source).with_layout_check(encoder);

        let err = registry.get_model("LightGBM").err().unwrap();
        assert!(matches!(err, PricingError::Configuration(_)));
        assert!(err.to_string().contains("No vocabulary"));
        assert!(!registry.is_loaded("LightGBM"));

        assert!(registry.get_model("LightGBM").is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }
}
