//! Gradient-boosted tree ensembles evaluated natively
//!
//! Both LightGBM and XGBoost can dump their trees; the dump is converted to
//! this node format offline so the service does not need either runtime.

use super::{ModelMetadata, TrainedModel};
use crate::error::{PricingError, Result};
use crate::features::EncodedFeatureVector;
use serde::Deserialize;

/// How a split compares the feature value against its threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRule {
    /// `x < threshold` goes left (XGBoost)
    #[default]
    LessThan,
    /// `x <= threshold` goes left (LightGBM)
    LessOrEqual,
}

impl SplitRule {
    fn goes_left(&self, value: f64, threshold: f64) -> bool {
        match self {
            SplitRule::LessThan => value < threshold,
            SplitRule::LessOrEqual => value <= threshold,
        }
    }
}

fn default_left() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        /// Side taken when the feature value is NaN
        #[serde(default = "default_left")]
        default_left: bool,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, sample: &[f64], rule: SplitRule) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    default_left,
                    left,
                    right,
                } => {
                    let x = sample[*feature];
                    let go_left = if x.is_nan() {
                        *default_left
                    } else {
                        rule.goes_left(x, *threshold)
                    };
                    node = if go_left { &**left } else { &**right };
                }
            }
        }
    }

    fn validate(&self, n_features: usize) -> Result<()> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(PricingError::config("Tree leaf value must be finite"));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(PricingError::config(format!(
                            "Tree splits on feature {} but the model has {} features",
                            feature, n_features
                        )));
                    }
                    if threshold.is_nan() {
                        return Err(PricingError::config("Tree split threshold is NaN"));
                    }
                    stack.push(&**left);
                    stack.push(&**right);
                }
            }
        }
        Ok(())
    }
}

/// Additive ensemble: `base_score + sum(tree outputs)`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub base_score: f64,
    #[serde(default)]
    pub split_rule: SplitRule,
    pub trees: Vec<TreeNode>,
}

impl TreeEnsemble {
    pub fn predict(&self, sample: &[f64]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|tree| tree.predict(sample, self.split_rule))
                .sum::<f64>()
    }
}

pub struct TreeModel {
    ensemble: TreeEnsemble,
    metadata: ModelMetadata,
}

impl TreeModel {
    pub fn new(ensemble: TreeEnsemble, metadata: ModelMetadata) -> Result<Self> {
        if ensemble.trees.is_empty() {
            return Err(PricingError::config(format!(
                "Tree ensemble for {} has no trees",
                metadata.algorithm
            )));
        }
        for tree in &ensemble.trees {
            tree.validate(metadata.layout.len())?;
        }
        Ok(Self { ensemble, metadata })
    }
}

impl TrainedModel for TreeModel {
    fn score(&self, features: &EncodedFeatureVector) -> Result<f64> {
        self.metadata.check_input(features)?;
        let prediction = self.ensemble.predict(features.values());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureColumn, FeatureLayout};

    fn ensemble(rule: &str) -> TreeEnsemble {
        serde_json::from_str(&format!(
            r#"{{
                "base_score": 100.0,
                "split_rule": "{}",
                "trees": [
                    {{"split": {{"feature": 0, "threshold": 2.0,
                        "left": {{"leaf": {{"value": -10.0}}}},
                        "right": {{"leaf": {{"value": 25.0}}}}}}}},
                    {{"split": {{"feature": 1, "threshold": 0.5, "default_left": false,
                        "left": {{"leaf": {{"value": 1.5}}}},
                        "right": {{"leaf": {{"value": 3.0}}}}}}}}
                ]
            }}"#,
            rule
        ))
        .unwrap()
    }

    #[test]
    fn test_split_rules_differ_at_threshold() {
        let xgb = ensemble("less_than");
        let lgbm = ensemble("less_or_equal");
        assert_eq!(xgb.predict(&[2.0, 0.0]), 100.0 + 25.0 + 1.5);
        assert_eq!(lgbm.predict(&[2.0, 0.0]), 100.0 - 10.0 + 1.5);
    }

    #[test]
    fn test_nan_follows_default_direction() {
        let e = ensemble("less_than");
        assert_eq!(e.predict(&[f64::NAN, f64::NAN]), 100.0 - 10.0 + 3.0);
    }

    #[test]
    fn test_out_of_range_feature_rejected() {
        let metadata = ModelMetadata {
            algorithm: "XGBoost".to_string(),
            version: "1".to_string(),
            layout: FeatureLayout::new(vec![FeatureColumn::Latitude], vec![]).unwrap(),
            format: "tree_ensemble",
        };
        let err = TreeModel::new(ensemble("less_than"), metadata).err().unwrap();
        assert!(err.to_string().contains("feature 1"));
    }

    #[test]
    fn test_empty_ensemble_rejected() {
        let metadata = ModelMetadata {
            algorithm: "XGBoost".to_string(),
            version: "1".to_string(),
            layout: FeatureLayout::full(vec![]).unwrap(),
            format: "tree_ensemble",
        };
        let empty = TreeEnsemble {
            base_score: 0.0,
            split_rule: SplitRule::LessThan,
            trees: vec![],
        };
        assert!(TreeModel::new(empty, metadata).is_err());
    }
}
