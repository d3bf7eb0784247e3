use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;

use crate::geometry::round2;

const FEATURE_COUNT: usize = 3;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("model file malformed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("model expects {expected} features, file has {found}")]
    Shape { expected: usize, found: usize },
    #[error("tree {index} is malformed: {reason}")]
    Tree { index: usize, reason: String },
    #[error("model produced a non-finite prediction")]
    NonFinite,
}

#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct InvalidFeatures(pub String);

/// Inputs shared by every yield model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldFeatures {
    pub fry_quantity: f64,
    pub days_cultured: f64,
    pub area_sqm: f64,
}

impl YieldFeatures {
    pub fn new(fry_quantity: i64, days_cultured: i64, area_sqm: f64) -> Result<Self, InvalidFeatures> {
        if fry_quantity < 0 {
            return Err(InvalidFeatures("fry_quantity must not be negative".to_string()));
        }
        if days_cultured < 0 {
            return Err(InvalidFeatures("days_cultured must not be negative".to_string()));
        }
        if !area_sqm.is_finite() || area_sqm < 0.0 {
            return Err(InvalidFeatures("area_sqm must be a non-negative number".to_string()));
        }
        Ok(Self {
            fry_quantity: fry_quantity as f64,
            days_cultured: days_cultured as f64,
            area_sqm,
        })
    }

    fn as_row(&self) -> [f64; FEATURE_COUNT] {
        [self.fry_quantity, self.days_cultured, self.area_sqm]
    }
}

pub trait YieldModel: Send + Sync {
    fn name(&self) -> &'static str;
    fn predict_kg(&self, features: &YieldFeatures) -> Result<f64, ModelError>;
}

/// On-disk model export. `kind` selects the estimator family.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelFile {
    Linear(LinearYieldModel),
    RandomForest(ForestYieldModel),
}

impl ModelFile {
    pub fn load(path: &Path) -> Result<Box<dyn YieldModel>, ModelError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Box<dyn YieldModel>, ModelError> {
        match serde_json::from_str::<ModelFile>(raw)? {
            ModelFile::Linear(model) => {
                model.validate()?;
                Ok(Box::new(model))
            }
            ModelFile::RandomForest(model) => {
                model.validate()?;
                Ok(Box::new(model))
            }
        }
    }
}

/// Ordinary least-squares fit: `intercept + coefficients . features`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearYieldModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub feature_names: Vec<String>,
}

impl LinearYieldModel {
    fn validate(&self) -> Result<(), ModelError> {
        if self.coefficients.len() != FEATURE_COUNT {
            return Err(ModelError::Shape {
                expected: FEATURE_COUNT,
                found: self.coefficients.len(),
            });
        }
        check_feature_names(&self.feature_names)
    }
}

impl YieldModel for LinearYieldModel {
    fn name(&self) -> &'static str {
        "model"
    }

    fn predict_kg(&self, features: &YieldFeatures) -> Result<f64, ModelError> {
        let value = self
            .coefficients
            .iter()
            .zip(features.as_row())
            .fold(self.intercept, |acc, (weight, x)| acc + weight * x);
        finite(value)
    }
}

/// Leaf marker used for `children_left` / `children_right`.
const LEAF: i64 = -1;

/// One regression tree in flattened array form, one entry per node. A node
/// is a leaf when its left child is `-1`; otherwise samples with
/// `features[feature] <= threshold` go left.
#[derive(Debug, Clone, Deserialize)]
pub struct RegressionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<f64>,
}

impl RegressionTree {
    fn validate(&self, index: usize) -> Result<(), ModelError> {
        let nodes = self.children_left.len();
        let broken = |reason: String| ModelError::Tree { index, reason };

        if nodes == 0 {
            return Err(broken("tree has no nodes".to_string()));
        }
        for (name, len) in [
            ("children_right", self.children_right.len()),
            ("feature", self.feature.len()),
            ("threshold", self.threshold.len()),
            ("value", self.value.len()),
        ] {
            if len != nodes {
                return Err(broken(format!("{name} has {len} entries, expected {nodes}")));
            }
        }

        for node in 0..nodes {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF {
                if !self.value[node].is_finite() {
                    return Err(broken(format!("leaf {node} has a non-finite value")));
                }
                continue;
            }
            // Children always follow their parent, which also rules out cycles.
            for child in [left, right] {
                if child <= node as i64 || child >= nodes as i64 {
                    return Err(broken(format!("node {node} has invalid child {child}")));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature >= FEATURE_COUNT as i64 {
                return Err(broken(format!("node {node} splits on unknown feature {feature}")));
            }
        }
        Ok(())
    }

    fn predict(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        let mut node = 0usize;
        while self.children_left[node] != LEAF {
            let feature = self.feature[node] as usize;
            node = if row[feature] <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        self.value[node]
    }
}

/// Random forest regressor: the mean of its trees' predictions.
#[derive(Debug, Clone, Deserialize)]
pub struct ForestYieldModel {
    pub trees: Vec<RegressionTree>,
    #[serde(default)]
    pub feature_names: Vec<String>,
}

impl ForestYieldModel {
    fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Tree {
                index: 0,
                reason: "forest has no trees".to_string(),
            });
        }
        check_feature_names(&self.feature_names)?;
        self.trees
            .iter()
            .enumerate()
            .try_for_each(|(index, tree)| tree.validate(index))
    }
}

impl YieldModel for ForestYieldModel {
    fn name(&self) -> &'static str {
        "model"
    }

    fn predict_kg(&self, features: &YieldFeatures) -> Result<f64, ModelError> {
        let row = features.as_row();
        let total: f64 = self.trees.iter().map(|tree| tree.predict(&row)).sum();
        finite(total / self.trees.len() as f64)
    }
}

// Names are optional in an export, but when present they must line up.
fn check_feature_names(names: &[String]) -> Result<(), ModelError> {
    if !names.is_empty() && names.len() != FEATURE_COUNT {
        return Err(ModelError::Shape {
            expected: FEATURE_COUNT,
            found: names.len(),
        });
    }
    Ok(())
}

fn finite(value: f64) -> Result<f64, ModelError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ModelError::NonFinite)
    }
}

/// Growth-curve estimate matching the synthetic data the regression was
/// trained on. Used whenever the exported model is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrowthCurveModel;

impl YieldModel for GrowthCurveModel {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn predict_kg(&self, features: &YieldFeatures) -> Result<f64, ModelError> {
        let density = if features.area_sqm > 0.0 {
            features.fry_quantity / features.area_sqm
        } else {
            5.0
        };
        let survival = (0.90 - (density - 5.0) * 0.015).clamp(0.5, 0.98);
        let avg_weight_kg = 0.05 + features.days_cultured * 0.0025;
        Ok(features.fry_quantity * survival * avg_weight_kg)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct YieldEstimate {
    pub predicted_yield_kg: f64,
    pub estimated_revenue: f64,
    pub source: &'static str,
}

/// Yield prediction with a heuristic fallback; never fails once the
/// features are valid.
pub struct YieldService {
    model: Option<Box<dyn YieldModel>>,
    fallback: GrowthCurveModel,
    price_per_kg: f64,
}

impl YieldService {
    pub fn new(model: Option<Box<dyn YieldModel>>, price_per_kg: f64) -> Self {
        Self {
            model,
            fallback: GrowthCurveModel,
            price_per_kg,
        }
    }

    pub fn from_path(path: &Path, price_per_kg: f64) -> Self {
        let model = match ModelFile::load(path) {
            Ok(model) => {
                tracing::info!(path = %path.display(), "yield model loaded");
                Some(model)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "yield model unavailable, using growth curve");
                None
            }
        };
        Self::new(model, price_per_kg)
    }

    pub fn estimate(&self, features: &YieldFeatures) -> YieldEstimate {
        let primary = self.model.as_deref().map(|model| (model.name(), model.predict_kg(features)));

        let (source, kg) = match primary {
            Some((name, Ok(kg))) => (name, kg),
            Some((_, Err(err))) => {
                tracing::warn!(error = %err, "yield model failed, using growth curve");
                self.fallback_kg(features)
            }
            None => self.fallback_kg(features),
        };

        let kg = kg.max(0.0);
        YieldEstimate {
            predicted_yield_kg: round2(kg),
            estimated_revenue: round2(kg * self.price_per_kg),
            source,
        }
    }

    fn fallback_kg(&self, features: &YieldFeatures) -> (&'static str, f64) {
        let kg = self.fallback.predict_kg(features).unwrap_or(0.0);
        (self.fallback.name(), kg)
    }
}
