//! Trained point-prediction model plus the calibration data recorded with it.
//!
//! The regression itself is fitted elsewhere; this module only evaluates it
//! and carries the held-out MAE and per-feature training standard deviations
//! that the simulator and the probability estimate need.

pub mod linear;

pub use linear::{LinearPredictor, ModelArtifact};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::stats::mean_std;
use crate::error::{EngineError, EngineResult};

/// One model input: feature name -> value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRow(BTreeMap<String, f64>);

impl FeatureRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        self.0.get(feature).copied()
    }

    pub fn get_mut(&mut self, feature: &str) -> Option<&mut f64> {
        self.0.get_mut(feature)
    }

    pub fn insert(&mut self, feature: impl Into<String>, value: f64) {
        self.0.insert(feature.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FeatureRow {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        FeatureRow(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// A trained point-prediction function.
pub trait PointPredictor: Send + Sync {
    fn predict(&self, row: &FeatureRow) -> EngineResult<f64>;
}

/// Point predictor with its calibration error and noise scales.
pub struct CalibratedModel {
    predictor: Box<dyn PointPredictor>,
    /// Held-out mean absolute error
    pub mae: f64,
    /// Training standard deviation of every non-constant, non-binary feature
    pub stds: BTreeMap<String, f64>,
}

impl CalibratedModel {
    pub fn new(
        predictor: Box<dyn PointPredictor>,
        mae: f64,
        stds: BTreeMap<String, f64>,
    ) -> Self {
        CalibratedModel {
            predictor,
            mae,
            stds,
        }
    }

    pub fn predict(&self, row: &FeatureRow) -> EngineResult<f64> {
        let p = self.predictor.predict(row)?;
        if !p.is_finite() {
            return Err(EngineError::Model(format!("non-finite prediction {}", p)));
        }
        Ok(p)
    }
}

/// True when the non-NaN values are exactly the two values `0` and `1`.
pub fn is_binary(values: &[f64]) -> bool {
    let mut seen_zero = false;
    let mut seen_one = false;
    for v in values.iter().filter(|v| !v.is_nan()) {
        if *v == 0.0 {
            seen_zero = true;
        } else if *v == 1.0 {
            seen_one = true;
        } else {
            return false;
        }
    }
    seen_zero && seen_one
}

/// Sample standard deviation of every listed feature across the training rows,
/// skipping binary features and features that never vary.
pub fn feature_stds(rows: &[FeatureRow], features: &[String]) -> BTreeMap<String, f64> {
    let mut stds = BTreeMap::new();
    for feature in features {
        let values: Vec<f64> = rows
            .iter()
            .filter_map(|r| r.get(feature))
            .filter(|v| !v.is_nan())
            .collect();
        if is_binary(&values) {
            continue;
        }
        if let Ok((_, std)) = mean_std(&values) {
            if std > 0.0 && std.is_finite() {
                stds.insert(feature.clone(), std);
            }
        }
    }
    stds
}

/// Mean absolute error between held-out targets and predictions.
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> EngineResult<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return Err(EngineError::InsufficientData);
    }
    let total: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum();
    Ok(total / actual.len() as f64)
}
