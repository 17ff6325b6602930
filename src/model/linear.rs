use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::{CalibratedModel, FeatureRow, PointPredictor};
use crate::error::{EngineError, EngineResult};

/// Exported model artifact: linear coefficients plus the calibration data
/// recorded at training time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub intercept: f64,
    pub weights: BTreeMap<String, f64>,
    pub mae: f64,
    #[serde(default)]
    pub stds: BTreeMap<String, f64>,
}

impl ModelArtifact {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact {}", path.display()))?;
        let artifact: ModelArtifact = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse model artifact {}", path.display()))?;
        if !(artifact.mae.is_finite() && artifact.mae >= 0.0) {
            anyhow::bail!("model artifact mae must be a non-negative number");
        }
        info!(
            "Loaded model artifact {} ({} features, mae={:.3})",
            path.display(),
            artifact.weights.len(),
            artifact.mae
        );
        Ok(artifact)
    }

    pub fn into_model(self) -> CalibratedModel {
        let predictor = LinearPredictor {
            intercept: self.intercept,
            weights: self.weights,
        };
        CalibratedModel::new(Box::new(predictor), self.mae, self.stds)
    }
}

/// `intercept + Σ weight·value` over the artifact's features.
#[derive(Debug, Clone)]
pub struct LinearPredictor {
    pub intercept: f64,
    pub weights: BTreeMap<String, f64>,
}

impl PointPredictor for LinearPredictor {
    fn predict(&self, row: &FeatureRow) -> EngineResult<f64> {
        let mut y = self.intercept;
        for (feature, w) in &self.weights {
            let x = row
                .get(feature)
                .ok_or_else(|| EngineError::Model(format!("feature {} missing from row", feature)))?;
            y += w * x;
        }
        Ok(y)
    }
}
