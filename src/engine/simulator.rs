//! Monte Carlo perturbation of a single model input.
//!
//! Every iteration starts from the unperturbed row, adds independent
//! `N(0, σ_feature)` noise to each randomized feature and re-runs the point
//! prediction. The spread of the resulting predictions approximates the
//! uncertainty coming from the estimated (form, pace, rating) inputs.

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;
use std::collections::HashSet;
use tracing::debug;

use super::stats::{empirical_over_probability, mean_std};
use crate::error::{EngineError, EngineResult};
use crate::model::{CalibratedModel, FeatureRow};

/// Distribution summary of one simulation run against a market line.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSummary {
    pub n: usize,
    pub mean: f64,
    pub std: f64,
    pub p_over: f64,
    pub p_under: f64,
}

pub struct PredictiveSimulator<'a> {
    model: &'a CalibratedModel,
}

impl<'a> PredictiveSimulator<'a> {
    pub fn new(model: &'a CalibratedModel) -> Self {
        PredictiveSimulator { model }
    }

    /// Run `n` perturbed predictions. `seed` makes the run reproducible;
    /// without one the generator is seeded from entropy.
    pub fn simulate(
        &self,
        row: &FeatureRow,
        excluded: &HashSet<String>,
        n: usize,
        seed: Option<u64>,
    ) -> EngineResult<Vec<f64>> {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        self.simulate_with_rng(row, excluded, n, &mut rng)
    }

    pub fn simulate_with_rng<R: Rng + ?Sized>(
        &self,
        row: &FeatureRow,
        excluded: &HashSet<String>,
        n: usize,
        rng: &mut R,
    ) -> EngineResult<Vec<f64>> {
        let noise = self.noise_sources(row, excluded)?;
        debug!(
            "Simulating {} draws with {} randomized feature(s)",
            n,
            noise.len()
        );

        let mut predictions = Vec::with_capacity(n);
        for _ in 0..n {
            let mut noisy = row.clone();
            for (feature, dist) in &noise {
                if let Some(v) = noisy.get_mut(feature) {
                    *v += dist.sample(rng);
                }
            }
            predictions.push(self.model.predict(&noisy)?);
        }
        Ok(predictions)
    }

    /// Features that receive noise: present in the row, carrying a positive
    /// training std, and not excluded.
    fn noise_sources(
        &self,
        row: &FeatureRow,
        excluded: &HashSet<String>,
    ) -> EngineResult<Vec<(String, Normal)>> {
        let mut sources = Vec::new();
        for (feature, std) in &self.model.stds {
            if excluded.contains(feature) || row.get(feature).is_none() {
                continue;
            }
            if !(std.is_finite() && *std > 0.0) {
                continue;
            }
            let dist = Normal::new(0.0, *std).map_err(|e| {
                EngineError::Model(format!("bad noise scale for {}: {}", feature, e))
            })?;
            sources.push((feature.clone(), dist));
        }
        Ok(sources)
    }
}

/// Summarize simulated outcomes against `line`.
pub fn summarize(samples: &[f64], line: f64) -> EngineResult<SimulationSummary> {
    let (mean, std) = mean_std(samples)?;
    let p_over = empirical_over_probability(samples, line);
    Ok(SimulationSummary {
        n: samples.len(),
        mean,
        std,
        p_over,
        p_under: 1.0 - p_over,
    })
}
