//! Sample statistics and normal-approximation outcome probabilities.
//!
//! A prediction with calibration error `σ` (the model's held-out MAE) is
//! treated as `X ~ N(prediction, σ²)`; the market line is the threshold.

use statrs::function::erf::erfc;

use crate::error::{EngineError, EngineResult};

/// Mean and sample standard deviation (n − 1 denominator).
///
/// A single value has standard deviation `0.0`.
pub fn mean_std(values: &[f64]) -> EngineResult<(f64, f64)> {
    if values.is_empty() {
        return Err(EngineError::InsufficientData);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() == 1 {
        return Ok((mean, 0.0));
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Ok((mean, var.sqrt()))
}

/// Φ((x − mean) / std) for `std > 0`.
fn normal_cdf(x: f64, mean: f64, std: f64) -> f64 {
    0.5 * erfc(-(x - mean) / (std * std::f64::consts::SQRT_2))
}

/// P(X > line). A non-positive `std` is a point mass at `mean`: `1.0` when
/// `mean > line`, otherwise `0.0` (so `mean == line` counts as not over).
pub fn probability_over(line: f64, mean: f64, std: f64) -> f64 {
    if std <= 0.0 {
        return if mean > line { 1.0 } else { 0.0 };
    }
    (1.0 - normal_cdf(line, mean, std)).clamp(0.0, 1.0)
}

/// P(X ≤ line). Always the complement of [`probability_over`].
pub fn probability_under(line: f64, mean: f64, std: f64) -> f64 {
    if std <= 0.0 {
        return 1.0 - probability_over(line, mean, std);
    }
    normal_cdf(line, mean, std).clamp(0.0, 1.0)
}

/// Fraction of samples strictly above `line`.
pub fn empirical_over_probability(samples: &[f64], line: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let over = samples.iter().filter(|s| **s > line).count();
    over as f64 / samples.len() as f64
}
