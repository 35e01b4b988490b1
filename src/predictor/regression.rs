//! Regression stage: predicted delay in minutes.
//!
//! [`RidgeRegressor`] fits an L2-regularized linear model on standardized
//! features by solving the normal equations. Because inputs are
//! standardized, the per-feature terms `β_j · z_j` are directly the
//! marginal contributions used for factor ranking.
//!
//! # Reference
//! Hastie, Tibshirani & Friedman (2009), "The Elements of Statistical
//! Learning", Ch. 3.4.1

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use super::features::FEATURE_COUNT;
use crate::error::{Error, Result};

/// One engineered feature vector.
pub type FeatureRow = [f64; FEATURE_COUNT];

/// Strategy for the regression stage.
///
/// `fit` never mutates the receiver: it returns a new fitted instance
/// with the same hyperparameters, so an active model keeps serving while
/// its replacement trains.
pub trait DelayRegressor: Send + Sync + Debug {
    /// Strategy name (e.g., "ridge").
    fn name(&self) -> &'static str;

    /// Fits a new regressor on weighted samples.
    fn fit(
        &self,
        rows: &[FeatureRow],
        targets: &[f64],
        weights: &[f64],
    ) -> Result<Box<dyn DelayRegressor>>;

    /// Predicted delay (minutes, may be negative before clamping).
    fn predict(&self, row: &FeatureRow) -> f64;

    /// Contribution of each feature to the prediction (minutes).
    fn contributions(&self, row: &FeatureRow) -> FeatureRow;
}

/// Weighted per-feature standardization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    mean: FeatureRow,
    scale: FeatureRow,
}

impl Default for Standardizer {
    fn default() -> Self {
        Self {
            mean: [0.0; FEATURE_COUNT],
            scale: [1.0; FEATURE_COUNT],
        }
    }
}

impl Standardizer {
    /// Fits means and standard deviations.
    ///
    /// Constant features get scale 1 so they map to 0.
    pub fn fit(rows: &[FeatureRow], weights: &[f64]) -> Self {
        let total: f64 = weights.iter().sum();
        if rows.is_empty() || total <= 0.0 {
            return Self::default();
        }
        let mut mean = [0.0; FEATURE_COUNT];
        for (row, &w) in rows.iter().zip(weights) {
            for j in 0..FEATURE_COUNT {
                mean[j] += w * row[j];
            }
        }
        mean.iter_mut().for_each(|m| *m /= total);

        let mut var = [0.0; FEATURE_COUNT];
        for (row, &w) in rows.iter().zip(weights) {
            for j in 0..FEATURE_COUNT {
                var[j] += w * (row[j] - mean[j]).powi(2);
            }
        }
        let scale = var.map(|v| {
            let sd = (v / total).sqrt();
            if sd > 1e-12 {
                sd
            } else {
                1.0
            }
        });
        Self { mean, scale }
    }

    pub fn transform(&self, row: &FeatureRow) -> FeatureRow {
        let mut z = [0.0; FEATURE_COUNT];
        for j in 0..FEATURE_COUNT {
            z[j] = (row[j] - self.mean[j]) / self.scale[j];
        }
        z
    }
}

/// L2-regularized linear regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegressor {
    lambda: f64,
    standardizer: Standardizer,
    coefficients: FeatureRow,
    intercept: f64,
}

impl RidgeRegressor {
    /// Creates an unfitted regressor (predicts 0).
    pub fn new(lambda: f64) -> Self {
        Self {
            lambda,
            standardizer: Standardizer::default(),
            coefficients: [0.0; FEATURE_COUNT],
            intercept: 0.0,
        }
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Coefficients on standardized features.
    pub fn coefficients(&self) -> &FeatureRow {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Default for RidgeRegressor {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl DelayRegressor for RidgeRegressor {
    fn name(&self) -> &'static str {
        "ridge"
    }

    fn fit(
        &self,
        rows: &[FeatureRow],
        targets: &[f64],
        weights: &[f64],
    ) -> Result<Box<dyn DelayRegressor>> {
        if rows.len() != targets.len() || rows.len() != weights.len() {
            return Err(Error::InvalidInput(format!(
                "{} rows, {} targets, {} weights",
                rows.len(),
                targets.len(),
                weights.len()
            )));
        }
        let total: f64 = weights.iter().sum();
        if rows.is_empty() || total <= 0.0 {
            return Err(Error::InsufficientData {
                available: rows.len(),
                required: 1,
            });
        }

        let standardizer = Standardizer::fit(rows, weights);
        let intercept = targets.iter().zip(weights).map(|(y, w)| y * w).sum::<f64>() / total;

        // (Zᵀ W Z + λI) β = Zᵀ W (y - ȳ)
        let mut gram = [[0.0; FEATURE_COUNT]; FEATURE_COUNT];
        let mut rhs = [0.0; FEATURE_COUNT];
        for ((row, &y), &w) in rows.iter().zip(targets).zip(weights) {
            let z = standardizer.transform(row);
            for i in 0..FEATURE_COUNT {
                rhs[i] += w * z[i] * (y - intercept);
                for j in 0..FEATURE_COUNT {
                    gram[i][j] += w * z[i] * z[j];
                }
            }
        }
        for (i, row) in gram.iter_mut().enumerate() {
            row[i] += self.lambda;
        }

        let coefficients = solve_linear(gram, rhs)?;
        Ok(Box::new(Self {
            lambda: self.lambda,
            standardizer,
            coefficients,
            intercept,
        }))
    }

    fn predict(&self, row: &FeatureRow) -> f64 {
        self.intercept + self.contributions(row).iter().sum::<f64>()
    }

    fn contributions(&self, row: &FeatureRow) -> FeatureRow {
        let z = self.standardizer.transform(row);
        let mut c = [0.0; FEATURE_COUNT];
        for j in 0..FEATURE_COUNT {
            c[j] = self.coefficients[j] * z[j];
        }
        c
    }
}

/// Solves `A x = b` by Gaussian elimination with partial pivoting.
pub fn solve_linear<const N: usize>(mut a: [[f64; N]; N], mut b: [f64; N]) -> Result<[f64; N]> {
    for col in 0..N {
        let pivot = (col..N)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(Error::InvalidInput("singular normal equations".into()));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..N {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..N {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; N];
    for row in (0..N).rev() {
        let tail: f64 = (row + 1..N).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
