//! Random forest regressor.
//!
//! Bootstrap-aggregated ensemble of multi-output [`RegressionTree`]s.
//! Outputs are standardised before fitting so that every target weighs
//! equally in the split criterion, and de-standardised on prediction.
//! The forest prediction is the mean of the tree predictions.

use serde::{Deserialize, Serialize};

use super::rng::SimpleRng;
use super::tree::{RegressionTree, TreeParams};
use crate::config::ModelConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
    target_mean: Vec<f64>,
    target_scale: Vec<f64>,
}

impl RandomForest {
    /// Fit the forest. `x` and `y` must be non-empty and of equal length.
    pub fn fit(x: &[Vec<f64>], y: &[Vec<f64>], config: &ModelConfig, rng: &mut SimpleRng) -> Self {
        let n = x.len();
        let n_features = x.first().map_or(0, Vec::len);
        let (target_mean, target_scale) = column_stats(y);

        let scaled: Vec<Vec<f64>> = y
            .iter()
            .map(|row| {
                row.iter()
                    .zip(target_mean.iter().zip(&target_scale))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect()
            })
            .collect();

        let params = TreeParams {
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: features_per_split(config.max_features, n_features),
        };

        let trees = (0..config.n_estimators)
            .map(|_| {
                let mut tree_rng = rng.fork();
                let rows: Vec<usize> = if config.bootstrap {
                    (0..n).map(|_| tree_rng.below(n)).collect()
                } else {
                    (0..n).collect()
                };
                RegressionTree::fit(x, &scaled, &rows, &params, &mut tree_rng)
            })
            .collect();

        Self {
            trees,
            n_features,
            target_mean,
            target_scale,
        }
    }

    /// Predict every output for a single sample.
    pub fn predict(&self, features: &[f64]) -> Vec<f64> {
        let mut sums = vec![0.0; self.target_mean.len()];
        for tree in &self.trees {
            for (s, v) in sums.iter_mut().zip(tree.predict(features)) {
                *s += v;
            }
        }
        let n = self.trees.len().max(1) as f64;
        sums.iter()
            .zip(self.target_mean.iter().zip(&self.target_scale))
            .map(|(s, (m, scale))| s / n * scale + m)
            .collect()
    }

    /// Check a deserialized forest against the model schema.
    pub(crate) fn check_shape(&self, n_features: usize, n_outputs: usize) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".into());
        }
        if self.n_features != n_features {
            return Err(format!(
                "forest expects {} features, model has {n_features}",
                self.n_features
            ));
        }
        if self.target_mean.len() != n_outputs || self.target_scale.len() != n_outputs {
            return Err(format!("forest target scaling does not cover {n_outputs} targets"));
        }
        self.trees
            .iter()
            .try_for_each(|tree| tree.check_shape(n_features, n_outputs))
    }

    /// Number of trees in the forest.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Average tree depth across the forest.
    pub fn avg_depth(&self) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: usize = self.trees.iter().map(RegressionTree::depth).sum();
        total as f64 / self.trees.len() as f64
    }

    /// Total number of nodes across all trees.
    pub fn total_nodes(&self) -> usize {
        self.trees.iter().map(RegressionTree::n_nodes).sum()
    }
}

/// Per-column mean and standard deviation (1.0 for constant columns).
pub(crate) fn column_stats(y: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let k = y.first().map_or(0, Vec::len);
    let n = y.len().max(1) as f64;
    let mut mean = vec![0.0; k];
    for row in y {
        for (m, v) in mean.iter_mut().zip(row) {
            *m += v / n;
        }
    }
    let mut var = vec![0.0; k];
    for row in y {
        for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
            *acc += (v - m).powi(2) / n;
        }
    }
    let scale = var
        .iter()
        .map(|v| {
            let sd = v.sqrt();
            if sd > 1e-12 {
                sd
            } else {
                1.0
            }
        })
        .collect();
    (mean, scale)
}

/// Feature count tried per split for a fraction in `(0, 1]`.
pub(crate) fn features_per_split(fraction: f64, n_features: usize) -> usize {
    ((fraction * n_features as f64).ceil() as usize).clamp(1, n_features.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data() -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        // wavelength grows with indium fraction, intensity falls with width
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..8 {
            for j in 0..5 {
                let in_fraction = 0.25 + 0.01 * i as f64;
                let width = 5.0 + j as f64;
                x.push(vec![in_fraction, width]);
                y.push(vec![900.0 + 400.0 * in_fraction, 1.2 - 0.1 * width]);
            }
        }
        (x, y)
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let (x, y) = linear_data();
        let config = ModelConfig {
            n_estimators: 10,
            ..ModelConfig::default()
        };
        let a = RandomForest::fit(&x, &y, &config, &mut SimpleRng::new(3));
        let b = RandomForest::fit(&x, &y, &config, &mut SimpleRng::new(3));
        assert_eq!(a, b);
        assert_eq!(a.n_trees(), 10);
        assert_eq!(a.n_features(), 2);
    }

    #[test]
    fn without_bootstrap_training_rows_are_reproduced() {
        let (x, y) = linear_data();
        let config = ModelConfig {
            n_estimators: 5,
            bootstrap: false,
            ..ModelConfig::default()
        };
        let forest = RandomForest::fit(&x, &y, &config, &mut SimpleRng::new(1));
        for (xi, yi) in x.iter().zip(&y) {
            let pred = forest.predict(xi);
            assert!((pred[0] - yi[0]).abs() < 1e-9);
            assert!((pred[1] - yi[1]).abs() < 1e-9);
        }
    }

    #[test]
    fn predictions_track_both_outputs() {
        let (x, y) = linear_data();
        let config = ModelConfig {
            n_estimators: 50,
            ..ModelConfig::default()
        };
        let forest = RandomForest::fit(&x, &y, &config, &mut SimpleRng::new(11));

        let low = forest.predict(&[0.25, 5.0]);
        let high = forest.predict(&[0.32, 9.0]);
        assert!(high[0] > low[0] + 10.0, "wavelength should rise: {low:?} → {high:?}");
        assert!(high[1] < low[1] - 0.2, "intensity should fall: {low:?} → {high:?}");
        assert!(forest.total_nodes() > forest.n_trees());
        assert!(forest.avg_depth() >= 1.0);
    }

    #[test]
    fn constant_target_column_is_safe() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        let y = vec![vec![1.0, 7.0], vec![2.0, 7.0], vec![3.0, 7.0]];
        let forest = RandomForest::fit(&x, &y, &ModelConfig::default(), &mut SimpleRng::new(0));
        let pred = forest.predict(&[1.0]);
        assert!((pred[1] - 7.0).abs() < 1e-12);
    }

    #[test]
    fn feature_fraction_rounds_up() {
        assert_eq!(features_per_split(1.0, 3), 3);
        assert_eq!(features_per_split(0.34, 3), 2);
        assert_eq!(features_per_split(0.01, 3), 1);
    }
}
