//! Gradient boosting regressor (squared-error loss).
//!
//! Sequential ensemble of shallow regression trees. Each tree predicts a
//! residual correction to the previous cumulative prediction; the final
//! output is the initial prediction (the target mean) plus all tree
//! contributions scaled by the learning rate.
//!
//! Multi-output prediction uses one independent chain of trees per target.

use serde::{Deserialize, Serialize};

use super::forest::features_per_split;
use super::rng::SimpleRng;
use super::tree::{RegressionTree, TreeParams};
use crate::config::ModelConfig;

/// Depth used when the configuration leaves `max_depth` open.
pub const DEFAULT_BOOSTING_DEPTH: usize = 3;

/// Boosted trees for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedChain {
    pub initial_prediction: f64,
    pub trees: Vec<RegressionTree>,
}

impl BoostedChain {
    fn predict(&self, features: &[f64], learning_rate: f64) -> f64 {
        self.trees
            .iter()
            .fold(self.initial_prediction, |acc, tree| {
                acc + learning_rate * tree.predict(features)[0]
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    chains: Vec<BoostedChain>,
    learning_rate: f64,
    n_features: usize,
}

impl GradientBoosting {
    /// Fit one chain per output column. `x` and `y` must be non-empty and
    /// of equal length.
    pub fn fit(x: &[Vec<f64>], y: &[Vec<f64>], config: &ModelConfig, rng: &mut SimpleRng) -> Self {
        let n = x.len();
        let n_features = x.first().map_or(0, Vec::len);
        let n_outputs = y.first().map_or(0, Vec::len);
        let params = TreeParams {
            max_depth: Some(config.max_depth.unwrap_or(DEFAULT_BOOSTING_DEPTH)),
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: features_per_split(config.max_features, n_features),
        };
        let sample_size = ((config.subsample * n as f64).round() as usize).clamp(1, n);

        let chains = (0..n_outputs)
            .map(|output| {
                let target: Vec<f64> = y.iter().map(|row| row[output]).collect();
                let initial_prediction = target.iter().sum::<f64>() / n as f64;
                let mut current = vec![initial_prediction; n];
                let mut trees = Vec::with_capacity(config.n_estimators);

                for _ in 0..config.n_estimators {
                    let residuals: Vec<Vec<f64>> = target
                        .iter()
                        .zip(&current)
                        .map(|(t, c)| vec![t - c])
                        .collect();

                    let mut rows: Vec<usize> = (0..n).collect();
                    if sample_size < n {
                        rng.shuffle(&mut rows);
                        rows.truncate(sample_size);
                    }

                    let tree = RegressionTree::fit(x, &residuals, &rows, &params, rng);
                    for (c, xi) in current.iter_mut().zip(x) {
                        *c += config.learning_rate * tree.predict(xi)[0];
                    }
                    trees.push(tree);
                }

                BoostedChain {
                    initial_prediction,
                    trees,
                }
            })
            .collect();

        Self {
            chains,
            learning_rate: config.learning_rate,
            n_features,
        }
    }

    /// Predict every output for a single sample.
    pub fn predict(&self, features: &[f64]) -> Vec<f64> {
        self.chains
            .iter()
            .map(|chain| chain.predict(features, self.learning_rate))
            .collect()
    }

    /// Check a deserialized model against the model schema.
    pub(crate) fn check_shape(&self, n_features: usize, n_outputs: usize) -> Result<(), String> {
        if self.n_features != n_features {
            return Err(format!(
                "boosting expects {} features, model has {n_features}",
                self.n_features
            ));
        }
        if self.chains.len() != n_outputs {
            return Err(format!(
                "boosting has {} chains for {n_outputs} targets",
                self.chains.len()
            ));
        }
        self.chains
            .iter()
            .flat_map(|chain| &chain.trees)
            .try_for_each(|tree| tree.check_shape(n_features, 1))
    }

    /// Number of boosting rounds per target.
    pub fn n_estimators(&self) -> usize {
        self.chains.first().map_or(0, |c| c.trees.len())
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let x: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64 / 10.0]).collect();
        let y: Vec<Vec<f64>> = x
            .iter()
            .map(|xi| vec![950.0 + 20.0 * xi[0], 1.0 - 0.2 * xi[0]])
            .collect();
        (x, y)
    }

    fn mean_abs_error(model: &GradientBoosting, x: &[Vec<f64>], y: &[Vec<f64>], output: usize) -> f64 {
        x.iter()
            .zip(y)
            .map(|(xi, yi)| (model.predict(xi)[output] - yi[output]).abs())
            .sum::<f64>()
            / x.len() as f64
    }

    #[test]
    fn single_round_starts_from_mean() {
        let (x, y) = data();
        let config = ModelConfig {
            n_estimators: 1,
            learning_rate: 1e-9,
            ..ModelConfig::default()
        };
        let gbm = GradientBoosting::fit(&x, &y, &config, &mut SimpleRng::new(0));
        let pred = gbm.predict(&[1.0]);
        let mean_w: f64 = y.iter().map(|r| r[0]).sum::<f64>() / y.len() as f64;
        assert!((pred[0] - mean_w).abs() < 1e-3);
        assert_eq!(gbm.n_estimators(), 1);
    }

    #[test]
    fn more_rounds_reduce_training_error() {
        let (x, y) = data();
        let short = ModelConfig {
            n_estimators: 5,
            ..ModelConfig::default()
        };
        let long = ModelConfig {
            n_estimators: 200,
            ..ModelConfig::default()
        };
        let a = GradientBoosting::fit(&x, &y, &short, &mut SimpleRng::new(5));
        let b = GradientBoosting::fit(&x, &y, &long, &mut SimpleRng::new(5));

        for output in 0..2 {
            assert!(mean_abs_error(&b, &x, &y, output) < mean_abs_error(&a, &x, &y, output));
        }
        assert!(mean_abs_error(&b, &x, &y, 0) < 1.0);
    }

    #[test]
    fn subsampling_still_fits() {
        let (x, y) = data();
        let config = ModelConfig {
            n_estimators: 150,
            subsample: 0.5,
            ..ModelConfig::default()
        };
        let gbm = GradientBoosting::fit(&x, &y, &config, &mut SimpleRng::new(8));
        assert!(mean_abs_error(&gbm, &x, &y, 0) < 2.0);
        assert_eq!(gbm.n_features(), 1);
        assert!((gbm.learning_rate() - 0.1).abs() < 1e-12);
    }
}
