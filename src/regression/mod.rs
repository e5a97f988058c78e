/// Ensemble regression from growth parameters to PL peak targets.
///
/// ```text
///   TrainingTable ──► trainer ──► Model { features, targets, ensemble, validation }
///                                   │
///        recipes ──► predictor ◄────┘
/// ```
pub mod boosting;
pub mod forest;
pub mod metrics;
pub mod predictor;
pub mod rng;
pub mod trainer;
pub mod tree;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, ModelKind};
use crate::data::writer::write_json;
use crate::error::{PipelineError, Result};
use boosting::GradientBoosting;
use forest::RandomForest;
use metrics::ValidationReport;
use rng::SimpleRng;

/// The fitted ensemble, tagged by kind in its JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Ensemble {
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
}

impl Ensemble {
    pub fn fit(x: &[Vec<f64>], y: &[Vec<f64>], config: &ModelConfig, rng: &mut SimpleRng) -> Self {
        match config.kind {
            ModelKind::RandomForest => Ensemble::RandomForest(RandomForest::fit(x, y, config, rng)),
            ModelKind::GradientBoosting => {
                Ensemble::GradientBoosting(GradientBoosting::fit(x, y, config, rng))
            }
        }
    }

    pub fn predict(&self, features: &[f64]) -> Vec<f64> {
        match self {
            Ensemble::RandomForest(m) => m.predict(features),
            Ensemble::GradientBoosting(m) => m.predict(features),
        }
    }

    /// One-line size summary for the training log.
    pub fn summary(&self) -> String {
        match self {
            Ensemble::RandomForest(m) => format!(
                "random_forest: {} trees over {} features, {} nodes, mean depth {:.1}",
                m.n_trees(),
                m.n_features(),
                m.total_nodes(),
                m.avg_depth()
            ),
            Ensemble::GradientBoosting(m) => format!(
                "gradient_boosting: {} rounds per target over {} features, learning rate {}",
                m.n_estimators(),
                m.n_features(),
                m.learning_rate()
            ),
        }
    }

    fn check_shape(&self, n_features: usize, n_outputs: usize) -> std::result::Result<(), String> {
        match self {
            Ensemble::RandomForest(m) => m.check_shape(n_features, n_outputs),
            Ensemble::GradientBoosting(m) => m.check_shape(n_features, n_outputs),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Ensemble::RandomForest(_) => "random_forest",
            Ensemble::GradientBoosting(_) => "gradient_boosting",
        }
    }
}

/// A trained model: the ensemble plus the schema it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Feature names, in the order the ensemble expects them.
    pub features: Vec<String>,
    /// Target names, in the order predictions are returned.
    pub targets: Vec<String>,
    pub ensemble: Ensemble,
    pub validation: ValidationReport,
}

impl Model {
    /// Predict all targets for a feature vector already in `features` order.
    pub fn predict_vector(&self, features: &[f64]) -> Vec<f64> {
        self.ensemble.predict(features)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self)
    }

    /// Load a saved model, rejecting files whose ensemble does not match
    /// the recorded feature and target lists.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
        let model: Model = serde_json::from_reader(std::io::BufReader::new(file))?;
        model
            .ensemble
            .check_shape(model.features.len(), model.targets.len())
            .map_err(|message| PipelineError::parse(path, 0, format!("inconsistent model: {message}")))?;
        Ok(model)
    }
}
