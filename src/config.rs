//! TOML configuration for the pipeline.
//!
//! Every field has a default, so an empty file (or no file at all) runs the
//! pipeline against the well-known paths below:
//!
//! ```toml
//! # pl-growth.toml
//! [paths]
//! spectra_dir = "PL_Spectra_Raw"
//! peak_table = "extracted_pl_peaks.csv"
//! metadata = "growth_parameters.csv"
//!
//! [training]
//! features = ["in_fraction", "well_width", "growth_temp"]
//! min_rows = 5
//!
//! [training.model]
//! kind = "random_forest"
//! n_estimators = 200
//!
//! [prediction.ideal]
//! PL_Peak_Wavelength_nm = 950.0
//!
//! [[prediction.recipes]]
//! name = "hot-narrow"
//! in_fraction = 0.32
//! well_width = 6.5
//! growth_temp = 680.0
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::model::{PEAK_INTENSITY_COLUMN, PEAK_WAVELENGTH_COLUMN, SAMPLE_ID_COLUMN};
use crate::error::{PipelineError, Result};

/// Root configuration structure for `pl-growth.toml` files.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub spectra: SpectraConfig,
    pub peaks: PeakConfig,
    pub metadata: MetadataConfig,
    pub training: TrainingConfig,
    pub prediction: PredictionConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no stage can work with.
    pub fn validate(&self) -> Result<()> {
        if self.peaks.smoothing_window == 0 || self.peaks.smoothing_window % 2 == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "peaks.smoothing_window must be odd and >= 1, got {}",
                self.peaks.smoothing_window
            )));
        }
        if self.training.features.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "training.features must name at least one column".into(),
            ));
        }
        if self.training.targets.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "training.targets must name at least one column".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.training.test_fraction) {
            return Err(PipelineError::InvalidConfig(format!(
                "training.test_fraction must be in [0, 1), got {}",
                self.training.test_fraction
            )));
        }
        self.training.model.validate()
    }
}

// ---------------------------------------------------------------------------
// [paths]
// ---------------------------------------------------------------------------

/// Fixed input and output locations for each step.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Folder holding one raw PL spectrum file per sample.
    pub spectra_dir: PathBuf,
    /// Extracted peak table (`.csv` or `.parquet`).
    pub peak_table: PathBuf,
    /// Growth-parameter table keyed by sample ID.
    pub metadata: PathBuf,
    /// Joined training rows, written for inspection.
    pub training_table: Option<PathBuf>,
    pub model: PathBuf,
    pub metrics: PathBuf,
    pub predictions: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            spectra_dir: PathBuf::from("PL_Spectra_Raw"),
            peak_table: PathBuf::from("extracted_pl_peaks.csv"),
            metadata: PathBuf::from("growth_parameters.csv"),
            training_table: Some(PathBuf::from("training_rows.csv")),
            model: PathBuf::from("pl_model.json"),
            metrics: PathBuf::from("validation_metrics.json"),
            predictions: PathBuf::from("predicted_recipes.csv"),
        }
    }
}

// ---------------------------------------------------------------------------
// [spectra]
// ---------------------------------------------------------------------------

/// How raw spectrum files are recognised and parsed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpectraConfig {
    /// File extensions (without dot, case-insensitive) treated as spectra.
    pub extensions: Vec<String>,
    pub wavelength_column: String,
    pub intensity_column: String,
    pub delimiter: char,
    /// Log and skip files that fail to parse or hold no usable samples.
    pub skip_invalid: bool,
}

impl Default for SpectraConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["csv".to_string()],
            wavelength_column: "lambda [nm]".to_string(),
            intensity_column: "intensity [a.u.]".to_string(),
            delimiter: '\t',
            skip_invalid: false,
        }
    }
}

// ---------------------------------------------------------------------------
// [peaks]
// ---------------------------------------------------------------------------

/// Baseline removed from a spectrum before the peak search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    #[default]
    None,
    /// Subtract the minimum intensity.
    Min,
    /// Subtract the line through the first and last samples.
    Linear,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PeakConfig {
    /// Centred moving-average width; 1 disables smoothing.
    pub smoothing_window: usize,
    pub baseline: Baseline,
}

impl Default for PeakConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 1,
            baseline: Baseline::None,
        }
    }
}

// ---------------------------------------------------------------------------
// [metadata]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Column holding the sample ID in the growth-parameter table.
    pub id_column: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            id_column: SAMPLE_ID_COLUMN.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// [training]
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Growth-parameter columns fed to the model, in order.
    pub features: Vec<String>,
    /// Columns the model predicts.
    pub targets: Vec<String>,
    pub min_rows: usize,
    /// Share of rows held out for validation.
    pub test_fraction: f64,
    pub seed: u64,
    /// Refit on every row once validation metrics are computed.
    pub refit_on_full: bool,
    pub model: ModelConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            features: vec![
                "in_fraction".to_string(),
                "well_width".to_string(),
                "growth_temp".to_string(),
            ],
            targets: vec![
                PEAK_WAVELENGTH_COLUMN.to_string(),
                PEAK_INTENSITY_COLUMN.to_string(),
            ],
            min_rows: 5,
            test_fraction: 0.2,
            seed: 42,
            refit_on_full: true,
            model: ModelConfig::default(),
        }
    }
}

/// Which ensemble to fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    RandomForest,
    GradientBoosting,
}

/// Ensemble hyperparameters. Fields that do not apply to the selected
/// [`ModelKind`] are ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub n_estimators: usize,
    /// Maximum tree depth; `None` grows until leaves are pure or too small.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of features tried at each split (random forest).
    pub max_features: f64,
    /// Draw a bootstrap sample per tree (random forest).
    pub bootstrap: bool,
    /// Shrinkage per boosting round (gradient boosting).
    pub learning_rate: f64,
    /// Row fraction sampled per boosting round (gradient boosting).
    pub subsample: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::RandomForest,
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 1.0,
            bootstrap: true,
            learning_rate: 0.1,
            subsample: 1.0,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PipelineError::InvalidConfig(
                "training.model.n_estimators must be at least 1".into(),
            ));
        }
        if self.min_samples_leaf == 0 || self.min_samples_split < 2 {
            return Err(PipelineError::InvalidConfig(
                "training.model needs min_samples_leaf >= 1 and min_samples_split >= 2".into(),
            ));
        }
        if !(self.max_features > 0.0 && self.max_features <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "training.model.max_features must be in (0, 1], got {}",
                self.max_features
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "training.model.subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        if self.learning_rate <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "training.model.learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// [prediction]
// ---------------------------------------------------------------------------

/// A hypothetical growth recipe: an optional label plus named parameters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Recipe {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub params: BTreeMap<String, f64>,
}

impl Recipe {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, param: &str, value: f64) -> Self {
        self.params.insert(param.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Desired target values; predictions are ranked by closeness.
    pub ideal: BTreeMap<String, f64>,
    pub recipes: Vec<Recipe>,
    /// Optional CSV of extra recipes (one column per parameter, optional `name`).
    pub recipes_file: Option<PathBuf>,
}
