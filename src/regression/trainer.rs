use log::{debug, info, warn};

use super::metrics::{evaluate, ValidationReport};
use super::rng::SimpleRng;
use super::{Ensemble, Model};
use crate::config::TrainingConfig;
use crate::data::model::TrainingTable;
use crate::error::{PipelineError, Result};

/// Numeric design matrix extracted from a [`TrainingTable`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub sample_ids: Vec<String>,
    pub features: Vec<String>,
    pub targets: Vec<String>,
    /// One row per sample, values in `features` order.
    pub x: Vec<Vec<f64>>,
    /// One row per sample, values in `targets` order.
    pub y: Vec<Vec<f64>>,
    /// Samples left out because a feature or target was null or non-numeric.
    pub dropped: Vec<String>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    fn subset(&self, rows: &[usize]) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        (
            rows.iter().map(|&r| self.x[r].clone()).collect(),
            rows.iter().map(|&r| self.y[r].clone()).collect(),
        )
    }
}

/// Pull the configured feature and target columns out of `table`.
///
/// Columns the table does not carry at all are a schema mismatch; rows with a
/// null or non-numeric cell in a used column are dropped and logged.
pub fn build_dataset(table: &TrainingTable, features: &[String], targets: &[String]) -> Result<Dataset> {
    if let Some(both) = features.iter().find(|f| targets.contains(f)) {
        return Err(PipelineError::InvalidConfig(format!(
            "'{both}' is configured as both a feature and a target"
        )));
    }

    let missing: Vec<String> = features
        .iter()
        .chain(targets)
        .filter(|c| !table.has_column(c))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::SchemaMismatch { missing });
    }

    let mut dataset = Dataset {
        features: features.to_vec(),
        targets: targets.to_vec(),
        ..Dataset::default()
    };

    for row in &table.rows {
        let x: Option<Vec<f64>> = features.iter().map(|f| row.value(f)).collect();
        let y: Option<Vec<f64>> = targets.iter().map(|t| row.value(t)).collect();
        match (x, y) {
            (Some(x), Some(y)) => {
                dataset.sample_ids.push(row.sample_id().to_string());
                dataset.x.push(x);
                dataset.y.push(y);
            }
            _ => dataset.dropped.push(row.sample_id().to_string()),
        }
    }

    if !dataset.dropped.is_empty() {
        warn!(
            "{} row(s) dropped for null or non-numeric feature/target values: {}",
            dataset.dropped.len(),
            dataset.dropped.join(", ")
        );
    }
    Ok(dataset)
}

/// Split `0..n` into (train, test) rows after a seeded shuffle.
///
/// A positive `test_fraction` always holds out at least one row and keeps at
/// least one for training; `n` must then be at least 2.
pub fn split_rows(n: usize, test_fraction: f64, rng: &mut SimpleRng) -> (Vec<usize>, Vec<usize>) {
    let mut rows: Vec<usize> = (0..n).collect();
    if test_fraction <= 0.0 || n < 2 {
        return (rows, Vec::new());
    }
    rng.shuffle(&mut rows);
    let n_test = ((n as f64 * test_fraction).round() as usize).clamp(1, n - 1);
    let test = rows.split_off(n - n_test);
    (rows, test)
}

/// Fit the configured ensemble on `table` and validate it on a hold-out split.
pub fn train(table: &TrainingTable, config: &TrainingConfig) -> Result<Model> {
    let dataset = build_dataset(table, &config.features, &config.targets)?;
    train_dataset(&dataset, config)
}

/// Fit and validate on an already extracted [`Dataset`].
pub fn train_dataset(dataset: &Dataset, config: &TrainingConfig) -> Result<Model> {
    let holdout = config.test_fraction > 0.0;
    let min_rows = if holdout {
        config.min_rows.max(2)
    } else {
        config.min_rows.max(1)
    };
    if dataset.len() < min_rows {
        return Err(PipelineError::InsufficientData {
            rows: dataset.len(),
            min_rows,
        });
    }

    let mut rng = SimpleRng::new(config.seed);
    let (train_rows, test_rows) = split_rows(dataset.len(), config.test_fraction, &mut rng);

    let (x_train, y_train) = dataset.subset(&train_rows);
    let mut ensemble = Ensemble::fit(&x_train, &y_train, &config.model, &mut rng);

    let (x_eval, y_eval) = if test_rows.is_empty() {
        (x_train, y_train)
    } else {
        dataset.subset(&test_rows)
    };
    let predicted: Vec<Vec<f64>> = x_eval.iter().map(|x| ensemble.predict(x)).collect();
    let metrics = evaluate(&dataset.targets, &y_eval, &predicted);

    let mut validation = ValidationReport {
        model_kind: ensemble.kind_name().to_string(),
        n_train: train_rows.len(),
        n_test: test_rows.len(),
        test_ids: test_rows
            .iter()
            .map(|&r| dataset.sample_ids[r].clone())
            .collect(),
        targets: metrics,
        fitted: Vec::new(),
    };

    for m in &validation.targets {
        info!(
            "{} on {} {} rows: MAE {:.4}, RMSE {:.4}, max |err| {:.4}, R² {}",
            m.target,
            if validation.is_in_sample() { validation.n_train } else { validation.n_test },
            if validation.is_in_sample() { "training" } else { "hold-out" },
            m.mae,
            m.rmse,
            m.max_abs_error,
            m.r2.map_or_else(|| "n/a".to_string(), |r| format!("{r:.3}"))
        );
    }

    if config.refit_on_full && !test_rows.is_empty() {
        info!("Refitting {} on all {} rows", ensemble.kind_name(), dataset.len());
        ensemble = Ensemble::fit(&dataset.x, &dataset.y, &config.model, &mut rng);
    }

    let fitted: Vec<Vec<f64>> = dataset.x.iter().map(|x| ensemble.predict(x)).collect();
    validation.fitted = evaluate(&dataset.targets, &dataset.y, &fitted);
    for m in &validation.fitted {
        debug!(
            "{} in-sample over {} rows: MAE {:.4}, max |err| {:.4}",
            m.target,
            dataset.len(),
            m.mae,
            m.max_abs_error
        );
    }
    info!("{}", ensemble.summary());

    Ok(Model {
        features: dataset.features.clone(),
        targets: dataset.targets.clone(),
        ensemble,
        validation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, ModelKind};
    use crate::data::model::{
        MetadataValue, PeakRecord, SampleMetadata, TrainingRow, PEAK_INTENSITY_COLUMN,
        PEAK_WAVELENGTH_COLUMN,
    };

    fn row(id: &str, in_fraction: MetadataValue, width: f64, w: f64, i: f64) -> TrainingRow {
        TrainingRow {
            peak: PeakRecord {
                sample_id: id.into(),
                wavelength_nm: w,
                intensity_au: i,
            },
            metadata: SampleMetadata::new(id)
                .with("in_fraction", in_fraction)
                .with("well_width", MetadataValue::Float(width)),
        }
    }

    fn table(n: usize) -> TrainingTable {
        TrainingTable {
            metadata_columns: vec!["in_fraction".into(), "well_width".into()],
            rows: (0..n)
                .map(|k| {
                    let f = 0.25 + 0.005 * k as f64;
                    let width = 5.0 + (k % 4) as f64;
                    row(
                        &format!("S{k:02}"),
                        MetadataValue::Float(f),
                        width,
                        900.0 + 200.0 * f + 2.0 * width,
                        1.5 - 0.1 * width,
                    )
                })
                .collect(),
        }
    }

    fn config() -> TrainingConfig {
        TrainingConfig {
            features: vec!["in_fraction".into(), "well_width".into()],
            targets: vec![PEAK_WAVELENGTH_COLUMN.into(), PEAK_INTENSITY_COLUMN.into()],
            min_rows: 5,
            model: ModelConfig {
                n_estimators: 20,
                ..ModelConfig::default()
            },
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn too_few_rows_is_insufficient_data() {
        let err = train(&table(4), &config()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientData { rows: 4, min_rows: 5 }
        ));
    }

    #[test]
    fn unknown_feature_is_schema_mismatch() {
        let mut cfg = config();
        cfg.features.push("growth_temp".into());
        match train(&table(10), &cfg) {
            Err(PipelineError::SchemaMismatch { missing }) => assert_eq!(missing, vec!["growth_temp"]),
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn feature_and_target_overlap_is_rejected() {
        let mut cfg = config();
        cfg.features.push(PEAK_WAVELENGTH_COLUMN.into());
        assert!(matches!(
            train(&table(10), &cfg),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rows_with_missing_values_are_dropped() {
        let mut t = table(8);
        t.rows[3].metadata.values.insert("in_fraction".into(), MetadataValue::Null);
        t.rows[5]
            .metadata
            .values
            .insert("in_fraction".into(), MetadataValue::String("n/a".into()));

        let ds = build_dataset(&t, &config().features, &config().targets).unwrap();
        assert_eq!(ds.len(), 6);
        assert_eq!(ds.dropped, vec!["S03", "S05"]);
    }

    #[test]
    fn dropped_rows_count_against_minimum() {
        let mut t = table(5);
        t.rows[0].metadata.values.insert("in_fraction".into(), MetadataValue::Null);
        assert!(matches!(
            train(&t, &config()),
            Err(PipelineError::InsufficientData { rows: 4, .. })
        ));
    }

    #[test]
    fn split_holds_out_requested_share() {
        let mut rng = SimpleRng::new(1);
        let (train, test) = split_rows(10, 0.2, &mut rng);
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let (train, test) = split_rows(2, 0.01, &mut rng);
        assert_eq!((train.len(), test.len()), (1, 1));

        let (train, test) = split_rows(5, 0.0, &mut rng);
        assert_eq!((train.len(), test.len()), (5, 0));
    }

    #[test]
    fn trains_and_reports_holdout_metrics() {
        let model = train(&table(30), &config()).unwrap();
        assert_eq!(model.features, vec!["in_fraction", "well_width"]);
        assert_eq!(model.validation.n_train, 24);
        assert_eq!(model.validation.n_test, 6);
        assert_eq!(model.validation.test_ids.len(), 6);
        assert_eq!(model.validation.model_kind, "random_forest");

        let w = model.validation.for_target(PEAK_WAVELENGTH_COLUMN).unwrap();
        assert!(w.mae < 10.0, "wavelength MAE too large: {}", w.mae);
    }

    #[test]
    fn gradient_boosting_is_selectable() {
        let mut cfg = config();
        cfg.model.kind = ModelKind::GradientBoosting;
        cfg.model.n_estimators = 100;
        let model = train(&table(30), &cfg).unwrap();
        assert_eq!(model.ensemble.kind_name(), "gradient_boosting");
        assert_eq!(model.predict_vector(&[0.3, 6.0]).len(), 2);
    }

    #[test]
    fn same_seed_same_model() {
        let a = train(&table(20), &config()).unwrap();
        let b = train(&table(20), &config()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_test_fraction_reports_in_sample_metrics() {
        let mut cfg = config();
        cfg.test_fraction = 0.0;
        let model = train(&table(10), &cfg).unwrap();
        assert!(model.validation.is_in_sample());
        assert_eq!(model.validation.n_train, 10);
    }
}
