use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use log::{info, warn};
use serde::Serialize;

use super::Model;
use crate::config::Recipe;
use crate::data::writer::ensure_parent;
use crate::error::{PipelineError, Result};

/// Model output for one recipe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub name: String,
    /// Feature values in model order.
    pub inputs: Vec<f64>,
    /// Target values in model order.
    pub outputs: Vec<f64>,
    /// Distance to the ideal targets, when ranking was requested.
    pub distance: Option<f64>,
    /// 1 = closest to the ideal.
    pub rank: Option<usize>,
}

impl Prediction {
    /// Predicted value for a named target.
    pub fn output(&self, model: &Model, target: &str) -> Option<f64> {
        model
            .targets
            .iter()
            .position(|t| t == target)
            .map(|i| self.outputs[i])
    }
}

/// Predict every recipe in `recipes`.
///
/// All recipes are checked before anything is predicted: if any recipe lacks
/// a model feature, or carries a non-finite value for one, the whole batch
/// fails with [`PipelineError::SchemaMismatch`]. Unused parameters are
/// ignored.
pub fn predict(model: &Model, recipes: &[Recipe]) -> Result<Vec<Prediction>> {
    let mut missing: Vec<String> = Vec::new();
    for recipe in recipes {
        for feature in &model.features {
            let usable = recipe.params.get(feature).is_some_and(|v| v.is_finite());
            if !usable && !missing.contains(feature) {
                missing.push(feature.clone());
            }
        }
    }
    if !missing.is_empty() {
        return Err(PipelineError::SchemaMismatch { missing });
    }

    let predictions: Vec<Prediction> = recipes
        .iter()
        .enumerate()
        .map(|(k, recipe)| {
            let inputs: Vec<f64> = model.features.iter().map(|f| recipe.params[f]).collect();
            let outputs = model.predict_vector(&inputs);
            Prediction {
                name: recipe
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("recipe_{}", k + 1)),
                inputs,
                outputs,
                distance: None,
                rank: None,
            }
        })
        .collect();

    info!("Predicted {} recipe(s)", predictions.len());
    Ok(predictions)
}

/// Score each prediction against `ideal` and assign ranks (1 = closest).
///
/// The distance is the root of the summed squared relative deviations over
/// the ideal targets the model knows; a zero ideal falls back to the absolute
/// deviation. Ideal keys that are not model targets are ignored with a
/// warning. Ties keep input order.
pub fn rank_by_ideal(model: &Model, predictions: &mut [Prediction], ideal: &BTreeMap<String, f64>) {
    let mut used: Vec<(usize, f64)> = Vec::new();
    for (name, &value) in ideal {
        match model.targets.iter().position(|t| t == name) {
            Some(i) => used.push((i, value)),
            None => warn!("Ideal value for '{name}' ignored: not a model target"),
        }
    }
    if used.is_empty() {
        return;
    }

    for p in predictions.iter_mut() {
        let sum: f64 = used
            .iter()
            .map(|&(i, ideal)| {
                let dev = p.outputs[i] - ideal;
                if ideal == 0.0 {
                    dev * dev
                } else {
                    (dev / ideal).powi(2)
                }
            })
            .sum();
        p.distance = Some(sum.sqrt());
    }

    let mut order: Vec<usize> = (0..predictions.len()).collect();
    order.sort_by(|&a, &b| {
        let da = predictions[a].distance.unwrap_or(f64::INFINITY);
        let db = predictions[b].distance.unwrap_or(f64::INFINITY);
        da.total_cmp(&db)
    });
    for (rank, &idx) in order.iter().enumerate() {
        predictions[idx].rank = Some(rank + 1);
    }
}

/// Log one line per prediction, best-ranked first when ranks are present.
pub fn log_predictions(model: &Model, predictions: &[Prediction]) {
    let mut sorted: Vec<&Prediction> = predictions.iter().collect();
    sorted.sort_by_key(|p| p.rank.unwrap_or(usize::MAX));
    for p in sorted {
        let outputs: Vec<String> = model
            .targets
            .iter()
            .zip(&p.outputs)
            .map(|(t, v)| format!("{t}={v:.3}"))
            .collect();
        match (p.rank, p.distance) {
            (Some(rank), Some(d)) => info!("#{rank} {}: {} (distance {d:.4})", p.name, outputs.join(", ")),
            _ => info!("{}: {}", p.name, outputs.join(", ")),
        }
    }
}

/// Write predictions as CSV: name, features, targets, then distance and rank
/// when any prediction was ranked.
pub fn write_predictions(path: &Path, model: &Model, predictions: &[Prediction]) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = csv::Writer::from_writer(file);
    let ranked = predictions.iter().any(|p| p.rank.is_some());

    let mut header = vec!["name".to_string()];
    header.extend(model.features.iter().cloned());
    header.extend(model.targets.iter().map(|t| format!("predicted_{t}")));
    if ranked {
        header.push("distance".into());
        header.push("rank".into());
    }
    writer.write_record(&header)?;

    for p in predictions {
        let mut record = vec![p.name.clone()];
        record.extend(p.inputs.iter().map(f64::to_string));
        record.extend(p.outputs.iter().map(f64::to_string));
        if ranked {
            record.push(p.distance.map(|d| d.to_string()).unwrap_or_default());
            record.push(p.rank.map(|r| r.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;

    info!("Wrote {} prediction(s) to {}", predictions.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingConfig;
    use crate::data::model::{
        MetadataValue, PeakRecord, SampleMetadata, TrainingRow, TrainingTable,
        PEAK_INTENSITY_COLUMN, PEAK_WAVELENGTH_COLUMN,
    };
    use crate::regression::trainer::train;

    fn model() -> Model {
        let rows = (0..12)
            .map(|k| {
                let f = 0.25 + 0.01 * k as f64;
                let id = format!("G{k:02}");
                TrainingRow {
                    peak: PeakRecord {
                        sample_id: id.clone(),
                        wavelength_nm: 900.0 + 200.0 * f,
                        intensity_au: 1.0 - f,
                    },
                    metadata: SampleMetadata::new(&id)
                        .with("in_fraction", MetadataValue::Float(f))
                        .with("well_width", MetadataValue::Integer(6)),
                }
            })
            .collect();
        let table = TrainingTable {
            metadata_columns: vec!["in_fraction".into(), "well_width".into()],
            rows,
        };
        let config = TrainingConfig {
            features: vec!["in_fraction".into(), "well_width".into()],
            ..TrainingConfig::default()
        };
        train(&table, &config).unwrap()
    }

    #[test]
    fn missing_feature_fails_whole_batch() {
        let model = model();
        let recipes = vec![
            Recipe::new("ok").with("in_fraction", 0.3).with("well_width", 6.0),
            Recipe::new("bad").with("in_fraction", 0.3),
        ];
        match predict(&model, &recipes) {
            Err(PipelineError::SchemaMismatch { missing }) => assert_eq!(missing, vec!["well_width"]),
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_feature_is_rejected() {
        let model = model();
        let recipes = vec![Recipe::new("nan")
            .with("in_fraction", f64::NAN)
            .with("well_width", 6.0)];
        assert!(matches!(
            predict(&model, &recipes),
            Err(PipelineError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn extra_parameters_are_ignored_and_names_defaulted() {
        let model = model();
        let mut unnamed = Recipe::default()
            .with("well_width", 6.0)
            .with("in_fraction", 0.28)
            .with("v_iii_ratio", 40.0);
        unnamed.name = None;
        let preds = predict(&model, &[unnamed]).unwrap();
        assert_eq!(preds[0].name, "recipe_1");
        assert_eq!(preds[0].inputs, vec![0.28, 6.0]);
        assert_eq!(preds[0].outputs.len(), 2);
        assert!(preds[0].output(&model, PEAK_WAVELENGTH_COLUMN).is_some());
    }

    #[test]
    fn ranking_prefers_closest_prediction() {
        let model = model();
        let recipes = vec![
            Recipe::new("low").with("in_fraction", 0.25).with("well_width", 6.0),
            Recipe::new("high").with("in_fraction", 0.36).with("well_width", 6.0),
        ];
        let mut preds = predict(&model, &recipes).unwrap();

        let mut ideal = BTreeMap::new();
        ideal.insert(PEAK_WAVELENGTH_COLUMN.to_string(), 972.0);
        ideal.insert("unknown_target".to_string(), 1.0);
        rank_by_ideal(&model, &mut preds, &ideal);

        assert_eq!(preds[1].rank, Some(1));
        assert_eq!(preds[0].rank, Some(2));
        assert!(preds[1].distance.unwrap() < preds[0].distance.unwrap());
    }

    #[test]
    fn zero_ideal_uses_absolute_deviation() {
        let model = model();
        let mut preds = vec![Prediction {
            name: "p".into(),
            inputs: vec![0.3, 6.0],
            outputs: vec![960.0, 0.5],
            distance: None,
            rank: None,
        }];
        let mut ideal = BTreeMap::new();
        ideal.insert(PEAK_INTENSITY_COLUMN.to_string(), 0.0);
        rank_by_ideal(&model, &mut preds, &ideal);
        assert!((preds[0].distance.unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(preds[0].rank, Some(1));
    }

    #[test]
    fn writes_ranked_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/predicted.csv");
        let model = model();
        let mut preds = predict(
            &model,
            &[Recipe::new("a").with("in_fraction", 0.3).with("well_width", 6.0)],
        )
        .unwrap();
        let mut ideal = BTreeMap::new();
        ideal.insert(PEAK_WAVELENGTH_COLUMN.to_string(), 960.0);
        rank_by_ideal(&model, &mut preds, &ideal);
        write_predictions(&path, &model, &preds).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(
            header,
            "name,in_fraction,well_width,predicted_PL_Peak_Wavelength_nm,predicted_PL_Peak_Intensity_au,distance,rank"
        );
        assert!(text.lines().nth(1).unwrap().starts_with("a,0.3,6,"));
        assert!(text.lines().nth(1).unwrap().ends_with(",1"));
    }
}
