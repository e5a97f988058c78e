use anyhow::{Context, Result};
use log::{info, warn};

use pl_growth::data::loader::{load_metadata, load_peak_table};
use pl_growth::data::writer::{write_json, write_training_table};
use pl_growth::{join, train, Config};

use super::{collect_recipes, predict};

/// Join peaks with metadata, fit the model, save it with its metrics and
/// predict the configured recipes.
pub fn run(config: &Config) -> Result<()> {
    let paths = &config.paths;

    let peaks = load_peak_table(&paths.peak_table)
        .with_context(|| format!("Failed to load peak table {}", paths.peak_table.display()))?;
    let metadata = load_metadata(&paths.metadata, &config.metadata.id_column)
        .with_context(|| format!("Failed to load metadata {}", paths.metadata.display()))?;

    let (table, report) = join(&peaks, &metadata);
    if !report.is_empty() {
        warn!("{} sample ID(s) did not match between peaks and metadata", report.mismatch_count());
    }
    if let Some(path) = &paths.training_table {
        write_training_table(path, &table)
            .with_context(|| format!("Failed to write training table {}", path.display()))?;
    }

    info!(
        "Training {:?} on {} rows: {:?} -> {:?}",
        config.training.model.kind,
        table.len(),
        config.training.features,
        config.training.targets
    );
    let model = train(&table, &config.training).context("Training failed")?;

    model
        .save(&paths.model)
        .with_context(|| format!("Failed to save model {}", paths.model.display()))?;
    write_json(&paths.metrics, &model.validation)
        .with_context(|| format!("Failed to write metrics {}", paths.metrics.display()))?;
    info!("Model saved to {}", paths.model.display());
    info!("Validation metrics saved to {}", paths.metrics.display());

    let recipes = collect_recipes(config)?;
    if recipes.is_empty() {
        info!("No recipes configured; skipping prediction");
        return Ok(());
    }
    predict::predict_and_write(config, &model, &recipes)
}
