use anyhow::{Context, Result};
use log::info;

use pl_growth::regression::predictor::{log_predictions, write_predictions};
use pl_growth::{predict, rank_by_ideal, Config, Model, Recipe};

use super::collect_recipes;

/// Load a saved model and predict every configured recipe.
pub fn run(config: &Config) -> Result<()> {
    let path = &config.paths.model;
    if !path.exists() {
        anyhow::bail!("Model file does not exist: {}", path.display());
    }
    let model = Model::load(path).with_context(|| format!("Failed to load model {}", path.display()))?;
    info!(
        "Loaded {} model: {:?} -> {:?}",
        model.ensemble.kind_name(),
        model.features,
        model.targets
    );

    let recipes = collect_recipes(config)?;
    if recipes.is_empty() {
        anyhow::bail!("No recipes to predict; add [[prediction.recipes]] or pass --recipes");
    }
    predict_and_write(config, &model, &recipes)
}

pub(super) fn predict_and_write(config: &Config, model: &Model, recipes: &[Recipe]) -> Result<()> {
    let mut predictions = predict(model, recipes).context("Prediction failed")?;
    if !config.prediction.ideal.is_empty() {
        rank_by_ideal(model, &mut predictions, &config.prediction.ideal);
    }
    log_predictions(model, &predictions);

    let out = &config.paths.predictions;
    write_predictions(out, model, &predictions)
        .with_context(|| format!("Failed to write predictions {}", out.display()))
}
