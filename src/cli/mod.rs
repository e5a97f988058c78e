use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use pl_growth::data::loader::load_recipes;
use pl_growth::{Config, Recipe};

mod extract;
mod predict;
mod train;

/// pl-growth - PL peak extraction and growth-recipe regression
#[derive(Parser)]
#[command(name = "pl-growth")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one PL peak per spectrum into the peak table
    Extract {
        /// Directory of raw spectrum files (overrides paths.spectra_dir)
        #[arg(long, value_name = "DIR")]
        spectra_dir: Option<PathBuf>,

        /// Peak table to write, .csv or .parquet (overrides paths.peak_table)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Join peaks with growth parameters, train and validate the model
    Train {
        /// Peak table written by `extract` (overrides paths.peak_table)
        #[arg(long, value_name = "FILE")]
        peaks: Option<PathBuf>,

        /// Growth-parameter table (overrides paths.metadata)
        #[arg(long, value_name = "FILE")]
        metadata: Option<PathBuf>,
    },

    /// Run `extract` followed by `train`
    Run,

    /// Predict PL peaks for growth recipes with a saved model
    Predict {
        /// Model JSON written by `train` (overrides paths.model)
        #[arg(short, long, value_name = "FILE")]
        model: Option<PathBuf>,

        /// CSV of recipes, used instead of the configured recipes
        #[arg(short, long, value_name = "FILE")]
        recipes: Option<PathBuf>,

        /// Predictions CSV to write (overrides paths.predictions)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    pub fn run(self) -> Result<()> {
        let mut config = load_config(self.config.as_deref())?;

        match self.command {
            Commands::Extract {
                spectra_dir,
                output,
            } => {
                if let Some(dir) = spectra_dir {
                    config.paths.spectra_dir = dir;
                }
                if let Some(output) = output {
                    config.paths.peak_table = output;
                }
                extract::run(&config)
            }
            Commands::Train { peaks, metadata } => {
                if let Some(peaks) = peaks {
                    config.paths.peak_table = peaks;
                }
                if let Some(metadata) = metadata {
                    config.paths.metadata = metadata;
                }
                train::run(&config)
            }
            Commands::Run => {
                extract::run(&config)?;
                train::run(&config)
            }
            Commands::Predict {
                model,
                recipes,
                output,
            } => {
                if let Some(model) = model {
                    config.paths.model = model;
                }
                if let Some(output) = output {
                    config.paths.predictions = output;
                }
                if let Some(recipes) = recipes {
                    config.prediction.recipes.clear();
                    config.prediction.recipes_file = Some(recipes);
                }
                predict::run(&config)
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            Config::from_file(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}

/// Recipes from the configuration followed by those in `prediction.recipes_file`.
pub(crate) fn collect_recipes(config: &Config) -> Result<Vec<Recipe>> {
    let mut recipes = config.prediction.recipes.clone();
    if let Some(path) = &config.prediction.recipes_file {
        let from_file = load_recipes(path)
            .with_context(|| format!("Failed to load recipes from {}", path.display()))?;
        info!("Loaded {} recipe(s) from {}", from_file.len(), path.display());
        recipes.extend(from_file);
    }
    Ok(recipes)
}
