//! # pl-growth
//!
//! Command-line front end for the PL peak / growth-recipe pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Extract peaks from ./PL_Spectra_Raw into extracted_pl_peaks.csv
//! pl-growth -v extract
//!
//! # Train and validate, then predict the configured recipes
//! pl-growth -v --config pl-growth.toml train
//!
//! # Reuse a saved model on a recipe table
//! pl-growth predict --model pl_model.json --recipes recipes.csv
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbosity());
    cli.run()
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}
