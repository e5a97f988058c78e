use anyhow::{Context, Result};
use arrow::util::pretty::pretty_format_batches;
use log::{debug, info};

use pl_growth::data::loader::load_spectra_dir;
use pl_growth::data::writer::{peak_batch, write_peak_table};
use pl_growth::{extract_peaks, Config};

/// Load every spectrum, extract its peak and write the peak table.
pub fn run(config: &Config) -> Result<()> {
    let spectra_dir = &config.paths.spectra_dir;
    if !spectra_dir.is_dir() {
        anyhow::bail!("Spectra directory does not exist: {}", spectra_dir.display());
    }

    info!("Extracting PL peaks");
    info!("  Spectra: {}", spectra_dir.display());
    info!("  Output:  {}", config.paths.peak_table.display());

    let spectra = load_spectra_dir(spectra_dir, &config.spectra)
        .with_context(|| format!("Failed to load spectra from {}", spectra_dir.display()))?;
    let peaks = extract_peaks(&spectra, &config.peaks, config.spectra.skip_invalid)
        .context("Peak extraction failed")?;

    if log::log_enabled!(log::Level::Debug) {
        let batch = peak_batch(&peaks)?;
        debug!("Peak table:\n{}", pretty_format_batches(&[batch])?);
    }

    write_peak_table(&config.paths.peak_table, &peaks).with_context(|| {
        format!(
            "Failed to write peak table {}",
            config.paths.peak_table.display()
        )
    })?;
    Ok(())
}
