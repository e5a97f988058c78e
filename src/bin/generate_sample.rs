//! Writes a synthetic PL data set: one spectrum file per quantum-well sample
//! plus the matching growth-parameter table.
//!
//! ```bash
//! generate_sample --out demo --samples 40
//! pl-growth -v extract --spectra-dir demo/PL_Spectra_Raw --output demo/peaks.csv
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use pl_growth::data::model::SAMPLE_ID_COLUMN;
use pl_growth::regression::rng::SimpleRng;

#[derive(Parser)]
#[command(name = "generate_sample", about = "Generate synthetic PL spectra and growth parameters")]
struct Args {
    /// Output directory
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Number of samples
    #[arg(short = 'n', long, default_value = "30")]
    samples: usize,

    /// PRNG seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

/// Growth recipe drawn for one synthetic sample.
struct Growth {
    in_fraction: f64,
    well_width: f64,
    growth_temp: f64,
}

impl Growth {
    /// Emission centre: red-shifts with indium and well width, blue-shifts
    /// with temperature (indium desorption).
    fn peak_wavelength(&self) -> f64 {
        900.0 + 400.0 * (self.in_fraction - 0.2) + 4.0 * (self.well_width - 6.0)
            - 0.15 * (self.growth_temp - 650.0)
    }

    /// Brightest near 680 °C and for thin wells.
    fn peak_intensity(&self) -> f64 {
        let temp_penalty = ((self.growth_temp - 680.0) / 60.0).powi(2);
        (1.2 - 0.05 * (self.well_width - 6.0) - 0.4 * temp_penalty).max(0.05)
    }
}

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    let spectra_dir = args.out.join("PL_Spectra_Raw");
    fs::create_dir_all(&spectra_dir)
        .with_context(|| format!("Failed to create {}", spectra_dir.display()))?;

    // 800 → 1100 nm, step 0.5
    let wavelengths: Vec<f64> = (0..=600).map(|i| 800.0 + i as f64 * 0.5).collect();

    let metadata_path = args.out.join("growth_parameters.csv");
    let mut metadata = csv::Writer::from_path(&metadata_path)
        .with_context(|| format!("Failed to create {}", metadata_path.display()))?;
    metadata.write_record([SAMPLE_ID_COLUMN, "in_fraction", "well_width", "growth_temp"])?;

    for k in 0..args.samples {
        let sample_id = format!("G25-{:03}", k + 1);
        let growth = Growth {
            in_fraction: 0.20 + 0.15 * rng.next_f64(),
            well_width: 4.0 + 4.0 * rng.next_f64(),
            growth_temp: 620.0 + 120.0 * rng.next_f64(),
        };
        let centre = growth.peak_wavelength() + rng.gauss(0.0, 1.0);
        let amplitude = growth.peak_intensity() * (1.0 + rng.gauss(0.0, 0.03));
        let fwhm = 25.0 + 2.0 * growth.well_width;
        let sigma = fwhm / 2.354_820_045;

        let path = spectra_dir.join(format!("{sample_id}.csv"));
        let mut out = BufWriter::new(
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?,
        );
        writeln!(out, "# Sample: {sample_id}")?;
        writeln!(out, "# Excitation: 532 nm")?;
        writeln!(out, "# Integration time: 1 s")?;
        writeln!(out, "lambda [nm]\tintensity [a.u.]")?;
        for &w in &wavelengths {
            let signal = gaussian(w, centre, sigma, amplitude) + 0.02 + rng.gauss(0.0, 0.004);
            writeln!(out, "{w:.1}\t{signal:.6}")?;
        }
        out.flush()?;

        metadata.write_record([
            sample_id,
            format!("{:.4}", growth.in_fraction),
            format!("{:.2}", growth.well_width),
            format!("{:.1}", growth.growth_temp),
        ])?;
    }
    metadata.flush()?;

    println!(
        "Wrote {} spectra ({} points each) to {} and growth parameters to {}",
        args.samples,
        wavelengths.len(),
        spectra_dir.display(),
        metadata_path.display()
    );
    Ok(())
}
