//! Dominant PL peak extraction.
//!
//! The peak is the maximum of the (optionally smoothed and
//! baseline-corrected) intensity series. Samples are ordered by wavelength
//! first, so ties resolve to the shortest wavelength.

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::config::{Baseline, PeakConfig};
use crate::data::model::{PeakRecord, Spectrum};
use crate::error::{PipelineError, Result};

/// Extract the dominant peak from one spectrum.
pub fn extract_peak(spectrum: &Spectrum, config: &PeakConfig) -> Result<PeakRecord> {
    let mut samples: Vec<(f64, f64)> = spectrum
        .wavelength
        .iter()
        .zip(spectrum.intensity.iter())
        .filter(|(w, i)| w.is_finite() && i.is_finite())
        .map(|(&w, &i)| (w, i))
        .collect();

    if samples.is_empty() {
        return Err(PipelineError::EmptySpectrum {
            sample_id: spectrum.sample_id.clone(),
        });
    }

    // Stable: equal wavelengths keep file order.
    samples.sort_by(|a, b| a.0.total_cmp(&b.0));

    let wavelength: Vec<f64> = samples.iter().map(|s| s.0).collect();
    let mut intensity: Vec<f64> = samples.iter().map(|s| s.1).collect();

    if config.smoothing_window > 1 {
        intensity = moving_average(&intensity, config.smoothing_window);
    }
    subtract_baseline(&wavelength, &mut intensity, config.baseline);

    let idx = first_argmax(&intensity);
    Ok(PeakRecord {
        sample_id: spectrum.sample_id.clone(),
        wavelength_nm: wavelength[idx],
        intensity_au: intensity[idx],
    })
}

/// Extract one peak per spectrum, in sample-ID order.
///
/// With `skip_invalid`, spectra that fail are logged and left out;
/// otherwise the first failure is returned.
pub fn extract_peaks(
    spectra: &BTreeMap<String, Spectrum>,
    config: &PeakConfig,
    skip_invalid: bool,
) -> Result<Vec<PeakRecord>> {
    let mut peaks = Vec::with_capacity(spectra.len());

    for spectrum in spectra.values() {
        match extract_peak(spectrum, config) {
            Ok(peak) => {
                debug!(
                    "'{}': peak at {:.2} nm, intensity {:.4} a.u.",
                    peak.sample_id, peak.wavelength_nm, peak.intensity_au
                );
                peaks.push(peak);
            }
            Err(e) if skip_invalid => warn!("Failed to extract peak for '{}': {e}", spectrum.sample_id),
            Err(e) => return Err(e),
        }
    }

    info!("Extracted peaks for {} of {} spectra", peaks.len(), spectra.len());
    Ok(peaks)
}

/// Index of the first maximum. `values` must be non-empty.
fn first_argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Centred moving average; the window shrinks at the edges.
fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    let n = values.len();
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            let slice = &values[lo..hi];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

fn subtract_baseline(wavelength: &[f64], intensity: &mut [f64], baseline: Baseline) {
    match baseline {
        Baseline::None => {}
        Baseline::Min => {
            let min = intensity.iter().copied().fold(f64::INFINITY, f64::min);
            for v in intensity.iter_mut() {
                *v -= min;
            }
        }
        Baseline::Linear => {
            let n = intensity.len();
            if n < 2 {
                return;
            }
            let (x0, x1) = (wavelength[0], wavelength[n - 1]);
            let (y0, y1) = (intensity[0], intensity[n - 1]);
            let span = x1 - x0;
            if span.abs() < f64::EPSILON {
                return;
            }
            let slope = (y1 - y0) / span;
            for (v, &x) in intensity.iter_mut().zip(wavelength) {
                *v -= y0 + slope * (x - x0);
            }
        }
    }
}
