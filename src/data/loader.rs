use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use arrow::array::{Array, Float32Array, Float64Array, LargeStringArray, StringArray};
use arrow::datatypes::DataType;
use log::{debug, info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{
    MetadataTable, MetadataValue, PeakRecord, SampleMetadata, Spectrum, PEAK_INTENSITY_COLUMN,
    PEAK_WAVELENGTH_COLUMN, SAMPLE_ID_COLUMN,
};
use crate::config::{Recipe, SpectraConfig};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Spectrum directory loader
// ---------------------------------------------------------------------------

/// Sample ID for a spectrum file: the file name without its extension,
/// e.g. `G25-023-center.csv` → `G25-023-center`.
pub fn sample_id_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

fn has_spectrum_extension(path: &Path, config: &SpectraConfig) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    config
        .extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// Load every spectrum file in `dir`, keyed by sample ID.
///
/// Files are visited in name order. With `skip_invalid` set, files that fail
/// to parse are logged and left out; otherwise the first failure is returned.
pub fn load_spectra_dir(dir: &Path, config: &SpectraConfig) -> Result<BTreeMap<String, Spectrum>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        if has_spectrum_extension(&path, config) {
            paths.push(path);
        } else {
            debug!("Skipping non-spectrum file {}", path.display());
        }
    }
    paths.sort();

    let mut spectra = BTreeMap::new();
    let mut skipped = 0usize;

    for path in &paths {
        let spectrum = match read_spectrum_file(path, config) {
            Ok(sp) => sp,
            Err(e) if config.skip_invalid => {
                warn!("Skipping {}: {e}", path.display());
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        debug!(
            "Loaded '{}' ({} samples) from {}",
            spectrum.sample_id,
            spectrum.len(),
            path.display()
        );

        if spectra.contains_key(&spectrum.sample_id) {
            return Err(PipelineError::DuplicateSampleId {
                sample_id: spectrum.sample_id,
                source_name: dir.display().to_string(),
            });
        }
        spectra.insert(spectrum.sample_id.clone(), spectrum);
    }

    info!(
        "Loaded {} spectra from {} ({} skipped)",
        spectra.len(),
        dir.display(),
        skipped
    );
    Ok(spectra)
}

/// Read one spectrum file; the sample ID comes from the file name.
pub fn read_spectrum_file(path: &Path, config: &SpectraConfig) -> Result<Spectrum> {
    let sample_id = sample_id_from_path(path)
        .ok_or_else(|| PipelineError::parse(path, 0, "cannot derive a sample ID from the file name"))?;
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    parse_spectrum(&sample_id, path, BufReader::new(file), config)
}

/// Parse spectrum text.
///
/// Layout:
/// ```text
/// # comment lines (any number, anywhere)
/// Instrument preamble without '#' (skipped until the header)
/// lambda [nm]<TAB>intensity [a.u.]
/// 940.0<TAB>0.12
/// 940.5<TAB>0.13
/// ```
/// `path` is only used in error messages.
pub fn parse_spectrum<R: BufRead>(
    sample_id: &str,
    path: &Path,
    reader: R,
    config: &SpectraConfig,
) -> Result<Spectrum> {
    let delimiter = config.delimiter;
    let mut columns: Option<(usize, usize)> = None;
    let mut wavelength = Vec::new();
    let mut intensity = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|e| PipelineError::io(path, e))?;
        let line = line.trim_start_matches('\u{feff}');
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(delimiter).map(str::trim).collect();

        let Some((w_idx, i_idx)) = columns else {
            // Instrument preamble lines are skipped until the header shows up.
            columns = locate_header(&fields, config);
            if columns.is_none() {
                debug!("{}:{line_no}: skipping preamble line", path.display());
            }
            continue;
        };

        let w = parse_field(&fields, w_idx, path, line_no, &config.wavelength_column)?;
        let i = parse_field(&fields, i_idx, path, line_no, &config.intensity_column)?;
        wavelength.push(w);
        intensity.push(i);
    }

    if columns.is_none() {
        return Err(PipelineError::parse(
            path,
            0,
            format!(
                "no header line with '{}' and '{}' found",
                config.wavelength_column, config.intensity_column
            ),
        ));
    }

    Ok(Spectrum::new(sample_id, wavelength, intensity))
}

fn locate_header(fields: &[&str], config: &SpectraConfig) -> Option<(usize, usize)> {
    let find = |name: &str| fields.iter().position(|f| *f == name);
    Some((find(&config.wavelength_column)?, find(&config.intensity_column)?))
}

fn parse_field(fields: &[&str], idx: usize, path: &Path, line_no: usize, column: &str) -> Result<f64> {
    let raw = fields.get(idx).copied().unwrap_or("");
    if raw.is_empty() {
        return Err(PipelineError::parse(
            path,
            line_no,
            format!("missing value for '{column}'"),
        ));
    }
    raw.parse::<f64>().map_err(|_| {
        PipelineError::parse(path, line_no, format!("'{raw}' in '{column}' is not a number"))
    })
}

// ---------------------------------------------------------------------------
// Growth-parameter table
// ---------------------------------------------------------------------------

/// Field delimiter for a table file: tab for `.tsv`/`.txt`, comma otherwise.
fn table_delimiter(path: &Path) -> u8 {
    match extension(path).as_str() {
        "tsv" | "txt" | "tab" => b'\t',
        _ => b',',
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Load the growth-parameter table keyed by `id_column`.
pub fn load_metadata(path: &Path, id_column: &str) -> Result<MetadataTable> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    read_metadata(file, path, table_delimiter(path), id_column)
}

/// Parse a growth-parameter table from any reader. `path` labels errors.
pub fn read_metadata<R: std::io::Read>(
    reader: R,
    path: &Path,
    delimiter: u8,
    id_column: &str,
) -> Result<MetadataTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let id_idx = headers
        .iter()
        .position(|h| h == id_column)
        .ok_or_else(|| PipelineError::MissingColumn {
            path: path.to_path_buf(),
            column: id_column.to_string(),
        })?;

    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != id_idx)
        .map(|(_, h)| h.clone())
        .collect();

    let mut seen = BTreeSet::new();
    let mut rows = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        // Header is line 1.
        let line_no = row_no + 2;

        let sample_id = record.get(id_idx).unwrap_or("").to_string();
        if sample_id.is_empty() {
            return Err(PipelineError::parse(
                path,
                line_no,
                format!("empty '{id_column}' cell"),
            ));
        }
        if !seen.insert(sample_id.clone()) {
            return Err(PipelineError::DuplicateSampleId {
                sample_id,
                source_name: path.display().to_string(),
            });
        }

        let mut values = BTreeMap::new();
        for (col_idx, value) in record.iter().enumerate() {
            if col_idx == id_idx {
                continue;
            }
            if let Some(name) = headers.get(col_idx) {
                values.insert(name.clone(), MetadataValue::infer(value));
            }
        }
        rows.push(SampleMetadata { sample_id, values });
    }

    info!(
        "Loaded {} metadata rows with columns {:?} from {}",
        rows.len(),
        columns,
        path.display()
    );
    Ok(MetadataTable { columns, rows })
}

// ---------------------------------------------------------------------------
// Peak table (written by the extract step, read by the train step)
// ---------------------------------------------------------------------------

/// Load an extracted peak table. Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – columns `QW_Sample`, `PL_Peak_Wavelength_nm`, `PL_Peak_Intensity_au`
/// * anything else – CSV with the same header
pub fn load_peak_table(path: &Path) -> Result<Vec<PeakRecord>> {
    let peaks = match extension(path).as_str() {
        "parquet" | "pq" => load_peaks_parquet(path)?,
        _ => load_peaks_csv(path)?,
    };

    let mut seen = BTreeSet::new();
    for peak in &peaks {
        if !seen.insert(peak.sample_id.as_str()) {
            return Err(PipelineError::DuplicateSampleId {
                sample_id: peak.sample_id.clone(),
                source_name: path.display().to_string(),
            });
        }
    }
    Ok(peaks)
}

fn load_peaks_csv(path: &Path) -> Result<Vec<PeakRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(table_delimiter(path))
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    for required in [SAMPLE_ID_COLUMN, PEAK_WAVELENGTH_COLUMN, PEAK_INTENSITY_COLUMN] {
        if !headers.iter().any(|h| h == required) {
            return Err(PipelineError::MissingColumn {
                path: path.to_path_buf(),
                column: required.to_string(),
            });
        }
    }

    let mut peaks = Vec::new();
    for result in reader.deserialize() {
        peaks.push(result?);
    }
    Ok(peaks)
}

fn load_peaks_parquet(path: &Path) -> Result<Vec<PeakRecord>> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut peaks = Vec::new();

    for batch_result in reader {
        let batch = batch_result?;
        let schema = batch.schema();

        let column_index = |name: &str| {
            schema
                .index_of(name)
                .map_err(|_| PipelineError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name.to_string(),
                })
        };
        let id_col = batch.column(column_index(SAMPLE_ID_COLUMN)?);
        let w_col = batch.column(column_index(PEAK_WAVELENGTH_COLUMN)?);
        let i_col = batch.column(column_index(PEAK_INTENSITY_COLUMN)?);

        for row in 0..batch.num_rows() {
            peaks.push(PeakRecord {
                sample_id: extract_string(id_col.as_ref(), row, path)?,
                wavelength_nm: extract_f64(w_col.as_ref(), row, path)?,
                intensity_au: extract_f64(i_col.as_ref(), row, path)?,
            });
        }
    }

    Ok(peaks)
}

// -- Arrow helpers --

fn extract_string(col: &dyn Array, row: usize, path: &Path) -> Result<String> {
    if col.is_null(row) {
        return Err(PipelineError::parse(path, 0, format!("row {row}: null sample ID")));
    }
    if let Some(s) = col.as_any().downcast_ref::<StringArray>() {
        Ok(s.value(row).to_string())
    } else if let Some(s) = col.as_any().downcast_ref::<LargeStringArray>() {
        Ok(s.value(row).to_string())
    } else {
        Err(PipelineError::parse(
            path,
            0,
            format!("sample ID column is {:?}, expected Utf8", col.data_type()),
        ))
    }
}

fn extract_f64(col: &dyn Array, row: usize, path: &Path) -> Result<f64> {
    if col.is_null(row) {
        return Err(PipelineError::parse(path, 0, format!("row {row}: null peak value")));
    }
    let value = match col.data_type() {
        DataType::Float64 => col
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| a.value(row)),
        DataType::Float32 => col
            .as_any()
            .downcast_ref::<Float32Array>()
            .map(|a| a.value(row) as f64),
        _ => None,
    };
    value.ok_or_else(|| {
        PipelineError::parse(
            path,
            0,
            format!("peak column is {:?}, expected Float64 or Float32", col.data_type()),
        )
    })
}

// ---------------------------------------------------------------------------
// Recipe table
// ---------------------------------------------------------------------------

/// Load hypothetical recipes from a table: an optional `name` column plus one
/// numeric column per growth parameter. Empty cells are left out of the
/// recipe so the predictor reports them as missing.
pub fn load_recipes(path: &Path) -> Result<Vec<Recipe>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(table_delimiter(path))
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut recipes = Vec::new();

    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        let line_no = row_no + 2;
        let mut recipe = Recipe::default();

        for (header, raw) in headers.iter().zip(record.iter()) {
            if header == "name" {
                if !raw.is_empty() {
                    recipe.name = Some(raw.to_string());
                }
                continue;
            }
            if raw.is_empty() {
                continue;
            }
            let value = raw.parse::<f64>().map_err(|_| {
                PipelineError::parse(path, line_no, format!("'{raw}' in '{header}' is not a number"))
            })?;
            recipe.params.insert(header.clone(), value);
        }
        recipes.push(recipe);
    }

    Ok(recipes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SPECTRUM: &str = "# Sample: G25-023\n\
# Laser: 532 nm\n\
# Integration time: 1 s\n\
lambda [nm]\tintensity [a.u.]\n\
940.0\t0.10\n\
945.0\t0.55\n\
# detector saturated below\n\
950.0\t1.00\n\
955.0\t0.40\n";

    fn parse(text: &str) -> Result<Spectrum> {
        parse_spectrum(
            "G25-023",
            Path::new("G25-023.csv"),
            Cursor::new(text),
            &SpectraConfig::default(),
        )
    }

    #[test]
    fn parses_comment_header_and_rows() {
        let sp = parse(SPECTRUM).unwrap();
        assert_eq!(sp.sample_id, "G25-023");
        assert_eq!(sp.wavelength, vec![940.0, 945.0, 950.0, 955.0]);
        assert_eq!(sp.intensity, vec![0.10, 0.55, 1.00, 0.40]);
    }

    #[test]
    fn columns_may_appear_in_any_order() {
        let text = "intensity [a.u.]\tlambda [nm]\n0.5\t900\n0.7\t901\n";
        let sp = parse(text).unwrap();
        assert_eq!(sp.wavelength, vec![900.0, 901.0]);
        assert_eq!(sp.intensity, vec![0.5, 0.7]);
    }

    #[test]
    fn malformed_number_is_a_parse_error_with_line() {
        let text = "lambda [nm]\tintensity [a.u.]\n940.0\t0.1\n945.0\tabc\n";
        match parse(text) {
            Err(PipelineError::Parse { line, message, .. }) => {
                assert_eq!(line, 3);
                assert!(message.contains("abc"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn missing_value_is_a_parse_error() {
        let text = "lambda [nm]\tintensity [a.u.]\n940.0\n";
        assert!(matches!(parse(text), Err(PipelineError::Parse { line: 2, .. })));
    }

    #[test]
    fn missing_header_column_is_a_parse_error() {
        let text = "# only comments\nwavelength\tcounts\n940.0\t0.1\n";
        match parse(text) {
            Err(PipelineError::Parse { line, message, .. }) => {
                assert_eq!(line, 0);
                assert!(message.contains("no header line"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn preamble_before_header_is_skipped() {
        let text = "# c\nIntegration time\t1 s\nGrating: 600 l/mm\nlambda [nm]\tintensity [a.u.]\n950\t1.0\n";
        let sp = parse(text).unwrap();
        assert_eq!(sp.wavelength, vec![950.0]);
        assert_eq!(sp.intensity, vec![1.0]);
    }

    #[test]
    fn byte_order_mark_before_header_is_ignored() {
        let text = "\u{feff}lambda [nm]\tintensity [a.u.]\n950\t1.0\n951\t0.5\n";
        let sp = parse(text).unwrap();
        assert_eq!(sp.wavelength, vec![950.0, 951.0]);
    }

    #[test]
    fn comment_only_file_is_a_parse_error() {
        assert!(matches!(parse("# nothing here\n"), Err(PipelineError::Parse { .. })));
    }

    #[test]
    fn header_without_rows_yields_empty_spectrum() {
        let sp = parse("lambda [nm]\tintensity [a.u.]\n").unwrap();
        assert!(sp.is_empty());
    }

    #[test]
    fn sample_id_is_file_stem() {
        assert_eq!(
            sample_id_from_path(Path::new("raw/G25-023-center.csv")).as_deref(),
            Some("G25-023-center")
        );
    }

    #[test]
    fn metadata_table_is_keyed_by_id_column() {
        let text = "QW_Sample,in_fraction,well_width,note\nA,0.30,6,\nB,0.32,7,regrown\n";
        let table =
            read_metadata(Cursor::new(text), Path::new("meta.csv"), b',', "QW_Sample").unwrap();
        assert_eq!(table.columns, vec!["in_fraction", "well_width", "note"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].sample_id, "A");
        assert_eq!(table.rows[0].values["in_fraction"], MetadataValue::Float(0.30));
        assert_eq!(table.rows[0].values["note"], MetadataValue::Null);
        assert_eq!(table.rows[1].values["well_width"], MetadataValue::Integer(7));
    }

    #[test]
    fn metadata_without_id_column_fails() {
        let text = "sample,in_fraction\nA,0.3\n";
        let err =
            read_metadata(Cursor::new(text), Path::new("meta.csv"), b',', "QW_Sample").unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn metadata_duplicate_id_fails() {
        let text = "QW_Sample,in_fraction\nA,0.3\nA,0.4\n";
        let err =
            read_metadata(Cursor::new(text), Path::new("meta.csv"), b',', "QW_Sample").unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateSampleId { .. }));
    }
}
