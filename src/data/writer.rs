use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::ArrowWriter;
use serde::Serialize;

use super::model::{
    PeakRecord, TrainingTable, PEAK_INTENSITY_COLUMN, PEAK_WAVELENGTH_COLUMN, SAMPLE_ID_COLUMN,
};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Peak table
// ---------------------------------------------------------------------------

/// Write the extracted peak table, one row per sample. Dispatch by extension:
/// `.parquet` / `.pq` write Parquet, anything else CSV.
pub fn write_peak_table(path: &Path, peaks: &[PeakRecord]) -> Result<()> {
    ensure_parent(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => write_peaks_parquet(path, peaks)?,
        _ => write_peaks_csv(path, peaks)?,
    }

    info!("Wrote {} peak rows to {}", peaks.len(), path.display());
    Ok(())
}

fn write_peaks_csv(path: &Path, peaks: &[PeakRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    if peaks.is_empty() {
        writer.write_record([SAMPLE_ID_COLUMN, PEAK_WAVELENGTH_COLUMN, PEAK_INTENSITY_COLUMN])?;
    }
    for peak in peaks {
        writer.serialize(peak)?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

/// Peak rows as a single Arrow record batch.
pub fn peak_batch(peaks: &[PeakRecord]) -> Result<RecordBatch> {
    let ids = StringArray::from(
        peaks
            .iter()
            .map(|p| p.sample_id.as_str())
            .collect::<Vec<_>>(),
    );
    let wavelengths = Float64Array::from(peaks.iter().map(|p| p.wavelength_nm).collect::<Vec<_>>());
    let intensities = Float64Array::from(peaks.iter().map(|p| p.intensity_au).collect::<Vec<_>>());

    Ok(RecordBatch::try_new(
        peak_schema(),
        vec![Arc::new(ids), Arc::new(wavelengths), Arc::new(intensities)],
    )?)
}

fn peak_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(SAMPLE_ID_COLUMN, DataType::Utf8, false),
        Field::new(PEAK_WAVELENGTH_COLUMN, DataType::Float64, false),
        Field::new(PEAK_INTENSITY_COLUMN, DataType::Float64, false),
    ]))
}

fn write_peaks_parquet(path: &Path, peaks: &[PeakRecord]) -> Result<()> {
    let batch = peak_batch(peaks)?;
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Joined training table
// ---------------------------------------------------------------------------

/// Write the joined rows as CSV: ID, the two peak columns, then metadata
/// columns in source order.
pub fn write_training_table(path: &Path, table: &TrainingTable) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.column_names())?;

    for row in &table.rows {
        let mut record = vec![
            row.sample_id().to_string(),
            row.peak.wavelength_nm.to_string(),
            row.peak.intensity_au.to_string(),
        ];
        for column in &table.metadata_columns {
            record.push(
                row.metadata
                    .values
                    .get(column)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        writer.write_record(&record)?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;

    info!("Wrote {} training rows to {}", table.len(), path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON artefacts (model, metrics)
// ---------------------------------------------------------------------------

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::load_peak_table;

    fn peaks() -> Vec<PeakRecord> {
        vec![
            PeakRecord {
                sample_id: "G25-001".into(),
                wavelength_nm: 950.0,
                intensity_au: 1.0,
            },
            PeakRecord {
                sample_id: "G25-002".into(),
                wavelength_nm: 960.5,
                intensity_au: 0.8,
            },
        ]
    }

    #[test]
    fn csv_peak_table_has_expected_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peaks.csv");
        write_peak_table(&path, &peaks()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("QW_Sample,PL_Peak_Wavelength_nm,PL_Peak_Intensity_au")
        );
        assert_eq!(lines.next(), Some("G25-001,950.0,1.0"));
        assert_eq!(load_peak_table(&path).unwrap(), peaks());
    }

    #[test]
    fn parquet_peak_table_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("peaks.parquet");
        write_peak_table(&path, &peaks()).unwrap();
        assert_eq!(load_peak_table(&path).unwrap(), peaks());
    }

    #[test]
    fn json_is_complete_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics").join("validation.json");
        write_json(&path, &peaks()).unwrap();

        let back: Vec<PeakRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, peaks());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn json_write_failure_is_reported() {
        // writes to /dev/full fail with ENOSPC once the buffer is flushed
        let err = write_json(Path::new("/dev/full"), &vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. } | PipelineError::Json(_)));
    }
}
