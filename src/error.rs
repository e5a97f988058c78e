use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Pipeline errors
// ---------------------------------------------------------------------------

/// Errors produced by the extraction and regression stages.
///
/// Join mismatches are deliberately absent: they are reported through
/// [`JoinReport`](crate::data::join::JoinReport) and logged, not raised.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A spectral file or table could not be parsed.
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        /// 1-based line number, 0 when the error is not tied to a line.
        line: usize,
        message: String,
    },

    /// A spectrum had no finite samples left to search.
    #[error("spectrum '{sample_id}' contains no valid samples")]
    EmptySpectrum { sample_id: String },

    /// Fewer usable training rows than the configured minimum.
    #[error("insufficient training data: {rows} usable rows, at least {min_rows} required")]
    InsufficientData { rows: usize, min_rows: usize },

    /// A required feature or target column is not available.
    #[error("schema mismatch: missing {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    /// A table lacks a column it must have.
    #[error("{}: missing required column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: String },

    /// The same sample ID appears twice in one source.
    #[error("duplicate sample ID '{sample_id}' in {source_name}")]
    DuplicateSampleId {
        sample_id: String,
        source_name: String,
    },

    /// Configuration values that cannot be honoured.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        PipelineError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_file_and_line() {
        let err = PipelineError::parse("spectra/G25-001.csv", 12, "'abc' is not a number");
        assert_eq!(
            err.to_string(),
            "spectra/G25-001.csv:12: 'abc' is not a number"
        );
    }

    #[test]
    fn schema_mismatch_lists_all_missing() {
        let err = PipelineError::SchemaMismatch {
            missing: vec!["well_width".into(), "growth_temp".into()],
        };
        assert_eq!(
            err.to_string(),
            "schema mismatch: missing well_width, growth_temp"
        );
    }
}
