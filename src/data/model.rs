use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sample-ID column shared by the peak table and the growth-parameter table.
pub const SAMPLE_ID_COLUMN: &str = "QW_Sample";
pub const PEAK_WAVELENGTH_COLUMN: &str = "PL_Peak_Wavelength_nm";
pub const PEAK_INTENSITY_COLUMN: &str = "PL_Peak_Intensity_au";

// ---------------------------------------------------------------------------
// MetadataValue – a single cell in a growth-parameter column
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata value mirroring common spreadsheet dtypes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Null,
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => Ok(()),
        }
    }
}

impl MetadataValue {
    /// Guess the type of a raw table cell.
    pub fn infer(raw: &str) -> Self {
        let s = raw.trim();
        match s.to_ascii_lowercase().as_str() {
            "" | "nan" | "na" | "null" => return MetadataValue::Null,
            "true" => return MetadataValue::Bool(true),
            "false" => return MetadataValue::Bool(false),
            _ => {}
        }
        if let Ok(i) = s.parse::<i64>() {
            return MetadataValue::Integer(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return MetadataValue::Float(f);
        }
        MetadataValue::String(s.to_string())
    }

    /// Numeric view of the value, `None` for anything the model cannot use.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) if v.is_finite() => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetadataValue::Null)
    }
}

// ---------------------------------------------------------------------------
// Spectrum – one measurement file
// ---------------------------------------------------------------------------

/// A single PL spectrum, keyed by the sample ID taken from its file name.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub sample_id: String,
    /// Wavelength axis in nm.
    pub wavelength: Vec<f64>,
    /// Intensity axis (a.u.) – same length as `wavelength`.
    pub intensity: Vec<f64>,
}

impl Spectrum {
    pub fn new(sample_id: impl Into<String>, wavelength: Vec<f64>, intensity: Vec<f64>) -> Self {
        Self {
            sample_id: sample_id.into(),
            wavelength,
            intensity,
        }
    }

    /// Number of (wavelength, intensity) samples.
    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PeakRecord – one row of the extracted peak table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    #[serde(rename = "QW_Sample")]
    pub sample_id: String,
    #[serde(rename = "PL_Peak_Wavelength_nm")]
    pub wavelength_nm: f64,
    #[serde(rename = "PL_Peak_Intensity_au")]
    pub intensity_au: f64,
}

// ---------------------------------------------------------------------------
// SampleMetadata – one row of the growth-parameter table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SampleMetadata {
    pub sample_id: String,
    /// Growth parameters: column_name → value.
    pub values: BTreeMap<String, MetadataValue>,
}

impl SampleMetadata {
    pub fn new(sample_id: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: &str, value: MetadataValue) -> Self {
        self.values.insert(column.to_string(), value);
        self
    }
}

/// The growth-parameter table with its column order preserved.
#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
    /// Parameter columns in header order (excludes the ID column).
    pub columns: Vec<String>,
    pub rows: Vec<SampleMetadata>,
}

impl MetadataTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// TrainingRow – joined peak + metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub peak: PeakRecord,
    pub metadata: SampleMetadata,
}

impl TrainingRow {
    pub fn sample_id(&self) -> &str {
        &self.peak.sample_id
    }

    /// Cell for a named column; peak columns resolve to the extracted peak.
    pub fn cell(&self, column: &str) -> Option<MetadataValue> {
        match column {
            PEAK_WAVELENGTH_COLUMN => Some(MetadataValue::Float(self.peak.wavelength_nm)),
            PEAK_INTENSITY_COLUMN => Some(MetadataValue::Float(self.peak.intensity_au)),
            other => self.metadata.values.get(other).cloned(),
        }
    }

    /// Numeric value of a named column.
    pub fn value(&self, column: &str) -> Option<f64> {
        self.cell(column).and_then(|v| v.as_f64())
    }
}

/// The joined table handed to the trainer.
#[derive(Debug, Clone, Default)]
pub struct TrainingTable {
    /// Metadata columns carried by the rows, in source order.
    pub metadata_columns: Vec<String>,
    pub rows: Vec<TrainingRow>,
}

impl TrainingTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether `column` can be looked up on the rows of this table.
    pub fn has_column(&self, column: &str) -> bool {
        column == PEAK_WAVELENGTH_COLUMN
            || column == PEAK_INTENSITY_COLUMN
            || self.metadata_columns.iter().any(|c| c == column)
    }

    /// Header used when the table is written out.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec![
            SAMPLE_ID_COLUMN.to_string(),
            PEAK_WAVELENGTH_COLUMN.to_string(),
            PEAK_INTENSITY_COLUMN.to_string(),
        ];
        names.extend(self.metadata_columns.iter().cloned());
        names
    }
}
