/// Data layer: core types, loading, joining and table output.
///
/// Architecture:
/// ```text
///  PL_Spectra_Raw/*.csv        growth_parameters.csv
///        │                             │
///        ▼                             │
///   ┌──────────┐                       │
///   │  loader   │  files → Spectrum     │
///   └──────────┘                       │
///        │  (peaks::extract_peaks)     │
///        ▼                             ▼
///   ┌────────────┐              ┌──────────┐
///   │ PeakRecord  │──── join ───│ metadata  │
///   └────────────┘              └──────────┘
///        │                             │
///        └──────────────┬──────────────┘
///                       ▼
///               ┌───────────────┐
///               │ TrainingTable  │  → writer (csv / parquet)
///               └───────────────┘
/// ```

pub mod join;
pub mod loader;
pub mod model;
pub mod writer;
