//! # pl-growth
//!
//! Extracts photoluminescence (PL) peaks from quantum-well spectra, joins them
//! with growth metadata and fits an ensemble regression model that predicts
//! peak wavelength and intensity from growth-recipe parameters.
//!
//! ## Pipeline
//!
//! ```text
//!   spectra dir ──► data::loader ──► peaks ──► peak table (CSV / Parquet)
//!                                                  │
//!   metadata table ───────────────────────► data::join ──► TrainingTable
//!                                                                │
//!                        regression::trainer ◄───────────────────┘
//!                                │
//!                              Model ──► regression::predictor ──► ranked recipes
//! ```
//!
//! Every stage is a plain function over owned tables; configuration comes from
//! [`config::Config`] and failures from [`error::PipelineError`].

pub mod config;
pub mod data;
pub mod error;
pub mod peaks;
pub mod regression;

pub use config::{Config, Recipe};
pub use data::join::{join, JoinReport};
pub use data::model::{
    MetadataTable, MetadataValue, PeakRecord, SampleMetadata, Spectrum, TrainingRow, TrainingTable,
};
pub use error::{PipelineError, Result};
pub use peaks::{extract_peak, extract_peaks};
pub use regression::predictor::{predict, rank_by_ideal, Prediction};
pub use regression::trainer::train;
pub use regression::Model;
