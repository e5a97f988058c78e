use std::collections::BTreeMap;

use log::{info, warn};
use serde::Serialize;

use super::model::{MetadataTable, PeakRecord, TrainingRow, TrainingTable};

/// Sample IDs that found no partner during the join.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JoinReport {
    /// Peaks whose sample has no growth-parameter row.
    pub unmatched_peaks: Vec<String>,
    /// Growth-parameter rows with no extracted peak.
    pub unmatched_metadata: Vec<String>,
}

impl JoinReport {
    pub fn is_empty(&self) -> bool {
        self.unmatched_peaks.is_empty() && self.unmatched_metadata.is_empty()
    }

    pub fn mismatch_count(&self) -> usize {
        self.unmatched_peaks.len() + self.unmatched_metadata.len()
    }

    /// Emit one warning per non-empty side.
    pub fn log_warnings(&self) {
        if !self.unmatched_peaks.is_empty() {
            warn!(
                "{} peak(s) have no metadata row and were dropped: {}",
                self.unmatched_peaks.len(),
                self.unmatched_peaks.join(", ")
            );
        }
        if !self.unmatched_metadata.is_empty() {
            warn!(
                "{} metadata row(s) have no extracted peak and were dropped: {}",
                self.unmatched_metadata.len(),
                self.unmatched_metadata.join(", ")
            );
        }
    }
}

/// Inner join of peaks and growth parameters on sample ID.
///
/// Rows come out in sample-ID order. Unmatched IDs on either side are
/// collected in the report and logged; they never fail the join.
pub fn join(peaks: &[PeakRecord], metadata: &MetadataTable) -> (TrainingTable, JoinReport) {
    let by_id: BTreeMap<&str, &PeakRecord> =
        peaks.iter().map(|p| (p.sample_id.as_str(), p)).collect();
    let meta_by_id: BTreeMap<&str, _> = metadata
        .rows
        .iter()
        .map(|m| (m.sample_id.as_str(), m))
        .collect();

    let mut rows = Vec::new();
    let mut report = JoinReport::default();

    for (id, peak) in &by_id {
        match meta_by_id.get(id) {
            Some(meta) => rows.push(TrainingRow {
                peak: (*peak).clone(),
                metadata: (*meta).clone(),
            }),
            None => report.unmatched_peaks.push(id.to_string()),
        }
    }
    report.unmatched_metadata = meta_by_id
        .keys()
        .filter(|id| !by_id.contains_key(*id))
        .map(|id| id.to_string())
        .collect();

    report.log_warnings();
    info!(
        "Joined {} training rows ({} peaks, {} metadata rows)",
        rows.len(),
        peaks.len(),
        metadata.len()
    );

    let table = TrainingTable {
        metadata_columns: metadata.columns.clone(),
        rows,
    };
    (table, report)
}
