//! CSV loader for the Ministry of Health case dataset (Covid19Casos.csv).

pub mod cleaner;

use crate::models::{CaseRecord, RawCaseRow};
use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use self::cleaner::raw_row_to_record;

/// Outcome of parsing one CSV file.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub records: Vec<CaseRecord>,
    pub skipped: usize,
}

/// Parse a case CSV. Columns are matched by header name, so extra or
/// reordered columns are fine. Malformed rows are logged and skipped.
pub fn load_reader<R: Read>(input: R) -> Result<LoadReport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(input);

    let mut report = LoadReport::default();

    for (i, result) in reader.deserialize::<RawCaseRow>().enumerate() {
        let raw = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {}: {}", i + 1, e);
                report.skipped += 1;
                continue;
            }
        };

        match raw_row_to_record(&raw) {
            Some(record) => report.records.push(record),
            None => {
                debug!("Row {} dropped: {:?}", i + 1, raw.event_id);
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

pub fn load_csv(path: &Path) -> Result<LoadReport> {
    debug!("Loading cases from {:?}", path);
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let report = load_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to parse {:?}", path))?;
    info!("{:?}: {} cases loaded, {} rows skipped", path, report.records.len(), report.skipped);
    Ok(report)
}
