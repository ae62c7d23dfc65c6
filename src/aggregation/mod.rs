//! Calendar-complete daily case/death series.
//!
//! `aggregate` is a pure function of its inputs: it never touches the store
//! and keeps no state between calls.

use crate::models::{CaseRecord, TimeSeriesRow};
use chrono::NaiveDate;
use std::collections::HashMap;

/// First date present in the historical SISA dataset.
pub const DATASET_EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(2020, 2, 11) {
    Some(d) => d,
    None => panic!("invalid dataset epoch"),
};

// ── Date window ───────────────────────────────────────────────────────────────

/// Inclusive `[start, end]` calendar window. `end < start` is an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Fill in missing bounds: the start falls back to [`DATASET_EPOCH`],
    /// the end to `last_date` (the latest diagnosis in the full dataset).
    pub fn resolve(start: Option<NaiveDate>, end: Option<NaiveDate>, last_date: NaiveDate) -> Self {
        Self::new(start.unwrap_or(DATASET_EPOCH), end.unwrap_or(last_date))
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start).num_days() as usize + 1
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date of the window in order; yields exactly `len()` items.
    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        std::iter::successors(Some(self.start), |d| d.succ_opt()).take(self.len())
    }
}

// ── Grouping ──────────────────────────────────────────────────────────────────

/// Field a caller groups by before the series is collapsed to one row per date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Province,
    Sex,
}

impl GroupKey {
    fn value_of(self, record: &CaseRecord) -> Option<&str> {
        let v = match self {
            Self::Province => Some(record.province_name.as_str()),
            Self::Sex => record.sex.as_deref(),
        };
        v.map(str::trim).filter(|s| !s.is_empty())
    }
}

// ── Aggregation ───────────────────────────────────────────────────────────────

/// Build one row per day of `window` with daily and cumulative counts.
///
/// Cases are placed on `diagnosis_date`, deaths on `death_date` of deceased
/// records. Days without records are zero-filled. With a `group_key`, records
/// lacking a value for that key cannot be assigned to a group and are not
/// counted; the remaining groups are summed per date.
pub fn aggregate(
    records: &[CaseRecord],
    group_key: Option<GroupKey>,
    window: DateWindow,
) -> Vec<TimeSeriesRow> {
    if window.is_empty() {
        return Vec::new();
    }

    let mut cases: HashMap<NaiveDate, u64> = HashMap::new();
    let mut deaths: HashMap<NaiveDate, u64> = HashMap::new();

    let grouped = records
        .iter()
        .filter(|r| group_key.is_none_or(|k| k.value_of(r).is_some()));

    for record in grouped {
        if let Some(d) = record.diagnosis_date.filter(|d| window.contains(*d)) {
            *cases.entry(d).or_default() += 1;
        }
        if let Some(d) = record.death_event().filter(|d| window.contains(*d)) {
            *deaths.entry(d).or_default() += 1;
        }
    }

    let mut cases_cumulative = 0u64;
    let mut deaths_cumulative = 0u64;
    let mut rows = Vec::with_capacity(window.len());

    for date in window.days() {
        let day_cases = cases.get(&date).copied().unwrap_or(0);
        let day_deaths = deaths.get(&date).copied().unwrap_or(0);
        cases_cumulative += day_cases;
        deaths_cumulative += day_deaths;

        rows.push(TimeSeriesRow {
            date,
            cases: day_cases,
            deaths: day_deaths,
            cases_cumulative,
            deaths_cumulative,
        });
    }

    rows
}

// ── Tests ─────────────────────────────────────────────────────────────────────
