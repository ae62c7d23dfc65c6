//! Record store abstraction.
//!
//! A store answers predicate queries over case records. Implementations must
//! serve every query from a consistent snapshot: a concurrent `replace_all`
//! is either fully visible or not visible at all.

pub mod duck;
pub mod memory;

pub use duck::Repository;
pub use memory::MemoryStore;

use crate::models::{CaseFilter, CaseRecord, Classification};
use anyhow::Result;
use chrono::NaiveDate;

// ── Fields & values ───────────────────────────────────────────────────────────

/// Filterable columns of the `cases` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Classification,
    Province,
    Icu,
    Respirator,
    Deceased,
    DiagnosisDate,
    DeathDate,
    LastUpdated,
}

impl Field {
    pub fn column(self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Province => "province_name",
            Self::Icu => "icu",
            Self::Respirator => "respirator",
            Self::Deceased => "is_deceased",
            Self::DiagnosisDate => "diagnosis_date",
            Self::DeathDate => "death_date",
            Self::LastUpdated => "last_updated",
        }
    }

    pub fn value_of(self, r: &CaseRecord) -> Option<FieldValue> {
        match self {
            Self::Classification => Some(r.classification.into()),
            Self::Province => Some(FieldValue::Text(r.province_name.clone())),
            Self::Icu => Some(FieldValue::Flag(r.icu)),
            Self::Respirator => Some(FieldValue::Flag(r.respirator)),
            Self::Deceased => Some(FieldValue::Flag(r.is_deceased)),
            Self::DiagnosisDate => r.diagnosis_date.map(FieldValue::Date),
            Self::DeathDate => r.death_date.map(FieldValue::Date),
            Self::LastUpdated => r.last_updated.map(FieldValue::Date),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl From<Classification> for FieldValue {
    fn from(c: Classification) -> Self {
        Self::Text(c.as_str().to_string())
    }
}

// ── Query ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ge,
    Le,
}

impl Op {
    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: Field,
    pub op: Op,
    pub value: FieldValue,
}

impl Predicate {
    /// A missing value never matches, as with SQL NULL comparisons.
    pub fn matches(&self, record: &CaseRecord) -> bool {
        let Some(actual) = self.field.value_of(record) else {
            return false;
        };
        if std::mem::discriminant(&actual) != std::mem::discriminant(&self.value) {
            return false;
        }
        match self.op {
            Op::Eq => actual == self.value,
            Op::Ge => actual >= self.value,
            Op::Le => actual <= self.value,
        }
    }
}

/// Conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub predicates: Vec<Predicate>,
}

impl Query {
    pub fn matches(&self, record: &CaseRecord) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }
}

// ── Store trait ───────────────────────────────────────────────────────────────

pub trait RecordStore: Send + Sync {
    /// Records matching `query`, in event id order.
    fn fetch(&self, query: &Query) -> Result<Vec<CaseRecord>>;

    fn count(&self, query: &Query) -> Result<u64>;

    /// Maximum of `field` over the whole, unfiltered table.
    fn max_value(&self, field: Field) -> Result<Option<FieldValue>>;

    /// Swap the table contents for `records` in one step.
    fn replace_all(&self, records: &[CaseRecord]) -> Result<usize>;
}

// ── Record set handle ─────────────────────────────────────────────────────────

/// Lazily filtered view over a store. Predicates accumulate until
/// `count` or `records` runs the query.
pub struct RecordSet<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    query: Query,
}

impl<'a, S: RecordStore + ?Sized> RecordSet<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store, query: Query::default() }
    }

    fn push(mut self, field: Field, op: Op, value: impl Into<FieldValue>) -> Self {
        self.query.predicates.push(Predicate { field, op, value: value.into() });
        self
    }

    pub fn filter_eq(self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.push(field, Op::Eq, value)
    }

    pub fn filter_ge(self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.push(field, Op::Ge, value)
    }

    pub fn filter_le(self, field: Field, value: impl Into<FieldValue>) -> Self {
        self.push(field, Op::Le, value)
    }

    /// Apply a request filter descriptor. Date bounds go on the death date
    /// when filtering for deceased cases, on the diagnosis date otherwise.
    pub fn with_filter(self, filter: &CaseFilter) -> Self {
        let mut set = self;
        if let Some(c) = filter.classification {
            set = set.filter_eq(Field::Classification, c);
        }
        if let Some(v) = filter.icu {
            set = set.filter_eq(Field::Icu, v);
        }
        if let Some(v) = filter.respirator {
            set = set.filter_eq(Field::Respirator, v);
        }
        if let Some(v) = filter.deceased {
            set = set.filter_eq(Field::Deceased, v);
        }

        let date_field = if filter.dates_on_death() { Field::DeathDate } else { Field::DiagnosisDate };
        if let Some(from) = filter.date_from {
            set = set.filter_ge(date_field, from);
        }
        if let Some(to) = filter.date_to {
            set = set.filter_le(date_field, to);
        }
        set
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn count(&self) -> Result<u64> {
        self.store.count(&self.query)
    }

    pub fn records(&self) -> Result<Vec<CaseRecord>> {
        self.store.fetch(&self.query)
    }
}
