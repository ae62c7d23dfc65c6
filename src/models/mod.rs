use crate::error::{CoreError, CoreResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Case records ──────────────────────────────────────────────────────────────

/// Case status as published in `clasificacion_resumen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Confirmed,
    Rejected,
    Suspect,
}

impl Classification {
    /// Label used by the Ministry of Health dataset.
    pub fn source_label(self) -> &'static str {
        match self {
            Self::Confirmed => "Confirmado",
            Self::Rejected => "Descartado",
            Self::Suspect => "Sospechoso",
        }
    }

    pub fn from_source_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "confirmado" | "confirmed" => Some(Self::Confirmed),
            "descartado" | "rejected" => Some(Self::Rejected),
            "sospechoso" | "suspect" => Some(Self::Suspect),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::Suspect => "suspect",
        }
    }
}

/// One reported case, cleaned from the raw CSV.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseRecord {
    pub event_id: i64,
    pub sex: Option<String>,
    pub age: Option<i32>,
    pub province_name: String,
    pub classification: Classification,
    pub diagnosis_date: Option<NaiveDate>,
    pub is_deceased: bool,
    pub death_date: Option<NaiveDate>,
    pub icu: bool,
    pub respirator: bool,
    pub last_updated: Option<NaiveDate>,
}

impl CaseRecord {
    /// Date of the death event, if this record contributes one.
    ///
    /// A deceased flag without a date, or a date without the flag, yields none.
    pub fn death_event(&self) -> Option<NaiveDate> {
        if self.is_deceased { self.death_date } else { None }
    }
}

// ── Raw CSV rows ──────────────────────────────────────────────────────────────

/// Covid19Casos.csv as published by SISA. Only the columns we keep are
/// listed; the rest of the header is ignored on deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCaseRow {
    #[serde(rename = "id_evento_caso")]
    pub event_id: Option<String>,
    #[serde(rename = "sexo")]
    pub sex: Option<String>,
    #[serde(rename = "edad")]
    pub age: Option<String>,
    #[serde(rename = "carga_provincia_nombre")]
    pub province_name: Option<String>,
    #[serde(rename = "cuidado_intensivo")]
    pub icu: Option<String>,
    #[serde(rename = "fallecido")]
    pub deceased: Option<String>,
    #[serde(rename = "fecha_fallecimiento")]
    pub death_date: Option<String>,
    #[serde(rename = "asistencia_respiratoria_mecanica")]
    pub respirator: Option<String>,
    #[serde(rename = "clasificacion_resumen")]
    pub classification: Option<String>,
    #[serde(rename = "fecha_diagnostico")]
    pub diagnosis_date: Option<String>,
    #[serde(rename = "ultima_actualizacion")]
    pub last_updated: Option<String>,
}

// ── Time series ───────────────────────────────────────────────────────────────

/// One calendar day of an aggregated series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeSeriesRow {
    pub date: NaiveDate,
    pub cases: u64,
    pub deaths: u64,
    pub cases_cumulative: u64,
    pub deaths_cumulative: u64,
}

/// A [`TimeSeriesRow`] with per-capita rates attached.
///
/// Kept flat so the CSV writer can serialize it directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NormalizedRow {
    pub date: NaiveDate,
    pub cases: u64,
    pub deaths: u64,
    pub cases_cumulative: u64,
    pub deaths_cumulative: u64,
    pub cases_per_100k: f64,
    pub deaths_per_100k: f64,
    pub cases_cum_per_100k: f64,
    pub deaths_cum_per_100k: f64,
    pub cases_per_million: f64,
    pub deaths_per_million: f64,
    pub cases_cum_per_million: f64,
    pub deaths_cum_per_million: f64,
}

// ── Provinces ─────────────────────────────────────────────────────────────────

/// Static reference entry for a jurisdiction.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Province {
    /// INDEC two-digit code.
    pub slug: &'static str,
    pub name: &'static str,
    pub population: u64,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Headline figures for a province or for the whole country.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProvinceStats {
    pub name: String,
    pub population: u64,
    pub cases: u64,
    pub deaths: u64,
    pub cases_per_million: f64,
    pub cases_per_100k: f64,
    pub deaths_per_million: f64,
    pub deaths_per_100k: f64,
    pub lethality: f64,
}

// ── Filter descriptor ─────────────────────────────────────────────────────────

/// Optional request filters. `None` means "do not filter on this field".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseFilter {
    pub classification: Option<Classification>,
    pub icu: Option<bool>,
    pub respirator: Option<bool>,
    pub deceased: Option<bool>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl CaseFilter {
    pub fn confirmed() -> Self {
        Self {
            classification: Some(Classification::Confirmed),
            ..Default::default()
        }
    }

    /// Whether the date bounds apply to the death date instead of the
    /// diagnosis date.
    pub fn dates_on_death(&self) -> bool {
        self.deceased == Some(true)
    }
}

/// Parse a `YYYY-MM-DD` request parameter.
pub fn parse_query_date(s: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::InvalidDateRange(s.to_string()))
}
