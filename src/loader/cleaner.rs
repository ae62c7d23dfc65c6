use crate::models::{CaseRecord, Classification, RawCaseRow};
use chrono::NaiveDate;
use tracing::warn;

// ── Parsers ───────────────────────────────────────────────────────────────────

fn is_blank(s: &str) -> bool {
    matches!(s, "" | "NA" | "N/A" | "-" | "NULL" | "null")
}

/// Trimmed string, `None` for blanks and placeholders.
pub fn non_empty(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if is_blank(s) { None } else { Some(s.to_string()) }
}

/// "SI" → true | "NO" → false. Anything else is unknown.
pub fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_uppercase().as_str() {
        "SI" | "SÍ" | "S" | "TRUE" | "1" => Some(true),
        "NO" | "N" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

/// Parse dates: ISO (current SISA exports) or dd/mm/yyyy (older exports).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if is_blank(s) {
        return None;
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%d/%m/%Y") {
        return Some(d);
    }
    // Timestamps occasionally leak into date columns.
    if let Some((date, _time)) = s.split_once(' ') {
        return NaiveDate::parse_from_str(date, "%Y-%m-%d").ok();
    }

    None
}

pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    if is_blank(s) {
        return None;
    }
    s.parse().ok()
}

// ── Raw CSV → CaseRecord ──────────────────────────────────────────────────────

/// Clean one raw row. Rows without an event id, a province or a known
/// classification are dropped; unparseable optional fields become `None`.
pub fn raw_row_to_record(row: &RawCaseRow) -> Option<CaseRecord> {
    let event_id = row.event_id.as_deref().and_then(parse_int)?;
    let province_name = non_empty(row.province_name.as_deref())?;

    let label = row.classification.as_deref().unwrap_or_default();
    let Some(classification) = Classification::from_source_label(label) else {
        warn!("Unknown classification {:?} for case {}", label, event_id);
        return None;
    };

    let flag = |v: &Option<String>| v.as_deref().and_then(parse_flag).unwrap_or(false);
    let date = |v: &Option<String>| v.as_deref().and_then(parse_date);

    Some(CaseRecord {
        event_id,
        sex: non_empty(row.sex.as_deref()),
        age: row
            .age
            .as_deref()
            .and_then(parse_int)
            .and_then(|a| i32::try_from(a).ok()),
        province_name,
        classification,
        diagnosis_date: date(&row.diagnosis_date),
        is_deceased: flag(&row.deceased),
        death_date: date(&row.death_date),
        icu: flag(&row.icu),
        respirator: flag(&row.respirator),
        last_updated: date(&row.last_updated),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("SI"), Some(true));
        assert_eq!(parse_flag(" no "), Some(false));
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag("quizás"), None);
    }

    #[test]
    fn test_parse_date() {
        let d = NaiveDate::from_ymd_opt(2020, 7, 14);
        assert_eq!(parse_date("2020-07-14"), d);
        assert_eq!(parse_date("14/07/2020"), d);
        assert_eq!(parse_date("2020-07-14 00:00:00"), d);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("NA"), None);
    }

    #[test]
    fn test_raw_row_to_record() {
        let row = RawCaseRow {
            event_id: Some("1000123".into()),
            sex: Some("M".into()),
            age: Some("54".into()),
            province_name: Some(" Tucumán ".into()),
            icu: Some("NO".into()),
            deceased: Some("SI".into()),
            death_date: Some("2020-08-02".into()),
            respirator: Some("SI".into()),
            classification: Some("Confirmado".into()),
            diagnosis_date: Some("2020-07-25".into()),
            last_updated: Some("2020-09-01".into()),
        };
        let r = raw_row_to_record(&row).unwrap();
        assert_eq!(r.event_id, 1_000_123);
        assert_eq!(r.province_name, "Tucumán");
        assert_eq!(r.classification, Classification::Confirmed);
        assert!(r.is_deceased && r.respirator && !r.icu);
        assert_eq!(r.death_date, NaiveDate::from_ymd_opt(2020, 8, 2));
        assert_eq!(r.age, Some(54));
    }

    #[test]
    fn test_raw_row_rejects() {
        let base = RawCaseRow {
            event_id: Some("1".into()),
            province_name: Some("Salta".into()),
            classification: Some("Sospechoso".into()),
            ..Default::default()
        };
        assert!(raw_row_to_record(&base).is_some());

        let no_id = RawCaseRow { event_id: Some("".into()), ..base.clone() };
        assert!(raw_row_to_record(&no_id).is_none());

        let bad_class = RawCaseRow { classification: Some("Otro".into()), ..base.clone() };
        assert!(raw_row_to_record(&bad_class).is_none());

        let no_province = RawCaseRow { province_name: None, ..base };
        assert!(raw_row_to_record(&no_province).is_none());
    }
}
