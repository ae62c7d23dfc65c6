use super::{Field, FieldValue, Query, RecordStore};
use crate::models::{CaseRecord, Classification};
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use duckdb::types::{ToSqlOutput, Type};
use duckdb::{params, params_from_iter, Connection, Row, ToSql};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS refresh_run_ids START 1;

CREATE TABLE IF NOT EXISTS cases (
    event_id        BIGINT   NOT NULL,
    sex             VARCHAR,
    age             INTEGER,
    province_name   VARCHAR  NOT NULL,
    -- confirmed | rejected | suspect
    classification  VARCHAR  NOT NULL,
    diagnosis_date  DATE,
    is_deceased     BOOLEAN  NOT NULL DEFAULT FALSE,
    death_date      DATE,
    icu             BOOLEAN  NOT NULL DEFAULT FALSE,
    respirator      BOOLEAN  NOT NULL DEFAULT FALSE,
    last_updated    DATE
);

CREATE TABLE IF NOT EXISTS refresh_runs (
    id           INTEGER PRIMARY KEY DEFAULT nextval('refresh_run_ids'),
    source       VARCHAR NOT NULL,
    started_at   TIMESTAMP NOT NULL,
    finished_at  TIMESTAMP,
    status       VARCHAR NOT NULL DEFAULT 'running',
    rows_loaded  BIGINT DEFAULT 0,
    error_msg    VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_cases_diagnosis ON cases (diagnosis_date);
CREATE INDEX IF NOT EXISTS idx_cases_province  ON cases (province_name);
"#;

const SELECT_COLUMNS: &str = "event_id, sex, age, province_name, classification, \
     diagnosis_date, is_deceased, death_date, icu, respirator, last_updated";

impl ToSql for FieldValue {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        match self {
            FieldValue::Text(s) => s.to_sql(),
            FieldValue::Flag(b) => b.to_sql(),
            FieldValue::Date(d) => d.to_sql(),
        }
    }
}

fn where_clause(query: &Query) -> (String, Vec<FieldValue>) {
    if query.predicates.is_empty() {
        return (String::new(), Vec::new());
    }
    let conds: Vec<String> = query
        .predicates
        .iter()
        .map(|p| format!("{} {} ?", p.field.column(), p.op.sql()))
        .collect();
    let values = query.predicates.iter().map(|p| p.value.clone()).collect();
    (format!(" WHERE {}", conds.join(" AND ")), values)
}

fn read_record(row: &Row<'_>) -> duckdb::Result<CaseRecord> {
    let label: String = row.get(4)?;
    let classification = Classification::from_source_label(&label).ok_or_else(|| {
        duckdb::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown classification {label:?}").into(),
        )
    })?;

    Ok(CaseRecord {
        event_id: row.get(0)?,
        sex: row.get(1)?,
        age: row.get(2)?,
        province_name: row.get(3)?,
        classification,
        diagnosis_date: row.get(5)?,
        is_deceased: row.get(6)?,
        death_date: row.get(7)?,
        icu: row.get(8)?,
        respirator: row.get(9)?,
        last_updated: row.get(10)?,
    })
}

// ── Refresh run log ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshRun {
    pub id: i64,
    pub source: String,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub status: String,
    pub rows_loaded: i64,
    pub error_msg: Option<String>,
}

// ── Repository ────────────────────────────────────────────────────────────────

/// DuckDB-backed record store. The connection sits behind a mutex so the
/// repository can be shared between tasks.
pub struct Repository {
    conn: Mutex<Connection>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Mutex::new(Connection::open_in_memory()?) })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("DuckDB connection mutex poisoned"))
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.lock()?;
        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute_batch(INDEXES).context("Index creation failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    pub fn case_count(&self) -> Result<u64> {
        self.count(&Query::default())
    }

    pub fn diagnosis_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let conn = self.lock()?;
        let mut s = conn.prepare("SELECT MIN(diagnosis_date), MAX(diagnosis_date) FROM cases")?;
        Ok(s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?)
    }

    // ── Refresh run log ───────────────────────────────────────────────────────

    pub fn begin_refresh_run(&self, source: &str) -> Result<i64> {
        let conn = self.lock()?;
        let id: i64 = conn.query_row(
            "INSERT INTO refresh_runs (source, started_at, status) VALUES (?, ?, 'running') RETURNING id",
            params![source, Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_refresh_run(&self, run_id: i64, rows: usize, error: Option<&str>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"UPDATE refresh_runs SET
               finished_at = ?, status = ?, rows_loaded = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                rows as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn last_refresh_run(&self) -> Result<Option<RefreshRun>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, source, started_at, finished_at, status, rows_loaded, error_msg
               FROM refresh_runs ORDER BY id DESC LIMIT 1"#,
        )?;
        let mut rows = stmt.query_map([], |r| {
            Ok(RefreshRun {
                id: r.get(0)?,
                source: r.get(1)?,
                started_at: r.get(2)?,
                finished_at: r.get(3)?,
                status: r.get(4)?,
                rows_loaded: r.get::<_, Option<i64>>(5)?.unwrap_or(0),
                error_msg: r.get(6)?,
            })
        })?;
        let run = rows.next().transpose()?;
        Ok(run)
    }
}

impl RecordStore for Repository {
    fn fetch(&self, query: &Query) -> Result<Vec<CaseRecord>> {
        let (clause, values) = where_clause(query);
        let sql = format!("SELECT {SELECT_COLUMNS} FROM cases{clause} ORDER BY event_id");
        debug!("{}", sql);

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values), read_record)?
            .collect::<duckdb::Result<Vec<_>>>()
            .context("Failed to read case rows")?;
        Ok(records)
    }

    fn count(&self, query: &Query) -> Result<u64> {
        let (clause, values) = where_clause(query);
        let sql = format!("SELECT COUNT(*) FROM cases{clause}");
        debug!("{}", sql);

        let conn = self.lock()?;
        let n: i64 = conn.query_row(&sql, params_from_iter(values), |r| r.get(0))?;
        Ok(n as u64)
    }

    fn max_value(&self, field: Field) -> Result<Option<FieldValue>> {
        let sql = format!("SELECT MAX({}) FROM cases", field.column());
        let conn = self.lock()?;

        let value = match field {
            Field::Classification | Field::Province => conn
                .query_row(&sql, [], |r| r.get::<_, Option<String>>(0))?
                .map(FieldValue::Text),
            Field::Icu | Field::Respirator | Field::Deceased => conn
                .query_row(&sql, [], |r| r.get::<_, Option<bool>>(0))?
                .map(FieldValue::Flag),
            Field::DiagnosisDate | Field::DeathDate | Field::LastUpdated => conn
                .query_row(&sql, [], |r| r.get::<_, Option<NaiveDate>>(0))?
                .map(FieldValue::Date),
        };
        Ok(value)
    }

    /// Delete-then-bulk-insert inside one transaction, so readers see either
    /// the previous table or the new one.
    fn replace_all(&self, records: &[CaseRecord]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cases", [])?;
        {
            let mut app = tx.appender("cases")?;
            for r in records {
                app.append_row(params![
                    r.event_id,
                    r.sex,
                    r.age,
                    r.province_name,
                    r.classification.as_str(),
                    r.diagnosis_date,
                    r.is_deceased,
                    r.death_date,
                    r.icu,
                    r.respirator,
                    r.last_updated,
                ])
                .with_context(|| format!("append case {}", r.event_id))?;
            }
            app.flush()?;
        }
        tx.commit()?;
        info!("Replaced cases table with {} rows", records.len());
        Ok(records.len())
    }
}
