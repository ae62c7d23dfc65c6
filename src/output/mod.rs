use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

/// Serialize `rows` as a JSON array or as CSV with a header line.
pub fn write_rows<T: Serialize, W: Write>(rows: &[T], format: OutputFormat, mut out: W) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, rows).context("JSON serialization failed")?;
            writeln!(out)?;
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            for row in rows {
                writer.serialize(row).context("CSV serialization failed")?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

/// Serialize a single object; CSV renders it as a one-row table.
pub fn write_one<T: Serialize, W: Write>(value: &T, format: OutputFormat, mut out: W) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, value).context("JSON serialization failed")?;
            writeln!(out)?;
            Ok(())
        }
        OutputFormat::Csv => write_rows(std::slice::from_ref(value), format, out),
    }
}
