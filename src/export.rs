//! CSV export
//!
//! One file per resource type, with the header taken from the declared column
//! list in the resource registry. Files are written even when empty so every
//! run produces the same set of outputs.

use crate::resource::{domain_resources, Assessment, Domain, Record};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const LINE_END: &str = "\r\n";

/// Quote a field when it contains a delimiter, quote, CR or LF
pub fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_line<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut line = fields
        .into_iter()
        .map(csv_escape)
        .collect::<Vec<_>>()
        .join(",");
    line.push_str(LINE_END);
    line
}

/// Render records as CSV text: header, then one row per record
pub fn render_csv(records: &[Record], columns: &[String]) -> String {
    let mut csv = csv_line(columns.iter().map(String::as_str));
    for record in records {
        csv.push_str(&csv_line(record.row(columns)));
    }
    csv
}

/// Write records to `path`; the header is written even for zero records
pub fn write_csv(records: &[Record], path: &Path, columns: &[String]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(render_csv(records, columns).as_bytes())
        .and_then(|_| writer.flush())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// `<prefix>_<suffix>_<YYYYMMDD_HHMMSS>.csv`
pub fn output_filename(prefix: &str, suffix: &str, timestamp: &DateTime<Utc>) -> String {
    format!("{}_{}_{}.csv", prefix, suffix, timestamp.format("%Y%m%d_%H%M%S"))
}

/// Where one domain's CSV files go
#[derive(Debug, Clone)]
pub struct ExportTarget {
    pub directory: PathBuf,
    pub prefix: String,
    /// Explicit paths per resource key, used instead of the generated name
    pub overrides: Vec<(String, PathBuf)>,
}

impl ExportTarget {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            directory: PathBuf::from("."),
            prefix: prefix.into(),
            overrides: Vec::new(),
        }
    }

    pub fn in_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_override(mut self, key: &str, path: impl Into<PathBuf>) -> Self {
        self.overrides.push((key.to_string(), path.into()));
        self
    }

    fn path_for(&self, key: &str, suffix: &str, timestamp: &DateTime<Utc>) -> PathBuf {
        self.overrides
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, path)| path.clone())
            .unwrap_or_else(|| {
                self.directory
                    .join(output_filename(&self.prefix, suffix, timestamp))
            })
    }
}

/// Write every resource type of `domain`, in registry order. Returns the paths written.
pub fn export_assessment(
    domain: Domain,
    assessment: &Assessment,
    target: &ExportTarget,
    timestamp: &DateTime<Utc>,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (key, def) in domain_resources(domain) {
        let path = target.path_for(key, &def.file_suffix, timestamp);
        let records = assessment.records(key);
        write_csv(records, &path, &def.columns)?;
        tracing::info!(
            "Exported {} {} to {}",
            records.len(),
            def.display_name,
            path.display()
        );
        written.push(path);
    }
    Ok(written)
}
