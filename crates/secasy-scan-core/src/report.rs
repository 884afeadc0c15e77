//! On-disk report of a sweep.
//!
//! Layout of one report directory:
//! - `scan.json`: tunables and axes of the sweep
//! - `summary.tsv`: one row per evaluated configuration
//! - `{stem}.diff.txt`, `{stem}.ext.txt`, `{stem}.ext.confirm.seed{S}.txt`:
//!   raw harness output, for flagged configurations only

use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::config::{Axes, ScanConfig};
use crate::sweep::Evaluation;
use crate::verdict::ConfigurationVerdict;

pub const SUMMARY_FILE: &str = "summary.tsv";
pub const SCAN_FILE: &str = "scan.json";
pub const SUMMARY_HEADER: &str = "rounds\tprimeIndex\tnumberOfBits\tflags\tproducedBits\tdiff_ok\text_ok\text_maxCorr\text_highCorrRate\n";

pub const SCAN_SCHEMA_VERSION: &str = "secasy-scan.scan@0.1.0";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("create report directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialize scan metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Accumulates summary rows and writes evidence files as the sweep goes.
#[derive(Debug)]
pub struct ReportSink {
    dir: PathBuf,
    rows: Vec<String>,
}

impl ReportSink {
    /// Create `<base>/<YYYYmmdd_HHMMSS>/`.
    pub fn create(base: &Path) -> Result<Self, ReportError> {
        Self::create_in(base.join(timestamp_dir_name(now())))
    }

    /// Use `dir` as the report directory, creating it if needed.
    pub fn create_in(dir: PathBuf) -> Result<Self, ReportError> {
        std::fs::create_dir_all(&dir).map_err(|source| ReportError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(ReportSink {
            dir,
            rows: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of summary rows recorded so far.
    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn write_scan_metadata(&self, config: &ScanConfig, axes: &Axes) -> Result<PathBuf, ReportError> {
        let doc = serde_json::json!({
            "schema_version": SCAN_SCHEMA_VERSION,
            "config": config,
            "axes": axes,
            "configurations": axes.len(),
        });
        let mut bytes = serde_json::to_vec_pretty(&doc)?;
        bytes.push(b'\n');
        let path = self.dir.join(SCAN_FILE);
        write_bytes(&path, &bytes)?;
        Ok(path)
    }

    /// Record the summary row of `evaluation`, then write its raw outputs if it
    /// was flagged. Every evidence file is attempted; the first failure is
    /// returned after the rest have been written. The row is kept regardless.
    pub fn record(&mut self, evaluation: &Evaluation) -> Result<(), ReportError> {
        self.rows.push(summary_row(&evaluation.verdict));
        if !evaluation.verdict.is_flagged() {
            return Ok(());
        }

        let stem = safe_name(&evaluation.verdict.configuration.artifact_stem());
        let mut evidence: Vec<(String, &str)> = vec![
            (format!("{stem}.diff.txt"), evaluation.differential_raw.as_str()),
            (format!("{stem}.ext.txt"), evaluation.extended_raw.as_str()),
        ];
        for attempt in evaluation.confirmations() {
            evidence.push((
                format!("{stem}.ext.confirm.seed{}.txt", attempt.seed),
                attempt.raw.as_str(),
            ));
        }

        let mut first_err = None;
        for (name, content) in evidence {
            if let Err(err) = write_text(&self.dir.join(name), content) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Write `summary.tsv` with every row recorded so far.
    pub fn finish(&self) -> Result<PathBuf, ReportError> {
        let mut text = String::from(SUMMARY_HEADER);
        for row in &self.rows {
            text.push_str(row);
        }
        let path = self.dir.join(SUMMARY_FILE);
        write_text(&path, &text)?;
        Ok(path)
    }
}

/// One tab-separated summary line, newline included.
pub fn summary_row(verdict: &ConfigurationVerdict) -> String {
    let c = &verdict.configuration;
    let cells = [
        c.rounds.to_string(),
        c.prime_index.to_string(),
        c.number_of_bits.to_string(),
        verdict.flags.to_string(),
        verdict
            .produced_bits
            .map(|b| b.to_string())
            .unwrap_or_default(),
        bool_cell(verdict.diff_ok).to_string(),
        bool_cell(verdict.ext_ok).to_string(),
        float_cell(verdict.max_correlation),
        float_cell(verdict.high_correlation_rate_percent),
    ];
    let mut line = cells.join("\t");
    line.push('\n');
    line
}

fn bool_cell(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

fn float_cell(v: Option<f64>) -> String {
    v.map(float_text).unwrap_or_default()
}

/// Shortest round-trip text of `f`, with a signed exponent of at least two
/// digits when one is needed: `3.0`, `0.0001`, `1e-05`, `1.5e+16`.
fn float_text(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    // `{:?}` keeps a trailing `.0` on whole numbers and switches to exponent
    // form outside [1e-4, 1e16).
    let text = format!("{f:?}");
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^a-zA-Z0-9_.-]+").expect("static file-name pattern compiles")
});

/// Replace runs of characters outside `[a-zA-Z0-9_.-]` with `_` and strip
/// leading/trailing underscores.
pub fn safe_name(s: &str) -> String {
    UNSAFE_NAME_CHARS
        .replace_all(s, "_")
        .trim_matches('_')
        .to_string()
}

/// Write `content`, creating parent directories as needed.
pub fn write_text(path: &Path, content: &str) -> Result<(), ReportError> {
    write_bytes(path, content.as_bytes())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ReportError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, bytes).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

pub fn timestamp_dir_name(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))
    .unwrap_or_else(|_| at.unix_timestamp().to_string())
}
