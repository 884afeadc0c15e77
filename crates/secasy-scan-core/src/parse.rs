//! Harness output scraping.
//!
//! Both parsers are total: a missing or malformed line is an absent field,
//! never an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static DIFF_STATUS: Lazy<Regex> = Lazy::new(|| compile(r"Status:\s*(.*)"));

static EXT_SUMMARY: Lazy<Regex> = Lazy::new(|| compile(r"SUMMARY:\s*(\d+)\s*/\s*(\d+)"));
static EXT_PRODUCED: Lazy<Regex> =
    Lazy::new(|| compile(r"Produced hash length:\s*(\d+) hex chars \((\d+) bits\)"));
static EXT_MAX_CORR: Lazy<Regex> = Lazy::new(|| compile(r"Max correlation:\s*([-+0-9.]+)"));
static EXT_HIGH_CORR: Lazy<Regex> =
    Lazy::new(|| compile(r"High correlation rate:\s*([0-9.]+)%"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static harness pattern compiles")
}

/// Result of one differential-harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DifferentialOutcome {
    pub ok: bool,
}

/// Result of one extended-security-harness run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ExtendedOutcome {
    pub ok: bool,
    /// Bit length of the produced hash. `Some(0)` means the hash was empty.
    pub produced_bits: Option<u64>,
    pub max_correlation: Option<f64>,
    pub high_correlation_rate_percent: Option<f64>,
}

impl ExtendedOutcome {
    pub fn is_empty_output(&self) -> bool {
        self.produced_bits == Some(0)
    }
}

/// Passes only if at least one `Status:` line exists and none mentions
/// `warning` or `fail` in any letter case.
pub fn parse_differential(text: &str) -> DifferentialOutcome {
    let mut seen = false;
    for caps in DIFF_STATUS.captures_iter(text) {
        seen = true;
        let status = caps
            .get(1)
            .map(|m| m.as_str().trim().to_lowercase())
            .unwrap_or_default();
        if status.contains("warning") || status.contains("fail") {
            return DifferentialOutcome { ok: false };
        }
    }
    DifferentialOutcome { ok: seen }
}

pub fn parse_extended(text: &str) -> ExtendedOutcome {
    // Passed and total are compared as captured text, not as numbers.
    let ok = EXT_SUMMARY
        .captures(text)
        .is_some_and(|caps| match (caps.get(1), caps.get(2)) {
            (Some(passed), Some(total)) => passed.as_str() == total.as_str(),
            _ => false,
        });

    let produced_bits = EXT_PRODUCED
        .captures(text)
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse::<u64>().ok());

    ExtendedOutcome {
        ok,
        produced_bits,
        max_correlation: first_float(&EXT_MAX_CORR, text),
        high_correlation_rate_percent: first_float(&EXT_HIGH_CORR, text),
    }
}

fn first_float(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}
