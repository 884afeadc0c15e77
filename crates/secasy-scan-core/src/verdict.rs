use std::fmt;

use serde::{Serialize, Serializer};

use crate::config::Configuration;
use crate::parse::{DifferentialOutcome, ExtendedOutcome};

/// Why an extended-security failure was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtFlag {
    /// The harness produced a zero-length hash.
    Empty,
    /// The initial run hit its time limit.
    Timeout,
    /// Confirmation was disabled.
    NoConfirm,
    /// The confirmation budget was already spent.
    Unconfirmed,
    /// Every confirmation re-run failed as well.
    Confirm,
}

impl ExtFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            ExtFlag::Empty => "EXT(empty)",
            ExtFlag::Timeout => "EXT(timeout)",
            ExtFlag::NoConfirm => "EXT(no-confirm)",
            ExtFlag::Unconfirmed => "EXT(unconfirmed)",
            ExtFlag::Confirm => "EXT(confirm)",
        }
    }
}

impl fmt::Display for ExtFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reported tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagTag {
    Diff,
    Ext(ExtFlag),
}

impl FlagTag {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagTag::Diff => "DIFF",
            FlagTag::Ext(ext) => ext.as_str(),
        }
    }
}

impl fmt::Display for FlagTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FlagTag {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

/// Flag set of a verdict. Holds at most one EXT tag by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags {
    pub diff: bool,
    pub ext: Option<ExtFlag>,
}

impl Flags {
    pub fn is_empty(&self) -> bool {
        !self.diff && self.ext.is_none()
    }

    /// Tags in report order: DIFF first.
    pub fn tags(&self) -> Vec<FlagTag> {
        let mut out = Vec::with_capacity(2);
        if self.diff {
            out.push(FlagTag::Diff);
        }
        if let Some(ext) = self.ext {
            out.push(FlagTag::Ext(ext));
        }
        out
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for tag in self.tags() {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            f.write_str(tag.as_str())?;
        }
        Ok(())
    }
}

impl Serialize for Flags {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(self.tags())
    }
}

/// Final classification of one configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationVerdict {
    #[serde(flatten)]
    pub configuration: Configuration,
    pub flags: Flags,
    pub produced_bits: Option<u64>,
    pub diff_ok: bool,
    pub ext_ok: bool,
    pub max_correlation: Option<f64>,
    pub high_correlation_rate_percent: Option<f64>,
}

impl ConfigurationVerdict {
    /// `extended` is the outcome used downstream: the passing re-run for a
    /// flaky failure, otherwise the initial run.
    pub fn new(
        configuration: Configuration,
        flags: Flags,
        differential: DifferentialOutcome,
        extended: ExtendedOutcome,
    ) -> Self {
        ConfigurationVerdict {
            configuration,
            flags,
            produced_bits: extended.produced_bits,
            diff_ok: differential.ok,
            ext_ok: extended.ok,
            max_correlation: extended.max_correlation,
            high_correlation_rate_percent: extended.high_correlation_rate_percent,
        }
    }

    pub fn is_flagged(&self) -> bool {
        !self.flags.is_empty()
    }
}
