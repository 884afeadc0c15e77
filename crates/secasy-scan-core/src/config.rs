use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

/// One point of the (rounds, prime index, number of bits) parameter space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Configuration {
    pub rounds: i64,
    pub prime_index: i64,
    pub number_of_bits: i64,
}

impl Configuration {
    /// File-name stem used for evidence artifacts, e.g. `r50_pi100_nb256`.
    pub fn artifact_stem(&self) -> String {
        format!(
            "r{}_pi{}_nb{}",
            self.rounds, self.prime_index, self.number_of_bits
        )
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r={:4} pi={:4} nb={:4}",
            self.rounds, self.prime_index, self.number_of_bits
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {axis} entry {value:?} (expected a comma-separated list of integers)")]
pub struct AxisParseError {
    pub axis: &'static str,
    pub value: String,
}

/// The three ordered sweep axes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Axes {
    pub rounds: Vec<i64>,
    pub prime_index: Vec<i64>,
    pub number_of_bits: Vec<i64>,
}

impl Axes {
    pub fn new(rounds: Vec<i64>, prime_index: Vec<i64>, number_of_bits: Vec<i64>) -> Self {
        Axes {
            rounds,
            prime_index,
            number_of_bits,
        }
    }

    /// Parse the three axes from their comma-separated list forms.
    pub fn parse(rounds: &str, prime_index: &str, number_of_bits: &str) -> Result<Self, AxisParseError> {
        Ok(Axes {
            rounds: parse_axis_list("rounds", rounds)?,
            prime_index: parse_axis_list("prime index", prime_index)?,
            number_of_bits: parse_axis_list("number of bits", number_of_bits)?,
        })
    }

    /// Number of configurations in the product.
    pub fn len(&self) -> usize {
        self.rounds.len() * self.prime_index.len() * self.number_of_bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian product in sweep order: rounds outermost, number of bits innermost.
    pub fn configurations(&self) -> impl Iterator<Item = Configuration> + '_ {
        self.rounds.iter().flat_map(move |&rounds| {
            self.prime_index.iter().flat_map(move |&prime_index| {
                self.number_of_bits
                    .iter()
                    .map(move |&number_of_bits| Configuration {
                        rounds,
                        prime_index,
                        number_of_bits,
                    })
            })
        })
    }
}

/// Parse `"50, 100,,200"` into `[50, 100, 200]`. Blank entries are skipped.
pub fn parse_axis_list(axis: &'static str, raw: &str) -> Result<Vec<i64>, AxisParseError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| AxisParseError {
                axis,
                value: s.to_string(),
            })
        })
        .collect()
}

/// How confirmation re-runs of the extended-security harness execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmMode {
    /// Keep the harness's fast mode enabled.
    #[default]
    Fast,
    /// Run the full suite.
    Full,
}

impl ConfirmMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfirmMode::Fast => "fast",
            ConfirmMode::Full => "full",
        }
    }

    pub fn is_fast(self) -> bool {
        matches!(self, ConfirmMode::Fast)
    }
}

impl fmt::Display for ConfirmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid confirm mode {value:?} (expected one of: fast, full)")]
pub struct ConfirmModeParseError {
    value: String,
}

impl FromStr for ConfirmMode {
    type Err = ConfirmModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "fast" => Ok(ConfirmMode::Fast),
            "full" => Ok(ConfirmMode::Full),
            _ => Err(ConfirmModeParseError { value: s }),
        }
    }
}

#[cfg(feature = "clap")]
impl clap::ValueEnum for ConfirmMode {
    fn value_variants<'a>() -> &'a [Self] {
        const ALL: [ConfirmMode; 2] = [ConfirmMode::Fast, ConfirmMode::Full];
        &ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            ConfirmMode::Fast => Some(
                clap::builder::PossibleValue::new("fast")
                    .help("keep the harness fast mode enabled for re-runs"),
            ),
            ConfirmMode::Full => Some(
                clap::builder::PossibleValue::new("full").help("run the full suite for re-runs"),
            ),
        }
    }
}

/// Tunables of one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanConfig {
    /// Per-process wall-clock limit.
    #[serde(serialize_with = "serialize_secs")]
    pub timeout: Duration,
    /// Extended-security trials of the initial run.
    pub trials: u32,
    /// Extended-security trials of each confirmation re-run.
    pub confirm_trials: u32,
    pub confirm_retries: u32,
    pub confirm_mode: ConfirmMode,
    /// Flag every extended failure immediately, without re-runs.
    pub no_confirm: bool,
    /// Maximum number of configurations that may enter the re-run path (0 = unlimited).
    pub max_confirm_configs: usize,
    pub seed: i64,
}

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TRIALS: u32 = 200;
pub const DEFAULT_CONFIRM_TRIALS: u32 = 500;
pub const DEFAULT_CONFIRM_RETRIES: u32 = 2;
pub const DEFAULT_MAX_CONFIRM_CONFIGS: usize = 3;
pub const DEFAULT_SEED: i64 = 42;

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            trials: DEFAULT_TRIALS,
            confirm_trials: DEFAULT_CONFIRM_TRIALS,
            confirm_retries: DEFAULT_CONFIRM_RETRIES,
            confirm_mode: ConfirmMode::Fast,
            no_confirm: false,
            max_confirm_configs: DEFAULT_MAX_CONFIRM_CONFIGS,
            seed: DEFAULT_SEED,
        }
    }
}

impl ScanConfig {
    /// Human-readable problems that do not prevent a sweep.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.no_confirm && self.confirm_trials <= self.trials {
            out.push(format!(
                "confirm trials ({}) not above initial trials ({}); re-runs gain no statistical power",
                self.confirm_trials, self.trials
            ));
        }
        if self.timeout.is_zero() {
            out.push("timeout is zero; every harness run will time out".to_string());
        }
        out
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
