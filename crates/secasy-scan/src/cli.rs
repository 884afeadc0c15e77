use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use secasy_scan_core::config::{
    DEFAULT_CONFIRM_RETRIES, DEFAULT_CONFIRM_TRIALS, DEFAULT_MAX_CONFIRM_CONFIGS, DEFAULT_SEED,
    DEFAULT_TIMEOUT_SECS, DEFAULT_TRIALS,
};
use secasy_scan_core::{Axes, ConfirmMode, HarnessPaths, ScanConfig};

#[derive(Parser, Debug)]
#[command(name = "secasy-scan")]
#[command(
    about = "Scan reduced Secasy parameters and flag configurations that look weak.",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Repository root; harness processes run here and relative paths resolve against it.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Build directory containing the harness executables.
    #[arg(long, default_value = "build")]
    pub build: PathBuf,

    /// Differential harness executable (default: <build>/SecasyDifferential.exe).
    #[arg(long)]
    pub diff_exe: Option<PathBuf>,

    /// Extended-security harness executable (default: <build>/SecasyExtendedSecurity.exe).
    #[arg(long)]
    pub ext_exe: Option<PathBuf>,

    /// Per-process timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Extended-security trials.
    #[arg(long, default_value_t = DEFAULT_TRIALS)]
    pub trials: u32,

    /// Trials for confirming an extended-security failure.
    #[arg(long, default_value_t = DEFAULT_CONFIRM_TRIALS)]
    pub confirm_trials: u32,

    /// How many confirmation runs to attempt.
    #[arg(long, default_value_t = DEFAULT_CONFIRM_RETRIES)]
    pub confirm_retries: u32,

    /// Confirmation mode for extended failures.
    #[arg(long, value_enum, default_value_t = ConfirmMode::Fast)]
    pub confirm_mode: ConfirmMode,

    /// Do not run confirmation loops; flag any extended failure immediately.
    #[arg(long)]
    pub no_confirm: bool,

    /// Maximum number of distinct configurations to run confirmation for (0 = unlimited).
    #[arg(long, default_value_t = DEFAULT_MAX_CONFIRM_CONFIGS)]
    pub max_confirm_configs: usize,

    #[arg(long, default_value_t = DEFAULT_SEED, allow_negative_numbers = true)]
    pub seed: i64,

    /// Comma-separated round counts.
    #[arg(long, default_value = "50,100,200,500")]
    pub rounds: String,

    /// Comma-separated prime indices.
    #[arg(long, default_value = "100,200")]
    pub prime_index: String,

    /// Comma-separated hashLengthInBits parameters.
    #[arg(long, default_value = "64,128,256")]
    pub nbits: String,

    /// Write raw outputs of flagged configurations and a summary table under
    /// <root>/<report-dir>/<timestamp>/.
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Print a machine-readable JSON report on stdout; progress moves to stderr.
    #[arg(long)]
    pub json: bool,

    /// Log filter (tracing EnvFilter syntax).
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    pub fn root_dir(&self) -> Result<PathBuf> {
        std::fs::canonicalize(&self.root)
            .with_context(|| format!("resolve --root {}", self.root.display()))
    }

    pub fn harness_paths(&self, root: &Path) -> HarnessPaths {
        let defaults = HarnessPaths::in_build_dir(&root.join(&self.build));
        HarnessPaths {
            differential: self
                .diff_exe
                .as_ref()
                .map(|p| root.join(p))
                .unwrap_or(defaults.differential),
            extended: self
                .ext_exe
                .as_ref()
                .map(|p| root.join(p))
                .unwrap_or(defaults.extended),
        }
    }

    pub fn axes(&self) -> Result<Axes> {
        Axes::parse(&self.rounds, &self.prime_index, &self.nbits).context("parse sweep axes")
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            timeout: Duration::from_secs(self.timeout),
            trials: self.trials,
            confirm_trials: self.confirm_trials,
            confirm_retries: self.confirm_retries,
            confirm_mode: self.confirm_mode,
            no_confirm: self.no_confirm,
            max_confirm_configs: self.max_confirm_configs,
            seed: self.seed,
        }
    }

    pub fn report_base(&self, root: &Path) -> Option<PathBuf> {
        self.report_dir.as_ref().map(|d| root.join(d))
    }
}
