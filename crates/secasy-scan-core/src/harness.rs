use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Configuration;
use crate::runner;

/// Fast-mode toggle understood by the differential harness.
pub const ENV_DIFF_FAST: &str = "SECASY_DIFF_FAST";
/// Fast-mode toggle understood by the extended-security harness.
pub const ENV_EXT_FAST: &str = "SECASY_EXT_FAST";

pub const DIFFERENTIAL_EXE: &str = "SecasyDifferential.exe";
pub const EXTENDED_EXE: &str = "SecasyExtendedSecurity.exe";

/// Parameters of one extended-security run on top of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedRequest {
    pub trials: u32,
    pub seed: i64,
    /// Enable the harness's fast mode. When false the inherited environment is left alone.
    pub fast: bool,
}

/// The two test harnesses, as seen by the sweep.
///
/// Both calls return the raw combined output of one run. A run that hit its
/// time limit carries [`runner::TIMEOUT_SENTINEL`].
pub trait Harness {
    fn differential(&self, config: &Configuration) -> String;
    fn extended(&self, config: &Configuration, request: &ExtendedRequest) -> String;
}

/// Locations of the two harness executables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessPaths {
    pub differential: PathBuf,
    pub extended: PathBuf,
}

impl HarnessPaths {
    /// Default executable names inside a build directory.
    pub fn in_build_dir(build_dir: &Path) -> Self {
        HarnessPaths {
            differential: build_dir.join(DIFFERENTIAL_EXE),
            extended: build_dir.join(EXTENDED_EXE),
        }
    }

    /// Executables that do not exist on disk.
    pub fn missing(&self) -> Vec<&Path> {
        [self.differential.as_path(), self.extended.as_path()]
            .into_iter()
            .filter(|p| !p.exists())
            .collect()
    }
}

/// Positional arguments of the differential harness: prime index, rounds, bits.
pub fn differential_args(config: &Configuration) -> Vec<String> {
    vec![
        config.prime_index.to_string(),
        config.rounds.to_string(),
        config.number_of_bits.to_string(),
    ]
}

pub fn extended_args(config: &Configuration, request: &ExtendedRequest) -> Vec<String> {
    vec![
        "-t".to_string(),
        request.trials.to_string(),
        "-r".to_string(),
        config.rounds.to_string(),
        "-i".to_string(),
        config.prime_index.to_string(),
        "-n".to_string(),
        config.number_of_bits.to_string(),
        "-s".to_string(),
        request.seed.to_string(),
    ]
}

/// Runs the harnesses as external processes through [`runner::run_command`].
#[derive(Debug, Clone)]
pub struct ProcessHarness {
    pub paths: HarnessPaths,
    /// Working directory of every harness process.
    pub root: PathBuf,
    pub timeout: Duration,
}

impl ProcessHarness {
    pub fn new(paths: HarnessPaths, root: PathBuf, timeout: Duration) -> Self {
        ProcessHarness {
            paths,
            root,
            timeout,
        }
    }
}

impl Harness for ProcessHarness {
    fn differential(&self, config: &Configuration) -> String {
        runner::run_command(
            &self.paths.differential,
            &differential_args(config),
            &self.root,
            self.timeout,
            &[(ENV_DIFF_FAST, "1")],
        )
    }

    fn extended(&self, config: &Configuration, request: &ExtendedRequest) -> String {
        let fast_env = [(ENV_EXT_FAST, "1")];
        let env: &[(&str, &str)] = if request.fast { &fast_env } else { &[] };
        runner::run_command(
            &self.paths.extended,
            &extended_args(config, request),
            &self.root,
            self.timeout,
            env,
        )
    }
}
