//! Parameter sweep over reduced Secasy configurations.
//!
//! For every (rounds, prime index, number of bits) configuration the sweep
//! runs the differential and extended-security harnesses, parses their text
//! output, and flags the configuration when either looks weak. Extended
//! failures go through [`confirm`] first, which re-runs the harness with more
//! trials and fresh seeds to filter out statistical noise.
//!
//! The harnesses are reached through the [`harness::Harness`] trait;
//! [`harness::ProcessHarness`] is the process-backed implementation.

pub mod config;
pub mod confirm;
pub mod harness;
pub mod parse;
pub mod report;
pub mod runner;
pub mod sweep;
pub mod verdict;

pub use config::{Axes, ConfirmMode, Configuration, ScanConfig};
pub use confirm::{ConfirmDecision, ConfirmPolicy, ConfirmationBudget};
pub use harness::{Harness, HarnessPaths, ProcessHarness};
pub use parse::{parse_differential, parse_extended, DifferentialOutcome, ExtendedOutcome};
pub use report::ReportSink;
pub use sweep::{Evaluation, Sweep, SweepSummary};
pub use verdict::{ConfigurationVerdict, ExtFlag, FlagTag, Flags};
