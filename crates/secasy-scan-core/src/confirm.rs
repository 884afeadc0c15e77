//! Confirmation of extended-security failures.
//!
//! A failure seen at the initial trial count may be sampling noise. The
//! policy either accepts it outright (empty output, timeout), skips
//! confirmation (disabled, budget spent), or re-runs the harness with more
//! trials and fresh seeds. One passing re-run marks the failure as flaky.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use crate::config::{ConfirmMode, Configuration, ScanConfig};
use crate::harness::{ExtendedRequest, Harness};
use crate::parse::{parse_extended, ExtendedOutcome};
use crate::runner;
use crate::verdict::ExtFlag;

/// Added to the base seed for confirmation attempt 0.
pub const CONFIRM_SEED_OFFSET: i64 = 1000;

/// Sweep-wide cap on configurations that may enter the re-run path.
///
/// Claims are atomic, so two configurations never take the same slot.
#[derive(Debug)]
pub struct ConfirmationBudget {
    cap: usize,
    used: AtomicUsize,
}

impl ConfirmationBudget {
    /// `cap == 0` means unlimited.
    pub fn new(cap: usize) -> Self {
        ConfirmationBudget {
            cap,
            used: AtomicUsize::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn cap(&self) -> Option<usize> {
        (self.cap > 0).then_some(self.cap)
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cap > 0 && self.used() >= self.cap
    }

    /// Take one slot. Returns false if none is left.
    pub fn try_claim(&self) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                if self.cap > 0 && used >= self.cap {
                    None
                } else {
                    used.checked_add(1)
                }
            })
            .is_ok()
    }
}

/// Caller-controlled knobs of the confirmation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub enabled: bool,
    pub retries: u32,
    pub trials: u32,
    pub mode: ConfirmMode,
    pub base_seed: i64,
}

impl ConfirmPolicy {
    pub fn from_config(config: &ScanConfig) -> Self {
        ConfirmPolicy {
            enabled: !config.no_confirm,
            retries: config.confirm_retries,
            trials: config.confirm_trials,
            mode: config.confirm_mode,
            base_seed: config.seed,
        }
    }

    pub fn seed_for_attempt(&self, attempt: u32) -> i64 {
        self.base_seed
            .wrapping_add(CONFIRM_SEED_OFFSET)
            .wrapping_add(i64::from(attempt))
    }

    fn request(&self, attempt: u32) -> ExtendedRequest {
        ExtendedRequest {
            trials: self.trials,
            seed: self.seed_for_attempt(attempt),
            fast: self.mode.is_fast(),
        }
    }
}

/// Failures that more trials cannot change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmediateReason {
    EmptyOutput,
    Timeout,
}

/// One confirmation re-run, kept as evidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmAttempt {
    pub attempt: u32,
    pub seed: i64,
    pub raw: String,
    pub outcome: ExtendedOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmDecision {
    /// Accepted without re-running.
    Immediate(ImmediateReason),
    /// Confirmation disabled by the caller.
    Bypass,
    /// No budget slot left.
    BudgetExhausted,
    /// Took a budget slot and re-ran. `passed` indexes the first passing attempt.
    Reran {
        attempts: Vec<ConfirmAttempt>,
        passed: Option<usize>,
    },
}

impl ConfirmDecision {
    /// Whether the failure stands.
    pub fn is_confirmed(&self) -> bool {
        !matches!(
            self,
            ConfirmDecision::Reran {
                passed: Some(_),
                ..
            }
        )
    }

    /// EXT tag for the verdict, `None` for a flaky failure.
    pub fn flag(&self) -> Option<ExtFlag> {
        match self {
            ConfirmDecision::Immediate(ImmediateReason::EmptyOutput) => Some(ExtFlag::Empty),
            ConfirmDecision::Immediate(ImmediateReason::Timeout) => Some(ExtFlag::Timeout),
            ConfirmDecision::Bypass => Some(ExtFlag::NoConfirm),
            ConfirmDecision::BudgetExhausted => Some(ExtFlag::Unconfirmed),
            ConfirmDecision::Reran { passed: None, .. } => Some(ExtFlag::Confirm),
            ConfirmDecision::Reran {
                passed: Some(_), ..
            } => None,
        }
    }

    pub fn attempts(&self) -> &[ConfirmAttempt] {
        match self {
            ConfirmDecision::Reran { attempts, .. } => attempts,
            _ => &[],
        }
    }

    /// Outcome of the passing re-run, if the failure turned out flaky.
    pub fn passing_outcome(&self) -> Option<&ExtendedOutcome> {
        match self {
            ConfirmDecision::Reran {
                attempts,
                passed: Some(idx),
            } => attempts.get(*idx).map(|a| &a.outcome),
            _ => None,
        }
    }
}

/// Decide what an initial extended-security failure means.
///
/// `initial` must be a failing outcome parsed from `initial_raw`.
pub fn decide<H: Harness + ?Sized>(
    harness: &H,
    config: &Configuration,
    initial: &ExtendedOutcome,
    initial_raw: &str,
    policy: &ConfirmPolicy,
    budget: &ConfirmationBudget,
) -> ConfirmDecision {
    debug_assert!(!initial.ok, "confirmation entered for a passing run");

    if initial.is_empty_output() {
        return ConfirmDecision::Immediate(ImmediateReason::EmptyOutput);
    }
    if runner::is_timed_out(initial_raw) {
        return ConfirmDecision::Immediate(ImmediateReason::Timeout);
    }
    if !policy.enabled {
        return ConfirmDecision::Bypass;
    }
    if !budget.try_claim() {
        return ConfirmDecision::BudgetExhausted;
    }

    let mut attempts = Vec::new();
    for attempt in 0..policy.retries {
        let request = policy.request(attempt);
        let raw = harness.extended(config, &request);
        let outcome = parse_extended(&raw);
        info!(
            %config,
            attempt,
            seed = request.seed,
            trials = request.trials,
            ok = outcome.ok,
            "confirmation re-run"
        );
        let ok = outcome.ok;
        attempts.push(ConfirmAttempt {
            attempt,
            seed: request.seed,
            raw,
            outcome,
        });
        if ok {
            let passed = Some(attempts.len() - 1);
            return ConfirmDecision::Reran { attempts, passed };
        }
    }
    ConfirmDecision::Reran {
        attempts,
        passed: None,
    }
}
