use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::config::{Axes, Configuration, ScanConfig};
use crate::confirm::{self, ConfirmAttempt, ConfirmDecision, ConfirmPolicy, ConfirmationBudget};
use crate::harness::{ExtendedRequest, Harness};
use crate::parse::{parse_differential, parse_extended};
use crate::verdict::{ConfigurationVerdict, Flags};

/// Verdict of one configuration plus the raw outputs behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub verdict: ConfigurationVerdict,
    pub differential_raw: String,
    pub extended_raw: String,
    /// `None` when the initial extended run passed.
    pub decision: Option<ConfirmDecision>,
}

impl Evaluation {
    pub fn confirmations(&self) -> &[ConfirmAttempt] {
        self.decision
            .as_ref()
            .map(ConfirmDecision::attempts)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SweepSummary {
    pub evaluated: usize,
    pub flagged: usize,
    pub confirmations_used: usize,
    pub interrupted: bool,
}

/// Drives both harnesses over every configuration and owns the confirmation budget.
#[derive(Debug)]
pub struct Sweep<'h, H: Harness + ?Sized> {
    harness: &'h H,
    initial: ExtendedRequest,
    policy: ConfirmPolicy,
    budget: ConfirmationBudget,
}

impl<'h, H: Harness + ?Sized> Sweep<'h, H> {
    pub fn new(harness: &'h H, config: &ScanConfig) -> Self {
        Sweep {
            harness,
            initial: ExtendedRequest {
                trials: config.trials,
                seed: config.seed,
                fast: true,
            },
            policy: ConfirmPolicy::from_config(config),
            budget: ConfirmationBudget::new(config.max_confirm_configs),
        }
    }

    pub fn budget(&self) -> &ConfirmationBudget {
        &self.budget
    }

    /// Run the full pipeline for one configuration.
    pub fn evaluate(&self, configuration: Configuration) -> Evaluation {
        let differential_raw = self.harness.differential(&configuration);
        let differential = parse_differential(&differential_raw);

        let extended_raw = self.harness.extended(&configuration, &self.initial);
        let mut extended = parse_extended(&extended_raw);

        let decision = (!extended.ok).then(|| {
            confirm::decide(
                self.harness,
                &configuration,
                &extended,
                &extended_raw,
                &self.policy,
                &self.budget,
            )
        });

        let mut flags = Flags {
            diff: !differential.ok,
            ext: None,
        };
        if let Some(decision) = &decision {
            match decision.passing_outcome() {
                Some(passing) => extended = *passing,
                None => flags.ext = decision.flag(),
            }
        }

        Evaluation {
            verdict: ConfigurationVerdict::new(configuration, flags, differential, extended),
            differential_raw,
            extended_raw,
            decision,
        }
    }

    /// Evaluate every configuration in product order, handing each result to
    /// `on_evaluation` as soon as it exists. `cancel` is polled before each
    /// configuration; once set, no further configuration starts.
    pub fn run<F>(&self, axes: &Axes, cancel: &AtomicBool, mut on_evaluation: F) -> SweepSummary
    where
        F: FnMut(&Evaluation),
    {
        let mut summary = SweepSummary::default();
        for configuration in axes.configurations() {
            if cancel.load(Ordering::SeqCst) {
                info!(evaluated = summary.evaluated, "sweep interrupted");
                summary.interrupted = true;
                break;
            }
            let evaluation = self.evaluate(configuration);
            summary.evaluated += 1;
            if evaluation.verdict.is_flagged() {
                summary.flagged += 1;
            }
            info!(
                %configuration,
                flags = %evaluation.verdict.flags,
                diff_ok = evaluation.verdict.diff_ok,
                ext_ok = evaluation.verdict.ext_ok,
                "configuration evaluated"
            );
            on_evaluation(&evaluation);
        }
        summary.confirmations_used = self.budget.used();
        summary
    }
}
