use std::fmt::Display;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use secasy_scan_core::{
    Axes, ConfigurationVerdict, Evaluation, HarnessPaths, ProcessHarness, ReportSink, ScanConfig,
    Sweep, SweepSummary,
};
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod cli;
mod interrupt;

use cli::Cli;

const EXIT_ERROR: u8 = 1;
const EXIT_MISSING_EXECUTABLES: u8 = 2;

const REPORT_SCHEMA_VERSION: &str = "secasy-scan.report@0.1.0";

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Status 2 is reserved for missing executables.
            let code = if err.use_stderr() { EXIT_ERROR } else { 0 };
            let _ = err.print();
            return Ok(ExitCode::from(code));
        }
    };

    init_logging(&cli.log_level);

    let root = cli.root_dir()?;
    let paths = cli.harness_paths(&root);
    if !paths.missing().is_empty() {
        print_missing_executables(&paths);
        return Ok(ExitCode::from(EXIT_MISSING_EXECUTABLES));
    }

    let axes = cli.axes()?;
    let config = cli.scan_config();
    for warning in config.warnings() {
        warn!("{warning}");
    }

    let progress = Progress {
        to_stderr: cli.json,
    };
    print_header(&progress, &axes);

    let mut report = match cli.report_base(&root) {
        Some(base) => {
            let sink = ReportSink::create(&base)
                .with_context(|| format!("create report directory under {}", base.display()))?;
            sink.write_scan_metadata(&config, &axes)
                .context("write scan metadata")?;
            Some(sink)
        }
        None => None,
    };

    let cancel = interrupt::install();
    let harness = ProcessHarness::new(paths, root, config.timeout);
    let sweep = Sweep::new(&harness, &config);

    let mut verdicts: Vec<ConfigurationVerdict> = Vec::new();
    let summary = sweep.run(&axes, cancel, |evaluation| {
        progress.line(progress_line(evaluation));
        if let Some(sink) = report.as_mut() {
            if let Err(err) = sink.record(evaluation) {
                warn!(
                    configuration = %evaluation.verdict.configuration,
                    error = %err,
                    "failed to write evidence"
                );
            }
        }
        if cli.json {
            verdicts.push(evaluation.verdict.clone());
        }
    });

    if summary.interrupted {
        progress.line("\nInterrupted. Writing partial report...");
    }
    if summary.flagged == 0 {
        progress.line("\nNo suspicious configs flagged by these heuristics.");
    } else {
        progress.line(format_args!(
            "\nFlagged {} config(s). Consider increasing trials for deeper analysis.",
            summary.flagged
        ));
    }

    if let Some(sink) = &report {
        sink.finish().context("write summary table")?;
        progress.line(format_args!("\nReport written to: {}", sink.dir().display()));
        if summary.interrupted {
            progress.line("(Partial results due to interruption.)");
        }
    }

    if cli.json {
        print_json_report(&config, &summary, report.as_ref().map(ReportSink::dir), &verdicts)?;
    }

    Ok(ExitCode::SUCCESS)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Human-readable progress, on stdout unless stdout carries JSON.
struct Progress {
    to_stderr: bool,
}

impl Progress {
    fn line(&self, text: impl Display) {
        if self.to_stderr {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    }
}

fn print_header(progress: &Progress, axes: &Axes) {
    progress.line("Scanning configs...");
    progress.line(format_args!("Rounds: {:?}", axes.rounds));
    progress.line(format_args!("PrimeIndex: {:?}", axes.prime_index));
    progress.line(format_args!("hashLengthInBits param: {:?}", axes.number_of_bits));
    progress.line("\nLegend: flags show potentially weak reduced configs.");
}

fn progress_line(evaluation: &Evaluation) -> String {
    let v = &evaluation.verdict;
    let produced = v
        .produced_bits
        .map(|b| b.to_string())
        .unwrap_or_else(|| "none".to_string());
    if v.is_flagged() {
        format!("{}  FLAGS={}  producedBits={produced}", v.configuration, v.flags)
    } else {
        format!("{}  ok  producedBits={produced}", v.configuration)
    }
}

fn print_missing_executables(paths: &HarnessPaths) {
    eprintln!("Missing executables. Build targets first:");
    eprintln!("  cmake -S . -B build");
    eprintln!(
        "  cmake --build build --config Release --target SecasyDifferential SecasyExtendedSecurity"
    );
    for path in paths.missing() {
        eprintln!("missing: {}", path.display());
    }
}

fn print_json_report(
    config: &ScanConfig,
    summary: &SweepSummary,
    report_dir: Option<&Path>,
    verdicts: &[ConfigurationVerdict],
) -> Result<()> {
    let doc = serde_json::json!({
        "schema_version": REPORT_SCHEMA_VERSION,
        "config": config,
        "interrupted": summary.interrupted,
        "evaluated": summary.evaluated,
        "flagged": summary.flagged,
        "confirmations_used": summary.confirmations_used,
        "report_dir": report_dir.map(|d| d.display().to_string()),
        "verdicts": verdicts,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
