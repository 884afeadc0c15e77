use std::sync::atomic::{AtomicBool, Ordering};

use secasy_scan_core::{Axes, Evaluation, ExtFlag, FlagTag, ReportSink, ScanConfig, Sweep};

mod common;
use common::{cfg, ScriptedHarness, DIFF_OK, DIFF_WARN, EXT_EMPTY, EXT_FAIL, EXT_PASS};

fn collect(sweep: &Sweep<'_, ScriptedHarness>, axes: &Axes) -> (Vec<Evaluation>, secasy_scan_core::SweepSummary) {
    let cancel = AtomicBool::new(false);
    let mut evals = Vec::new();
    let summary = sweep.run(axes, &cancel, |e| evals.push(e.clone()));
    (evals, summary)
}

fn single_axes() -> Axes {
    Axes::new(vec![50], vec![100], vec![256])
}

#[test]
fn clean_configuration_has_no_flags() {
    let harness = ScriptedHarness::new("Status: OK\n", "SUMMARY: 200/200\nProduced hash length: 64 hex chars (256 bits)\n");
    let sweep = Sweep::new(&harness, &ScanConfig::default());
    let (evals, summary) = collect(&sweep, &single_axes());

    assert_eq!(evals.len(), 1);
    let v = &evals[0].verdict;
    assert!(v.flags.is_empty());
    assert_eq!(v.produced_bits, Some(256));
    assert!(v.diff_ok && v.ext_ok);
    assert_eq!(summary.flagged, 0);
    assert_eq!(harness.call_count(), 2);
}

#[test]
fn empty_output_is_flagged_without_confirmation() {
    let harness = ScriptedHarness::new(
        "Status: OK\n",
        "SUMMARY: 150/200\nProduced hash length: 0 hex chars (0 bits)\n",
    );
    let sweep = Sweep::new(&harness, &ScanConfig::default());
    let (evals, summary) = collect(&sweep, &single_axes());

    assert_eq!(evals[0].verdict.flags.tags(), vec![FlagTag::Ext(ExtFlag::Empty)]);
    assert_eq!(evals[0].verdict.produced_bits, Some(0));
    assert_eq!(sweep.budget().used(), 0);
    assert_eq!(summary.confirmations_used, 0);
    assert_eq!(harness.extended_requests().len(), 1);
}

#[test]
fn timeout_sentinel_is_flagged_regardless_of_fields() {
    let harness = ScriptedHarness::new(
        DIFF_OK,
        "Produced hash length: 64 hex chars (256 bits)\nMax correlation: 0.0100\n\n<<TIMEOUT>>\n",
    );
    let sweep = Sweep::new(&harness, &ScanConfig::default());
    let (evals, _) = collect(&sweep, &single_axes());

    assert_eq!(evals[0].verdict.flags.ext, Some(ExtFlag::Timeout));
    assert_eq!(evals[0].verdict.produced_bits, Some(256));
    assert_eq!(sweep.budget().used(), 0);
    assert_eq!(harness.extended_requests().len(), 1);
}

#[test]
fn disabled_confirmation_runs_exactly_two_processes_per_configuration() {
    let harness = ScriptedHarness::new(DIFF_OK, EXT_FAIL);
    let config = ScanConfig {
        no_confirm: true,
        ..ScanConfig::default()
    };
    let sweep = Sweep::new(&harness, &config);
    let axes = Axes::new(vec![50, 100], vec![100], vec![64, 128]);
    let (evals, summary) = collect(&sweep, &axes);

    assert_eq!(evals.len(), 4);
    for e in &evals {
        assert_eq!(e.verdict.flags.ext, Some(ExtFlag::NoConfirm));
        assert!(e.confirmations().is_empty());
    }
    assert_eq!(harness.call_count(), 8);
    assert_eq!(summary.flagged, 4);
    assert_eq!(summary.confirmations_used, 0);
}

#[test]
fn budget_of_one_confirms_first_failure_only() {
    let harness = ScriptedHarness::new(DIFF_OK, EXT_FAIL);
    let config = ScanConfig {
        max_confirm_configs: 1,
        ..ScanConfig::default()
    };
    let sweep = Sweep::new(&harness, &config);
    let axes = Axes::new(vec![50], vec![100], vec![64, 128]);
    let (evals, summary) = collect(&sweep, &axes);

    assert_eq!(evals[0].verdict.flags.ext, Some(ExtFlag::Confirm));
    assert_eq!(evals[0].confirmations().len(), 2);
    assert_eq!(evals[1].verdict.flags.ext, Some(ExtFlag::Unconfirmed));
    assert!(evals[1].confirmations().is_empty());

    let second: Vec<_> = harness
        .extended_requests()
        .into_iter()
        .filter(|(c, _)| *c == cfg(50, 100, 128))
        .collect();
    assert_eq!(second.len(), 1, "no re-runs for the unconfirmed configuration");
    assert_eq!(summary.confirmations_used, 1);
}

#[test]
fn passing_rerun_suppresses_flag_and_supplies_diagnostics() {
    let target = cfg(50, 100, 256);
    let rerun_pass = "Produced hash length: 64 hex chars (256 bits)\nMax correlation: 0.0321\nHigh correlation rate: 0.20%\nSUMMARY: 500/500\n";
    let harness = ScriptedHarness::new(DIFF_OK, EXT_FAIL)
        .extended_for(target, &[EXT_FAIL, EXT_FAIL, rerun_pass]);
    let sweep = Sweep::new(&harness, &ScanConfig::default());
    let (evals, summary) = collect(&sweep, &single_axes());

    let v = &evals[0].verdict;
    assert!(v.flags.is_empty(), "flags={}", v.flags);
    assert!(v.ext_ok);
    assert_eq!(v.max_correlation, Some(0.0321));
    assert_eq!(v.high_correlation_rate_percent, Some(0.2));

    let seeds: Vec<i64> = harness
        .extended_requests()
        .iter()
        .map(|(_, r)| r.seed)
        .collect();
    assert_eq!(seeds, vec![42, 1042, 1043]);
    let trials: Vec<u32> = harness
        .extended_requests()
        .iter()
        .map(|(_, r)| r.trials)
        .collect();
    assert_eq!(trials, vec![200, 500, 500]);

    assert_eq!(evals[0].confirmations().len(), 2);
    assert_eq!(summary.flagged, 0);
    assert_eq!(summary.confirmations_used, 1);
}

#[test]
fn diff_flag_co_occurs_with_one_ext_flag() {
    let harness = ScriptedHarness::new(DIFF_WARN, EXT_FAIL);
    let sweep = Sweep::new(&harness, &ScanConfig::default());
    let (evals, _) = collect(&sweep, &single_axes());

    assert_eq!(evals[0].verdict.flags.to_string(), "DIFF,EXT(confirm)");
}

#[test]
fn differential_without_status_lines_fails_closed() {
    let harness = ScriptedHarness::new("segfault before any test\n", EXT_PASS);
    let sweep = Sweep::new(&harness, &ScanConfig::default());
    let (evals, _) = collect(&sweep, &single_axes());

    assert_eq!(evals[0].verdict.flags.tags(), vec![FlagTag::Diff]);
}

#[test]
fn at_most_one_ext_tag_across_mixed_sweep() {
    let harness = ScriptedHarness::new(DIFF_OK, EXT_FAIL)
        .extended_for(cfg(1, 1, 1), &[EXT_EMPTY])
        .extended_for(cfg(1, 1, 2), &["partial\n<<TIMEOUT>>\n"])
        .extended_for(cfg(1, 2, 1), &[EXT_PASS])
        .differential_for(cfg(2, 1, 1), DIFF_WARN);
    let config = ScanConfig {
        max_confirm_configs: 2,
        ..ScanConfig::default()
    };
    let sweep = Sweep::new(&harness, &config);
    let axes = Axes::new(vec![1, 2], vec![1, 2], vec![1, 2]);
    let (evals, summary) = collect(&sweep, &axes);

    assert_eq!(evals.len(), 8);
    for e in &evals {
        let ext_tags = e
            .verdict
            .flags
            .tags()
            .into_iter()
            .filter(|t| matches!(t, FlagTag::Ext(_)))
            .count();
        assert!(ext_tags <= 1);
    }
    let exts: Vec<Option<ExtFlag>> = evals.iter().map(|e| e.verdict.flags.ext).collect();
    assert_eq!(
        exts,
        vec![
            Some(ExtFlag::Empty),
            Some(ExtFlag::Timeout),
            None,
            Some(ExtFlag::Confirm),
            Some(ExtFlag::Confirm),
            Some(ExtFlag::Unconfirmed),
            Some(ExtFlag::Unconfirmed),
            Some(ExtFlag::Unconfirmed),
        ]
    );
    assert!(evals[4].verdict.flags.diff);
    assert_eq!(summary.confirmations_used, 2);
}

#[test]
fn interruption_stops_between_configurations() {
    let harness = ScriptedHarness::new(DIFF_OK, EXT_PASS);
    let sweep = Sweep::new(&harness, &ScanConfig::default());
    let axes = Axes::new(vec![50, 100], vec![100], vec![64, 128]);
    let cancel = AtomicBool::new(false);
    let mut seen = 0;
    let summary = sweep.run(&axes, &cancel, |_| {
        seen += 1;
        if seen == 2 {
            cancel.store(true, Ordering::SeqCst);
        }
    });

    assert!(summary.interrupted);
    assert_eq!(summary.evaluated, 2);
    assert_eq!(seen, 2);
    assert_eq!(harness.call_count(), 4);
}

#[test]
fn summary_rows_match_configuration_count() {
    let harness = ScriptedHarness::new(DIFF_OK, EXT_PASS)
        .extended_for(cfg(50, 200, 128), &[EXT_EMPTY])
        .differential_for(cfg(100, 100, 64), DIFF_WARN);
    let sweep = Sweep::new(&harness, &ScanConfig::default());
    let axes = Axes::new(vec![50, 100], vec![100, 200], vec![64, 128, 256]);

    let tmp = tempfile::tempdir().expect("tempdir");
    let mut sink = ReportSink::create(tmp.path()).expect("sink");
    let cancel = AtomicBool::new(false);
    let summary = sweep.run(&axes, &cancel, |e| sink.record(e).expect("record"));
    let path = sink.finish().expect("finish");

    assert_eq!(summary.flagged, 2);
    let text = std::fs::read_to_string(path).expect("summary");
    assert_eq!(text.lines().count() - 1, axes.len());
    assert_eq!(axes.len(), 12);

    let evidence: Vec<String> = std::fs::read_dir(sink.dir())
        .expect("read dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".txt"))
        .collect();
    assert_eq!(evidence.len(), 4, "evidence={evidence:?}");
}

#[test]
fn sweeps_have_isolated_budgets() {
    let harness = ScriptedHarness::new(DIFF_OK, EXT_FAIL);
    let config = ScanConfig {
        max_confirm_configs: 1,
        ..ScanConfig::default()
    };
    let first = Sweep::new(&harness, &config);
    let second = Sweep::new(&harness, &config);
    let (a, _) = collect(&first, &single_axes());
    let (b, _) = collect(&second, &single_axes());

    assert_eq!(a[0].verdict.flags.ext, Some(ExtFlag::Confirm));
    assert_eq!(b[0].verdict.flags.ext, Some(ExtFlag::Confirm));
}
