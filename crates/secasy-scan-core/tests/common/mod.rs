#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use secasy_scan_core::harness::{ExtendedRequest, Harness};
use secasy_scan_core::Configuration;

pub const DIFF_OK: &str = "  Status: ✓ PASS - Good diffusion\n  Status: OK\n";
pub const DIFF_WARN: &str = "  Status: ✓ PASS\n  Status: ⚠ WARNING - Potential weakness detected\n";
pub const EXT_PASS: &str =
    "Produced hash length: 64 hex chars (256 bits)\nMax correlation: 0.0500\nHigh correlation rate: 0.00%\nSUMMARY: 200/200\n";
pub const EXT_FAIL: &str =
    "Produced hash length: 64 hex chars (256 bits)\nMax correlation: 0.4100\nHigh correlation rate: 7.50%\nSUMMARY: 150/200\n";
pub const EXT_EMPTY: &str = "Produced hash length: 0 hex chars (0 bits)\nSUMMARY: 150/200\n";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Differential(Configuration),
    Extended(Configuration, ExtendedRequest),
}

/// In-process harness replaying canned outputs per configuration.
///
/// Extended outputs are consumed in order (initial run first, then
/// confirmation re-runs); once a queue is empty the default is returned.
pub struct ScriptedHarness {
    differential: HashMap<Configuration, String>,
    extended: RefCell<HashMap<Configuration, VecDeque<String>>>,
    default_differential: String,
    default_extended: String,
    pub calls: RefCell<Vec<Call>>,
}

impl ScriptedHarness {
    pub fn new(default_differential: &str, default_extended: &str) -> Self {
        ScriptedHarness {
            differential: HashMap::new(),
            extended: RefCell::new(HashMap::new()),
            default_differential: default_differential.to_string(),
            default_extended: default_extended.to_string(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn differential_for(mut self, config: Configuration, out: &str) -> Self {
        self.differential.insert(config, out.to_string());
        self
    }

    pub fn extended_for(self, config: Configuration, outs: &[&str]) -> Self {
        self.extended
            .borrow_mut()
            .insert(config, outs.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn extended_requests(&self) -> Vec<(Configuration, ExtendedRequest)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Extended(cfg, req) => Some((*cfg, *req)),
                Call::Differential(_) => None,
            })
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Harness for ScriptedHarness {
    fn differential(&self, config: &Configuration) -> String {
        self.calls.borrow_mut().push(Call::Differential(*config));
        self.differential
            .get(config)
            .cloned()
            .unwrap_or_else(|| self.default_differential.clone())
    }

    fn extended(&self, config: &Configuration, request: &ExtendedRequest) -> String {
        self.calls
            .borrow_mut()
            .push(Call::Extended(*config, *request));
        self.extended
            .borrow_mut()
            .get_mut(config)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_extended.clone())
    }
}

pub fn cfg(rounds: i64, prime_index: i64, number_of_bits: i64) -> Configuration {
    Configuration {
        rounds,
        prime_index,
        number_of_bits,
    }
}
