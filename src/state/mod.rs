// State module - result tree and running counters
// Hierarchy of packages, top-level tests and subtests built from the event stream

pub mod node;
pub mod tree;

pub use node::{NodeId, TestNode};
pub use tree::{PackageResult, ResultTree};

use serde::Serialize;

/// Status of a single test or subtest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pending,
    Running,
    Pass,
    Fail,
    Skip,
}

impl TestStatus {
    /// Terminal statuses are write-once
    pub fn is_terminal(self) -> bool {
        matches!(self, TestStatus::Pass | TestStatus::Fail | TestStatus::Skip)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Running => "running",
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
            TestStatus::Skip => "skip",
        }
    }
}

/// Status of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    Running,
    Pass,
    Fail,
    Skip,
}

impl PackageStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PackageStatus::Running)
    }
}

/// Running pass/fail/skip totals over terminal test and subtest events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    passed: usize,
    failed: usize,
    skipped: usize,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one terminal event. Non-terminal statuses are ignored.
    pub fn record(&mut self, status: TestStatus) {
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::Skip => self.skipped += 1,
            TestStatus::Pending | TestStatus::Running => {}
        }
    }

    pub fn passed(&self) -> usize {
        self.passed
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// Pass rate over passed + failed, in percent
    pub fn pass_rate(&self) -> f64 {
        let executed = self.passed + self.failed;
        if executed == 0 {
            0.0
        } else {
            (self.passed as f64 / executed as f64) * 100.0
        }
    }
}
