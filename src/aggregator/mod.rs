// Aggregator - folds decoded events into the result tree under a single lock
//
// Every mutation happens inside `process_event` or `finalize` while the lock is
// held. Both hand back owned copies of packages that just finished so callers
// render them after the lock is released.

pub mod markers;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ShowFilter;
use crate::event::{Action, TestEvent};
use crate::state::{PackageResult, PackageStatus, ResultTree, Tally, TestStatus};

#[derive(Debug, Default)]
struct AggregatorState {
    tree: ResultTree,
    tally: Tally,
    duplicate_terminals: usize,
}

/// Owned state machine over one run
#[derive(Debug)]
pub struct Aggregator {
    state: Mutex<AggregatorState>,
    retain_failure_output: bool,
    started: Instant,
}

/// Per-package line of a [`RunSummary`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageSummary {
    pub name: String,
    pub status: PackageStatus,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub has_tests: bool,
    pub coverage: Option<String>,
    pub elapsed: Option<f64>,
    pub process_failure: bool,
    pub synthesized: bool,
}

/// Point-in-time view of the whole run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub tally: Tally,
    pub packages: Vec<PackageSummary>,
    pub build_failed: Vec<String>,
    /// Packages that failed without any test recording a failure
    pub process_failures: Vec<String>,
    /// Packages finalized at end of stream
    pub incomplete: Vec<String>,
    /// Average statement coverage over packages reporting non-zero coverage
    pub statement_coverage: Option<f64>,
    pub elapsed_seconds: f64,
    pub duplicate_terminal_events: usize,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.tally.failed() > 0
            || self
                .packages
                .iter()
                .any(|p| p.status == PackageStatus::Fail)
    }
}

/// Lightweight progress view for periodic heartbeats
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub tally: Tally,
    pub running: Vec<String>,
    pub finished: usize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Aggregator {
    /// `retain_failure_output` keeps buffered lines of failed tests for display
    pub fn new(retain_failure_output: bool) -> Self {
        Self {
            state: Mutex::new(AggregatorState::default()),
            retain_failure_output,
            started: Instant::now(),
        }
    }

    /// Failure output is only kept when the filter will render it
    pub fn for_filter(filter: ShowFilter) -> Self {
        Self::new(filter.renders_failure_output())
    }

    fn state(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one event. Returns the package if this event finalized it.
    pub fn process_event(&self, event: &TestEvent) -> Option<PackageResult> {
        if event.package.is_empty() {
            return None;
        }

        let mut state = self.state();
        if event.is_package_level() {
            self.apply_package_event(&mut state, event)
        } else {
            self.apply_test_event(&mut state, event);
            None
        }
    }

    fn apply_package_event(
        &self,
        state: &mut AggregatorState,
        event: &TestEvent,
    ) -> Option<PackageResult> {
        let pkg = state.tree.ensure_package(&event.package);

        match event.action {
            Action::Start => {
                if pkg.started_at.is_none() {
                    pkg.started_at = event.time.or_else(|| Some(Utc::now()));
                }
                None
            }
            Action::Run => None,
            Action::Output => {
                apply_package_output(pkg, event.output_text());
                None
            }
            Action::Pass | Action::Fail | Action::Skip => {
                if pkg.status.is_terminal() {
                    debug!("Ignoring repeated terminal event for package {}", pkg.name);
                    state.duplicate_terminals += 1;
                    return None;
                }

                let status = event.action.package_status()?;
                pkg.status = status;
                pkg.elapsed = event.elapsed;
                pkg.ended_at = event.time.or_else(|| Some(Utc::now()));
                if status == PackageStatus::Fail && pkg.is_empty() && !pkg.no_test_files {
                    pkg.has_tests = true;
                }
                Some(pkg.clone())
            }
        }
    }

    fn apply_test_event(&self, state: &mut AggregatorState, event: &TestEvent) {
        let pkg = state.tree.ensure_package(&event.package);
        let id = pkg.ensure_test(&event.test);

        match event.action {
            Action::Start | Action::Run => pkg.mark_running(id),
            Action::Output => {
                let text = event.output_text();
                if let Some(reason) = markers::skip_reason(text) {
                    pkg.node_mut(id).skip_reason = Some(reason);
                }
                pkg.append_output(id, text, self.retain_failure_output);
            }
            Action::Pass | Action::Fail | Action::Skip => {
                let Some(status) = event.action.test_status() else {
                    return;
                };
                if pkg.finalize_test(id, status, event.elapsed, self.retain_failure_output) {
                    state.tally.record(status);
                } else {
                    debug!(
                        "Ignoring repeated terminal event for {} in {}",
                        event.test, event.package
                    );
                    state.duplicate_terminals += 1;
                }
            }
        }
    }

    /// End-of-stream reconciliation: every package still running becomes a
    /// synthesized failure. Returns those packages for rendering.
    pub fn finalize(&self) -> Vec<PackageResult> {
        let mut state = self.state();
        let mut incomplete = Vec::new();

        for pkg in state.tree.packages_mut() {
            if pkg.status != PackageStatus::Running {
                continue;
            }
            warn!(
                "Package {} never reported a result; marking it as failed",
                pkg.name
            );
            pkg.status = PackageStatus::Fail;
            pkg.ended_at = Some(Utc::now());
            pkg.has_tests = true;
            pkg.synthesized = true;
            incomplete.push(pkg.clone());
        }

        incomplete
    }

    pub fn tally(&self) -> Tally {
        self.state().tally
    }

    /// Copy of a single package, if seen
    pub fn package(&self, name: &str) -> Option<PackageResult> {
        self.state().tree.package(name).cloned()
    }

    pub fn progress(&self) -> Progress {
        let state = self.state();
        let running = state
            .tree
            .packages()
            .filter(|p| !p.is_finished())
            .map(|p| p.name.clone())
            .collect();
        let finished = state.tree.packages().filter(|p| p.is_finished()).count();
        Progress {
            tally: state.tally,
            running,
            finished,
        }
    }

    /// Package-level output of packages that failed without a failing test
    pub fn failure_evidence(&self) -> String {
        let state = self.state();
        state
            .tree
            .packages()
            .filter(|p| p.is_process_failure())
            .flat_map(|p| p.output.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn snapshot(&self) -> RunSummary {
        let state = self.state();
        let mut packages = Vec::with_capacity(state.tree.len());
        let mut build_failed = Vec::new();
        let mut process_failures = Vec::new();
        let mut incomplete = Vec::new();
        let mut coverage_total = 0.0;
        let mut coverage_count = 0usize;

        for pkg in state.tree.packages() {
            if pkg.build_failed {
                build_failed.push(pkg.name.clone());
            }
            if pkg.is_process_failure() {
                process_failures.push(pkg.name.clone());
            }
            if pkg.synthesized {
                incomplete.push(pkg.name.clone());
            }
            if let Some(pct) = pkg.coverage.as_deref().and_then(markers::parse_percentage)
                && pct > 0.0
            {
                coverage_total += pct;
                coverage_count += 1;
            }

            packages.push(PackageSummary {
                name: pkg.name.clone(),
                status: pkg.status,
                passed: pkg.count(TestStatus::Pass),
                failed: pkg.count(TestStatus::Fail),
                skipped: pkg.count(TestStatus::Skip),
                has_tests: pkg.has_tests,
                coverage: pkg.coverage.clone(),
                elapsed: pkg.elapsed,
                process_failure: pkg.is_process_failure(),
                synthesized: pkg.synthesized,
            });
        }

        RunSummary {
            tally: state.tally,
            packages,
            build_failed,
            process_failures,
            incomplete,
            statement_coverage: (coverage_count > 0)
                .then(|| coverage_total / coverage_count as f64),
            elapsed_seconds: self.started.elapsed().as_secs_f64(),
            duplicate_terminal_events: state.duplicate_terminals,
        }
    }
}

fn apply_package_output(pkg: &mut PackageResult, text: &str) {
    if markers::is_no_test_files(text) {
        pkg.no_test_files = true;
        if pkg.is_empty() {
            pkg.has_tests = false;
        }
    }
    if let Some(coverage) = markers::coverage(text) {
        pkg.coverage = Some(coverage);
    }
    if markers::is_build_failure(text) {
        pkg.build_failed = true;
    }
    if markers::is_package_fail_line(text, &pkg.name) && !pkg.any_failed() {
        pkg.failed_without_tests = true;
        pkg.has_tests = true;
    }
    pkg.output.push(text.to_string());
}
