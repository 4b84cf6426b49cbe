// Exit classification - tells "my test failed" apart from "the test process broke"

use serde::Serialize;

use crate::aggregator::RunSummary;

/// Exit code used when the run is interrupted with Ctrl-C
pub const EXIT_INTERRUPTED: i32 = 130;

/// How the event source ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Subprocess exited with a code
    Code(i32),
    /// Subprocess was killed by a signal
    Signaled,
    /// User aborted the run
    Interrupted,
    /// Events were replayed from a log; no process exit to inspect
    Replayed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    Success,
    NoTests,
    TestFailures,
    ProcessFailure,
    Interrupted,
}

/// Final exit code and the human-readable reason behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitReport {
    pub code: i32,
    pub kind: ExitKind,
    pub reason: String,
}

/// Compute the exit code. `evidence` is captured stderr plus the output of
/// packages that failed without a failing test.
pub fn classify(exit: ProcessExit, summary: &RunSummary, evidence: &str) -> ExitReport {
    let failed = summary.tally.failed();
    let passed = summary.tally.passed();

    if exit == ProcessExit::Interrupted {
        return ExitReport {
            code: EXIT_INTERRUPTED,
            kind: ExitKind::Interrupted,
            reason: "Test run aborted".to_string(),
        };
    }

    let process_code = match exit {
        ProcessExit::Code(code) => code,
        ProcessExit::Signaled => 1,
        ProcessExit::Interrupted | ProcessExit::Replayed => 0,
    };

    if failed > 0 {
        let code = if process_code != 0 { process_code } else { 1 };
        let reason = match exit {
            ProcessExit::Code(_) => format!(
                "{} test{} failed, go test exited with code {}",
                failed,
                plural(failed),
                process_code
            ),
            _ => format!("{} test{} failed", failed, plural(failed)),
        };
        return ExitReport {
            code,
            kind: ExitKind::TestFailures,
            reason,
        };
    }

    let anomalous = !summary.process_failures.is_empty() || !summary.incomplete.is_empty();
    if process_code != 0 || exit == ProcessExit::Signaled || anomalous {
        let code = if process_code != 0 { process_code } else { 1 };
        return ExitReport {
            code,
            kind: ExitKind::ProcessFailure,
            reason: format!(
                "No test failures detected, but the test process failed: {}",
                analyze_process_failure(evidence, code)
            ),
        };
    }

    if summary.tally.total() == 0 {
        return ExitReport {
            code: 0,
            kind: ExitKind::NoTests,
            reason: "No tests found".to_string(),
        };
    }

    ExitReport {
        code: 0,
        kind: ExitKind::Success,
        reason: format!("All {} test{} passed successfully", passed, plural(passed)),
    }
}

/// Name the most likely root cause of a process-level failure
pub fn analyze_process_failure(evidence: &str, exit_code: i32) -> String {
    if evidence.contains("[setup failed]") {
        if evidence.contains("TestMain") {
            return format!(
                "TestMain failed with exit code {} (ensure it calls os.Exit(m.Run()))",
                exit_code
            );
        }
        return format!(
            "test setup failed with exit code {} (possible TestMain or init() issue)",
            exit_code
        );
    }

    if evidence.contains("panic:") {
        let message = evidence
            .lines()
            .find_map(|line| line.split_once("panic:").map(|(_, rest)| rest.trim()))
            .unwrap_or_default();
        if message.is_empty() {
            return format!("test process panicked with exit code {}", exit_code);
        }
        return format!(
            "test process panicked: {} (exit code {})",
            message, exit_code
        );
    }

    if evidence.contains("[build failed]") {
        let package = evidence.lines().find_map(|line| {
            if !line.contains("[build failed]") {
                return None;
            }
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some("FAIL"), Some(pkg)) => Some(pkg.to_string()),
                _ => None,
            }
        });
        return match package {
            Some(pkg) => format!("build failed for package {} (exit code {})", pkg, exit_code),
            None => format!("build failed with exit code {}", exit_code),
        };
    }

    if evidence.contains("undefined:")
        || evidence.contains("cannot find")
        || evidence.contains("declared and not used")
    {
        return format!(
            "build/compilation error with exit code {} (check for undefined symbols or missing dependencies)",
            exit_code
        );
    }

    if evidence.contains("log.Fatal") || evidence.contains("logger.Fatal") {
        return format!("a test called log.Fatal (exit code {})", exit_code);
    }

    if evidence.contains("os.Exit") {
        return format!("a test called os.Exit({}) directly", exit_code);
    }

    format!("possible process-level issue (exit code {})", exit_code)
}

pub(crate) fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}
