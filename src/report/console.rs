// Console reporter - renders finalized packages and the final statistics block to stderr

use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use console::Style;

use super::Reporter;
use super::filter::should_show;
use crate::aggregator::{Progress, RunSummary};
use crate::config::{ShowFilter, Verbosity};
use crate::execution::exit::{ExitKind, ExitReport, plural};
use crate::state::{PackageResult, PackageStatus, TestNode, TestStatus};

const PASS_SYMBOL: &str = "✔";
const FAIL_SYMBOL: &str = "✘";
const SKIP_SYMBOL: &str = "⊘";
const WARN_SYMBOL: &str = "⚠";
const MAX_PROGRESS_DOTS: usize = 10;

/// Rendering knobs shared by every package
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub filter: ShowFilter,
    pub verbosity: Verbosity,
    /// `-run` pattern passed to `go test`, if any
    pub test_filter: Option<String>,
}

struct Palette {
    pass: Style,
    fail: Style,
    skip: Style,
    warn: Style,
    header: Style,
    dim: Style,
}

impl Palette {
    fn new() -> Self {
        Self {
            pass: Style::new().green().for_stderr(),
            fail: Style::new().red().for_stderr(),
            skip: Style::new().yellow().for_stderr(),
            warn: Style::new().yellow().bold().for_stderr(),
            header: Style::new().bold().for_stderr(),
            dim: Style::new().dim().for_stderr(),
        }
    }

    fn symbol(&self, status: TestStatus) -> String {
        match status {
            TestStatus::Pass => self.pass.apply_to(PASS_SYMBOL).to_string(),
            TestStatus::Skip => self.skip.apply_to(SKIP_SYMBOL).to_string(),
            _ => self.fail.apply_to(FAIL_SYMBOL).to_string(),
        }
    }
}

/// Human-readable reporter writing to stderr
pub struct ConsoleReporter {
    options: RenderOptions,
    out: Mutex<Box<dyn Write + Send>>,
    displayed: Mutex<HashSet<String>>,
}

impl ConsoleReporter {
    /// Create a reporter bound to the process's stderr
    pub fn new(options: RenderOptions) -> Self {
        Self::with_writer(options, Box::new(io::stderr()))
    }

    pub fn with_writer(options: RenderOptions, out: Box<dyn Write + Send>) -> Self {
        Self {
            options,
            out: Mutex::new(out),
            displayed: Mutex::new(HashSet::new()),
        }
    }

    fn write(&self, text: &str) -> Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(text.as_bytes())
            .and_then(|_| out.flush())
            .context("Failed to write report to stderr")
    }
}

impl Reporter for ConsoleReporter {
    fn on_package_complete(&self, package: &PackageResult) -> Result<()> {
        let first_time = self
            .displayed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(package.name.clone());
        if !first_time {
            return Ok(());
        }
        self.write(&render_package(package, &self.options))
    }

    fn on_heartbeat(&self, progress: &Progress) -> Result<()> {
        self.write(&render_heartbeat(progress))
    }

    fn on_run_end(&self, summary: &RunSummary, exit: &ExitReport) -> Result<()> {
        self.write(&render_run_summary(summary, exit))
    }
}

/// Render one finalized package. Pure; the caller decides where it goes.
pub fn render_package(pkg: &PackageResult, options: &RenderOptions) -> String {
    let palette = Palette::new();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "\n{} {}",
        palette.header.apply_to("▶"),
        palette.header.apply_to(&pkg.name)
    );

    if !pkg.has_tests {
        let message = if options.test_filter.is_some() {
            "No tests matching filter"
        } else {
            "No tests"
        };
        let _ = writeln!(out, "  {}", palette.dim.apply_to(message));
        return out;
    }

    if pkg.is_finished() && pkg.is_empty() && pkg.status == PackageStatus::Fail {
        let _ = writeln!(
            out,
            "  {} {}",
            palette.fail.apply_to(FAIL_SYMBOL),
            palette.fail.apply_to("Package failed to run tests")
        );
        if options.verbosity != Verbosity::Minimal {
            write_output(&mut out, &pkg.output, "    ", options.verbosity);
        }
        if pkg.synthesized {
            write_inferred_note(&mut out, &palette);
        }
        return out;
    }

    for test in pkg.top_level() {
        render_test(&mut out, pkg, test, options, &palette);
    }

    let orphans: Vec<&TestNode> = pkg.orphans().collect();
    if !orphans.is_empty() {
        let _ = writeln!(
            out,
            "  {} {} subtest{} arrived without a parent test",
            palette.warn.apply_to(WARN_SYMBOL),
            orphans.len(),
            plural(orphans.len())
        );
        for orphan in orphans {
            let status = effective_status(pkg, orphan);
            if should_show(options.filter, status) {
                write_test_line(&mut out, "    ", orphan, &orphan.full_name, status, &palette);
            }
        }
    }

    if pkg.synthesized {
        write_inferred_note(&mut out, &palette);
    }

    write_package_summary(&mut out, pkg, &palette);

    if pkg.failed_without_tests && !pkg.any_failed() {
        let _ = writeln!(
            out,
            "  {} {}",
            palette.warn.apply_to(WARN_SYMBOL),
            palette
                .warn
                .apply_to("Package reported FAIL but no test failures were recorded")
        );
        if options.verbosity != Verbosity::Minimal {
            write_output(&mut out, &pkg.output, "    ", options.verbosity);
        }
    }

    out
}

fn render_test(
    out: &mut String,
    pkg: &PackageResult,
    test: &TestNode,
    options: &RenderOptions,
    palette: &Palette,
) {
    let status = effective_status(pkg, test);
    let children: Vec<&TestNode> = pkg.children(test).collect();
    let failing_children = children
        .iter()
        .any(|c| effective_status(pkg, c) == TestStatus::Fail);

    let failure_filter = matches!(options.filter, ShowFilter::Failed | ShowFilter::Collapsed);
    if !should_show(options.filter, status) && !(failure_filter && failing_children) {
        return;
    }

    write_test_line(out, "  ", test, &test.name, status, palette);
    if !children.is_empty() {
        write_subtest_progress(out, pkg, &children, palette);
    }
    if status == TestStatus::Fail && !test.output.is_empty() && shows_output(options) {
        write_output(out, &test.output, "      ", options.verbosity);
    }

    if children.is_empty() {
        return;
    }

    let counts = SubtestCounts::of(pkg, &children);
    if options.filter == ShowFilter::All {
        for child in &children {
            let child_status = effective_status(pkg, child);
            write_test_line(out, "    ", child, &child.name, child_status, palette);
            if child_status == TestStatus::Fail && shows_output(options) {
                write_output(out, &child.output, "        ", options.verbosity);
            }
        }
        if status == TestStatus::Fail {
            write_subtest_counts(out, &counts, "    ", palette);
        }
        return;
    }

    if status != TestStatus::Fail && !failing_children {
        return;
    }

    write_subtest_counts(out, &counts, "    ", palette);
    if options.filter == ShowFilter::Collapsed {
        return;
    }

    let groups = [
        (TestStatus::Pass, "Passed", &palette.pass),
        (TestStatus::Fail, "Failed", &palette.fail),
        (TestStatus::Skip, "Skipped", &palette.skip),
    ];
    for (group_status, label, style) in groups {
        let members: Vec<&&TestNode> = children
            .iter()
            .filter(|c| effective_status(pkg, c) == group_status)
            .collect();
        if members.is_empty() {
            continue;
        }
        let _ = writeln!(out, "    {}:", style.apply_to(label));
        for member in members {
            let _ = writeln!(out, "      • {}", member.name);
            if group_status == TestStatus::Fail && shows_output(options) {
                write_output(out, &member.output, "          ", options.verbosity);
            }
        }
    }
}

/// Tests left unfinished inside a finished package are reported as failures
fn effective_status(pkg: &PackageResult, node: &TestNode) -> TestStatus {
    if !node.status.is_terminal() && pkg.is_finished() {
        TestStatus::Fail
    } else {
        node.status
    }
}

fn shows_output(options: &RenderOptions) -> bool {
    options.verbosity != Verbosity::Minimal && options.filter.renders_failure_output()
}

fn write_test_line(
    out: &mut String,
    indent: &str,
    node: &TestNode,
    label: &str,
    status: TestStatus,
    palette: &Palette,
) {
    let _ = write!(out, "{}{} {}", indent, palette.symbol(status), label);
    if let Some(elapsed) = node.elapsed {
        let _ = write!(out, " {}", palette.dim.apply_to(format!("({:.2}s)", elapsed)));
    }
    if !node.status.is_terminal() {
        let _ = write!(out, " {}", palette.dim.apply_to("(did not complete)"));
    }
    if status == TestStatus::Skip
        && let Some(reason) = &node.skip_reason
    {
        let _ = write!(out, " {}", palette.skip.apply_to(format!("- {}", reason)));
    }
    out.push('\n');
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct SubtestCounts {
    passed: usize,
    failed: usize,
    skipped: usize,
    total: usize,
}

impl SubtestCounts {
    fn of(pkg: &PackageResult, children: &[&TestNode]) -> Self {
        let mut counts = Self {
            total: children.len(),
            ..Self::default()
        };
        for child in children {
            match effective_status(pkg, child) {
                TestStatus::Pass => counts.passed += 1,
                TestStatus::Skip => counts.skipped += 1,
                TestStatus::Fail => counts.failed += 1,
                TestStatus::Pending | TestStatus::Running => {}
            }
        }
        counts
    }

    fn pass_percent(&self) -> usize {
        if self.total == 0 {
            return 0;
        }
        self.passed * 100 / self.total
    }
}

fn write_subtest_counts(out: &mut String, counts: &SubtestCounts, indent: &str, palette: &Palette) {
    let _ = write!(
        out,
        "{}Subtest Summary: {} passed, {} failed",
        indent,
        palette.pass.apply_to(counts.passed),
        palette.fail.apply_to(counts.failed)
    );
    if counts.skipped > 0 {
        let _ = write!(out, ", {} skipped", palette.skip.apply_to(counts.skipped));
    }
    let _ = writeln!(out, " of {} total", counts.total);
}

/// Dot bar: one dot per subtest up to ten, scaled beyond that
fn write_subtest_progress(
    out: &mut String,
    pkg: &PackageResult,
    children: &[&TestNode],
    palette: &Palette,
) {
    let counts = SubtestCounts::of(pkg, children);
    if counts.total == 0 {
        return;
    }

    let dots = counts.total.min(MAX_PROGRESS_DOTS);
    let green = if counts.total <= MAX_PROGRESS_DOTS {
        counts.passed
    } else {
        counts.passed * MAX_PROGRESS_DOTS / counts.total
    };

    let mut bar = String::with_capacity(dots * 4);
    for i in 0..dots {
        let style = if i < green { &palette.pass } else { &palette.fail };
        let _ = write!(bar, "{}", style.apply_to("•"));
    }
    let _ = writeln!(
        out,
        "    {} {}",
        bar,
        palette.dim.apply_to(format!("{}% passed", counts.pass_percent()))
    );
}

fn write_output(out: &mut String, lines: &[String], indent: &str, verbosity: Verbosity) {
    for line in lines {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }
        if verbosity.unescapes_output() {
            for part in unescape(line).lines() {
                let _ = writeln!(out, "{}{}", indent, part);
            }
        } else {
            let _ = writeln!(out, "{}{}", indent, line);
        }
    }
}

/// Expand literal `\t` and `\n` escape sequences
pub fn unescape(text: &str) -> String {
    text.replace("\\t", "\t").replace("\\n", "\n")
}

fn write_inferred_note(out: &mut String, palette: &Palette) {
    let _ = writeln!(
        out,
        "  {} {}",
        palette.warn.apply_to(WARN_SYMBOL),
        palette
            .warn
            .apply_to("Package never reported a result; failure inferred at end of stream")
    );
}

fn write_package_summary(out: &mut String, pkg: &PackageResult, palette: &Palette) {
    let passed = pkg.count(TestStatus::Pass);
    let skipped = pkg.count(TestStatus::Skip);
    let failed = pkg
        .top_level()
        .chain(pkg.orphans())
        .flat_map(|t| std::iter::once(t).chain(pkg.children(t)))
        .filter(|n| effective_status(pkg, n) == TestStatus::Fail)
        .count();

    let mut line = if failed > 0 {
        palette
            .fail
            .apply_to(format!(
                "{} test{} failed, {} passed",
                failed,
                plural(failed),
                passed
            ))
            .to_string()
    } else if passed > 0 {
        palette
            .pass
            .apply_to(format!("All {} test{} passed", passed, plural(passed)))
            .to_string()
    } else if skipped > 0 {
        palette
            .skip
            .apply_to(format!("{} test{} skipped", skipped, plural(skipped)))
            .to_string()
    } else {
        palette.dim.apply_to("No tests completed").to_string()
    };

    if let Some(coverage) = &pkg.coverage {
        let _ = write!(line, " {}", palette.dim.apply_to(format!("({} coverage)", coverage)));
    }
    let _ = writeln!(out, "  {}", line);
}

/// Final statistics block; never filtered
pub fn render_run_summary(summary: &RunSummary, exit: &ExitReport) -> String {
    let palette = Palette::new();
    let tally = &summary.tally;
    let mut out = String::new();

    let _ = writeln!(out, "\n{}", palette.header.apply_to("Test Results:"));
    let _ = writeln!(out, "  Passed:  {}", palette.pass.apply_to(tally.passed()));
    let _ = writeln!(out, "  Failed:  {}", palette.fail.apply_to(tally.failed()));
    let _ = writeln!(out, "  Skipped: {}", palette.skip.apply_to(tally.skipped()));
    let _ = writeln!(out, "  Total:   {}", tally.total());

    if let Some(coverage) = summary.statement_coverage {
        let _ = writeln!(out, "  Statement Coverage: {:.1}%", coverage);
    }

    if !summary.build_failed.is_empty() {
        let count = summary.build_failed.len();
        let _ = writeln!(
            out,
            "  {} {} package{} failed to build",
            palette.fail.apply_to("Build Failed:"),
            count,
            plural(count)
        );
        for name in &summary.build_failed {
            let _ = writeln!(out, "    • {}", name);
        }
    }

    if !summary.incomplete.is_empty() {
        let count = summary.incomplete.len();
        let _ = writeln!(
            out,
            "  {} {} package{} did not report a result: {}",
            palette.warn.apply_to(WARN_SYMBOL),
            count,
            plural(count),
            summary.incomplete.join(", ")
        );
    }

    let _ = writeln!(
        out,
        "\n{}",
        palette
            .dim
            .apply_to(format!("Tests completed in {:.2}s", summary.elapsed_seconds))
    );

    let exit_line = match exit.kind {
        ExitKind::Success => format!("{} {}", palette.pass.apply_to(PASS_SYMBOL), palette.pass.apply_to(&exit.reason)),
        ExitKind::NoTests => format!("{} {}", palette.skip.apply_to(SKIP_SYMBOL), exit.reason),
        ExitKind::TestFailures => format!("{} {}", palette.fail.apply_to(FAIL_SYMBOL), palette.fail.apply_to(&exit.reason)),
        ExitKind::ProcessFailure | ExitKind::Interrupted => format!(
            "{} {}",
            palette.warn.apply_to(WARN_SYMBOL),
            palette.warn.apply_to(&exit.reason)
        ),
    };
    let _ = writeln!(out, "{}", exit_line);

    out
}

/// One-line progress report for CI logs
pub fn render_heartbeat(progress: &Progress) -> String {
    let tally = &progress.tally;
    let mut line = format!(
        "⏳ {} passed, {} failed, {} skipped; {} package{} done",
        tally.passed(),
        tally.failed(),
        tally.skipped(),
        progress.finished,
        plural(progress.finished)
    );
    if !progress.running.is_empty() {
        let shown: Vec<&str> = progress.running.iter().take(3).map(String::as_str).collect();
        let _ = write!(line, "; running: {}", shown.join(", "));
        if progress.running.len() > shown.len() {
            let _ = write!(line, " (+{} more)", progress.running.len() - shown.len());
        }
    }
    line.push('\n');
    line
}
