// Tests for the display filter and console renderer - public API only

use std::io::Write;
use std::sync::{Arc, Mutex};

use gotally::aggregator::Aggregator;
use gotally::config::{ShowFilter, Verbosity};
use gotally::decode_line;
use gotally::execution::{ProcessExit, classify};
use gotally::report::{
    ConsoleReporter, RenderOptions, Reporter, SummaryJsonReporter, render_package,
    render_run_summary, should_show,
};
use gotally::state::{PackageResult, TestStatus};

const MIXED_RUN: &[&str] = &[
    r#"{"Action":"start","Package":"mix"}"#,
    r#"{"Action":"run","Package":"mix","Test":"TestPass"}"#,
    r#"{"Action":"pass","Package":"mix","Test":"TestPass","Elapsed":0.01}"#,
    r#"{"Action":"run","Package":"mix","Test":"TestSkip"}"#,
    r#"{"Action":"skip","Package":"mix","Test":"TestSkip","Elapsed":0}"#,
    r#"{"Action":"run","Package":"mix","Test":"T2"}"#,
    r#"{"Action":"run","Package":"mix","Test":"T2/a"}"#,
    r#"{"Action":"pass","Package":"mix","Test":"T2/a","Elapsed":0.01}"#,
    r#"{"Action":"run","Package":"mix","Test":"T2/b"}"#,
    r#"{"Action":"output","Package":"mix","Test":"T2/b","Output":"    mix_test.go:20: want 1\\tgot 2\n"}"#,
    r#"{"Action":"fail","Package":"mix","Test":"T2/b","Elapsed":0.01}"#,
    r#"{"Action":"fail","Package":"mix","Test":"T2","Elapsed":0.02}"#,
    r#"{"Action":"output","Package":"mix","Output":"coverage: 61.5% of statements\n"}"#,
    r#"{"Action":"fail","Package":"mix","Elapsed":0.05}"#,
];

fn finished_package(lines: &[&str], filter: ShowFilter) -> PackageResult {
    console::set_colors_enabled_stderr(false);
    let agg = Aggregator::for_filter(filter);
    let mut done = lines
        .iter()
        .filter_map(|line| decode_line(line))
        .filter_map(|event| agg.process_event(&event))
        .collect::<Vec<_>>();
    done.extend(agg.finalize());
    done.pop().unwrap()
}

fn options(filter: ShowFilter) -> RenderOptions {
    RenderOptions {
        filter,
        verbosity: Verbosity::Standard,
        test_filter: None,
    }
}

fn lines_starting_with(text: &str, symbol: &str) -> usize {
    text.lines()
        .filter(|line| line.trim_start().starts_with(symbol))
        .count()
}

#[test]
fn test_should_show_all_and_none() {
    for status in [TestStatus::Pass, TestStatus::Fail, TestStatus::Skip] {
        assert!(should_show(ShowFilter::All, status));
        assert!(!should_show(ShowFilter::None, status));
    }
}

#[test]
fn test_failed_filter_renders_no_pass_lines() {
    // Arrange
    let pkg = finished_package(MIXED_RUN, ShowFilter::Failed);

    // Act
    let text = render_package(&pkg, &options(ShowFilter::Failed));

    // Assert
    assert_eq!(lines_starting_with(&text, "✔"), 0);
    assert_eq!(lines_starting_with(&text, "⊘"), 0);
    assert!(text.contains("✘ T2"));
    assert!(!text.contains("TestPass"));
}

#[test]
fn test_failed_filter_shows_subtest_breakdown() {
    // Arrange
    let pkg = finished_package(MIXED_RUN, ShowFilter::Failed);

    // Act
    let text = render_package(&pkg, &options(ShowFilter::Failed));

    // Assert
    assert!(text.contains("Subtest Summary: 1 passed, 1 failed of 2 total"));
    let passed_at = text.find("Passed:").unwrap();
    let failed_at = text.find("Failed:").unwrap();
    let a_at = text.find("• a").unwrap();
    let b_at = text.find("• b").unwrap();
    assert!(passed_at < a_at && a_at < failed_at);
    assert!(failed_at < b_at);
    assert!(text.contains("want 1\\tgot 2"));
}

#[test]
fn test_all_filter_renders_one_line_per_terminal_node() {
    // Arrange
    let pkg = finished_package(MIXED_RUN, ShowFilter::All);

    // Act
    let text = render_package(&pkg, &options(ShowFilter::All));

    // Assert: TestPass, T2/a pass; TestSkip skip; T2, T2/b fail
    assert_eq!(lines_starting_with(&text, "✔"), 2);
    assert_eq!(lines_starting_with(&text, "⊘"), 1);
    assert_eq!(lines_starting_with(&text, "✘"), 2);
    assert!(text.contains("    ✔ a"));
    assert!(text.contains("    ✘ b"));
}

#[test]
fn test_package_summary_line_never_filtered() {
    // Arrange
    let pkg = finished_package(MIXED_RUN, ShowFilter::None);

    // Act
    let text = render_package(&pkg, &options(ShowFilter::None));

    // Assert
    assert!(text.contains("▶ mix"));
    assert!(text.contains("2 tests failed, 2 passed (61.5% coverage)"));
    assert_eq!(lines_starting_with(&text, "✘"), 0);
}

#[test]
fn test_with_output_unescapes_failure_output() {
    // Arrange
    let pkg = finished_package(MIXED_RUN, ShowFilter::All);
    let opts = RenderOptions {
        verbosity: Verbosity::WithOutput,
        ..options(ShowFilter::All)
    };

    // Act
    let text = render_package(&pkg, &opts);

    // Assert
    assert!(text.contains("want 1\tgot 2"));
}

#[test]
fn test_minimal_verbosity_hides_output() {
    let pkg = finished_package(MIXED_RUN, ShowFilter::Failed);
    let opts = RenderOptions {
        verbosity: Verbosity::Minimal,
        ..options(ShowFilter::Failed)
    };

    let text = render_package(&pkg, &opts);

    assert!(!text.contains("want 1"));
    assert!(text.contains("✘ T2"));
}

#[test]
fn test_run_summary_block() {
    // Arrange
    console::set_colors_enabled_stderr(false);
    let agg = Aggregator::default();
    for line in MIXED_RUN {
        if let Some(event) = decode_line(line) {
            agg.process_event(&event);
        }
    }
    let summary = agg.snapshot();
    let report = classify(ProcessExit::Code(1), &summary, "");

    // Act
    let text = render_run_summary(&summary, &report);

    // Assert
    assert!(text.contains("Test Results:"));
    assert!(text.contains("Passed:  2"));
    assert!(text.contains("Failed:  2"));
    assert!(text.contains("Skipped: 1"));
    assert!(text.contains("Total:   5"));
    assert!(text.contains("Statement Coverage: 61.5%"));
    assert!(text.contains("Tests completed in"));
    assert!(text.contains("2 tests failed"));
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_console_reporter_renders_each_package_once() {
    // Arrange
    let buffer = SharedBuffer::default();
    let reporter = ConsoleReporter::with_writer(options(ShowFilter::All), Box::new(buffer.clone()));
    let pkg = finished_package(MIXED_RUN, ShowFilter::All);

    // Act
    reporter.on_package_complete(&pkg).unwrap();
    reporter.on_package_complete(&pkg).unwrap();

    // Assert
    let written = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    assert_eq!(written.matches("▶ mix").count(), 1);
}

#[test]
fn test_summary_json_reporter_writes_file() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.json");
    let agg = Aggregator::default();
    for line in MIXED_RUN {
        if let Some(event) = decode_line(line) {
            agg.process_event(&event);
        }
    }
    let summary = agg.snapshot();
    let report = classify(ProcessExit::Code(1), &summary, "");
    let reporter = SummaryJsonReporter::new(path.clone());

    // Act
    reporter.on_run_end(&summary, &report).unwrap();

    // Assert
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["tally"]["failed"], 2);
    assert_eq!(value["exit"]["kind"], "test_failures");
    assert_eq!(value["packages"][0]["name"], "mix");
}
