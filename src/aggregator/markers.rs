// Recognizers for the free-text markers `go test` embeds in output events

use once_cell::sync::Lazy;
use regex::Regex;

static COVERAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"coverage:\s+(\d+(?:\.\d+)?)%").expect("valid coverage regex"));

static FILE_LINE_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\S+\.go:\d+:\s*").expect("valid file:line regex"));

const SKIP_MARKERS: [(&str, usize); 4] = [
    ("SKIP:", 5),
    ("SKIP ", 5),
    ("skipping:", 9),
    ("Skipping ", 9),
];

/// `?   \tpkg\t[no test files]`
pub fn is_no_test_files(output: &str) -> bool {
    output.contains("[no test files]")
}

/// Compile or TestMain setup failure reported at package scope
pub fn is_build_failure(output: &str) -> bool {
    output.contains("[build failed]") || output.contains("[setup failed]")
}

/// Package-scoped `FAIL\t<pkg>\t0.12s` summary line
pub fn is_package_fail_line(output: &str, package: &str) -> bool {
    let mut fields = output.split_whitespace();
    fields.next() == Some("FAIL") && fields.next() == Some(package)
}

/// Coverage percentage from `coverage: 75.0% of statements`
pub fn coverage(output: &str) -> Option<String> {
    if !output.contains("coverage:") {
        return None;
    }
    if output.contains("coverage: [no statements]") {
        return Some("0.0%".to_string());
    }
    COVERAGE_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| format!("{}%", m.as_str()))
}

/// Parse a percentage string such as `85.5%` or `90.0% of statements`
pub fn parse_percentage(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let number = trimmed.split('%').next()?.trim();
    if number.is_empty() || !trimmed.contains('%') {
        return None;
    }
    number.parse().ok()
}

/// Reason text from a `t.Skip` output line, if the line carries one
pub fn skip_reason(output: &str) -> Option<String> {
    let trimmed = output.trim();
    if trimmed.starts_with("---") {
        return None;
    }

    let has_marker = SKIP_MARKERS.iter().any(|(m, _)| trimmed.contains(m))
        || trimmed.contains("Skip(")
        || trimmed.contains("Skipf(");
    if !has_marker {
        return None;
    }

    let mut reason = FILE_LINE_PREFIX_RE.replace(trimmed, "").into_owned();
    for (marker, len) in SKIP_MARKERS {
        if let Some(idx) = reason.find(marker) {
            reason = reason[idx + len..].trim().to_string();
            break;
        }
    }

    if reason.is_empty() || reason.starts_with("---") {
        None
    } else {
        Some(reason)
    }
}
