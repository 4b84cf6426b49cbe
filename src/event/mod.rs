// Event decoder - one `go test -json` line into a typed lifecycle event

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{PackageStatus, TestStatus};

/// Lifecycle action carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Run,
    Output,
    Pass,
    Fail,
    Skip,
}

impl Action {
    /// Whether this action ends a node's lifecycle
    pub fn is_terminal(self) -> bool {
        matches!(self, Action::Pass | Action::Fail | Action::Skip)
    }

    /// Terminal status for a test node, if any
    pub fn test_status(self) -> Option<TestStatus> {
        match self {
            Action::Pass => Some(TestStatus::Pass),
            Action::Fail => Some(TestStatus::Fail),
            Action::Skip => Some(TestStatus::Skip),
            Action::Start | Action::Run | Action::Output => None,
        }
    }

    /// Terminal status for a package, if any
    pub fn package_status(self) -> Option<PackageStatus> {
        match self {
            Action::Pass => Some(PackageStatus::Pass),
            Action::Fail => Some(PackageStatus::Fail),
            Action::Skip => Some(PackageStatus::Skip),
            Action::Start | Action::Run | Action::Output => None,
        }
    }
}

/// One parsed lifecycle record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestEvent {
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    pub action: Action,
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub test: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub elapsed: Option<f64>,
}

impl TestEvent {
    /// Package-level events carry no test identifier
    pub fn is_package_level(&self) -> bool {
        self.test.is_empty()
    }

    pub fn output_text(&self) -> &str {
        self.output.as_deref().unwrap_or("")
    }
}

/// Decode one raw line. Anything that is not a well-formed event yields `None`.
pub fn decode(line: &[u8]) -> Option<TestEvent> {
    let trimmed = line.trim_ascii();
    if trimmed.first() != Some(&b'{') {
        return None;
    }
    serde_json::from_slice(trimmed).ok()
}

/// String convenience over [`decode`]
pub fn decode_line(line: &str) -> Option<TestEvent> {
    decode(line.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_run_event() {
        let line = r#"{"Time":"2024-05-01T10:00:00.123456+02:00","Action":"run","Package":"example.com/pkg","Test":"TestFoo"}"#;
        let event = decode_line(line).expect("event");
        assert_eq!(event.action, Action::Run);
        assert_eq!(event.package, "example.com/pkg");
        assert_eq!(event.test, "TestFoo");
        assert!(event.time.is_some());
        assert!(!event.is_package_level());
    }

    #[test]
    fn test_decode_terminal_event_with_elapsed() {
        let line = r#"{"Action":"pass","Package":"p","Test":"T/sub","Elapsed":0.25}"#;
        let event = decode_line(line).expect("event");
        assert_eq!(event.action, Action::Pass);
        assert_eq!(event.elapsed, Some(0.25));
        assert_eq!(event.action.test_status(), Some(TestStatus::Pass));
    }

    #[test]
    fn test_decode_package_output() {
        let line = r#"{"Action":"output","Package":"p","Output":"ok  \tp\t0.01s\n"}"#;
        let event = decode_line(line).expect("event");
        assert!(event.is_package_level());
        assert_eq!(event.output_text(), "ok  \tp\t0.01s\n");
    }

    #[test]
    fn test_plain_text_is_not_an_event() {
        assert!(decode_line("# example.com/pkg").is_none());
        assert!(decode_line("").is_none());
        assert!(decode_line("FAIL\texample.com/pkg [build failed]").is_none());
    }

    #[test]
    fn test_unknown_action_is_not_an_event() {
        assert!(decode_line(r#"{"Action":"pause","Package":"p","Test":"T"}"#).is_none());
    }

    #[test]
    fn test_missing_action_is_not_an_event() {
        assert!(decode_line(r#"{"Package":"p","Test":"T"}"#).is_none());
    }

    #[test]
    fn test_invalid_utf8_is_not_an_event() {
        assert!(decode(&[b'{', 0xff, 0xfe, b'}']).is_none());
    }

    #[test]
    fn test_action_terminal_mapping() {
        assert!(Action::Fail.is_terminal());
        assert!(!Action::Output.is_terminal());
        assert_eq!(Action::Skip.package_status(), Some(PackageStatus::Skip));
        assert_eq!(Action::Run.package_status(), None);
    }
}
