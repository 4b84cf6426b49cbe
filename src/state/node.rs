// Test nodes

use serde::Serialize;

use crate::state::TestStatus;

/// Stable handle of a node inside its package's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A single test or subtest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestNode {
    /// Full identifier as emitted by `go test`, e.g. `TestFoo/case_1`
    pub full_name: String,
    /// Display name: the full name for top-level tests, the path below the parent for subtests
    pub name: String,
    pub status: TestStatus,
    pub elapsed: Option<f64>,
    pub output: Vec<String>,
    pub skip_reason: Option<String>,
    /// First path segment of a subtest's identifier
    pub parent_name: Option<String>,
    #[serde(skip)]
    pub parent: Option<NodeId>,
    #[serde(skip)]
    pub children: Vec<NodeId>,
}

impl TestNode {
    pub(crate) fn new(full_name: &str) -> Self {
        let (parent_name, name) = match split_subtest(full_name) {
            Some((parent, rest)) => (Some(parent.to_string()), rest.to_string()),
            None => (None, full_name.to_string()),
        };

        Self {
            full_name: full_name.to_string(),
            name,
            status: TestStatus::Pending,
            elapsed: None,
            output: Vec::new(),
            skip_reason: None,
            parent_name,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_subtest(&self) -> bool {
        self.parent_name.is_some()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Split `Parent/rest` at the first separator
pub fn split_subtest(full_name: &str) -> Option<(&str, &str)> {
    full_name.split_once('/')
}
