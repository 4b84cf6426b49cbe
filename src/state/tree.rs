// Result tree - packages owning an arena of test nodes

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::state::node::TestNode;
use crate::state::{NodeId, PackageStatus, TestStatus};

/// Complete information about one tested package
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageResult {
    pub name: String,
    pub status: PackageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed: Option<f64>,
    /// Package-level output (build errors, `ok`/`FAIL` lines, coverage)
    pub output: Vec<String>,
    pub coverage: Option<String>,
    /// False for packages reporting `[no test files]`
    pub has_tests: bool,
    pub no_test_files: bool,
    /// A package-scoped `FAIL <pkg>` line arrived while no test had failed
    pub failed_without_tests: bool,
    pub build_failed: bool,
    /// Finalized at end of stream rather than by an observed event
    pub synthesized: bool,
    nodes: Vec<TestNode>,
    #[serde(skip)]
    index: HashMap<String, NodeId>,
    #[serde(skip)]
    top_level: Vec<NodeId>,
    #[serde(skip)]
    orphans: Vec<NodeId>,
}

impl PackageResult {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: PackageStatus::Running,
            started_at: None,
            ended_at: None,
            elapsed: None,
            output: Vec::new(),
            coverage: None,
            has_tests: false,
            no_test_files: false,
            failed_without_tests: false,
            build_failed: false,
            synthesized: false,
            nodes: Vec::new(),
            index: HashMap::new(),
            top_level: Vec::new(),
            orphans: Vec::new(),
        }
    }

    /// Idempotent create-or-fetch. Subtests are linked to their parent when it
    /// already exists; otherwise they wait as orphans until the parent shows up.
    pub fn ensure_test(&mut self, full_name: &str) -> NodeId {
        if let Some(&id) = self.index.get(full_name) {
            return id;
        }

        let id = NodeId(self.nodes.len());
        let mut node = TestNode::new(full_name);
        let parent = node
            .parent_name
            .as_deref()
            .and_then(|parent| self.index.get(parent).copied());
        node.parent = parent;
        let is_subtest = node.is_subtest();

        self.nodes.push(node);
        self.index.insert(full_name.to_string(), id);
        self.has_tests = true;

        match (is_subtest, parent) {
            (false, _) => {
                self.top_level.push(id);
                self.adopt_orphans(id);
            }
            (true, Some(parent)) => self.nodes[parent.0].children.push(id),
            (true, None) => {
                debug!(
                    "Subtest {} in {} arrived before its parent test",
                    full_name, self.name
                );
                self.orphans.push(id);
            }
        }

        id
    }

    fn adopt_orphans(&mut self, parent: NodeId) {
        let parent_name = self.nodes[parent.0].full_name.clone();
        let mut remaining = Vec::with_capacity(self.orphans.len());
        for orphan in std::mem::take(&mut self.orphans) {
            if self.nodes[orphan.0].parent_name.as_deref() == Some(parent_name.as_str()) {
                debug!("Adopting {} into {}", self.nodes[orphan.0].full_name, parent_name);
                self.nodes[orphan.0].parent = Some(parent);
                self.nodes[parent.0].children.push(orphan);
            } else {
                remaining.push(orphan);
            }
        }
        self.orphans = remaining;
    }

    /// Set a node's terminal status. Returns false if it was already terminal.
    pub fn finalize_test(
        &mut self,
        id: NodeId,
        status: TestStatus,
        elapsed: Option<f64>,
        retain_failure_output: bool,
    ) -> bool {
        let node = &mut self.nodes[id.0];
        if node.status.is_terminal() || !status.is_terminal() {
            return false;
        }

        node.status = status;
        node.elapsed = elapsed;
        if status != TestStatus::Fail || !retain_failure_output {
            node.output.clear();
            node.output.shrink_to_fit();
        }
        true
    }

    /// Buffer one output fragment. Once the node is terminal, only a failed
    /// node whose output is retained keeps collecting.
    pub fn append_output(&mut self, id: NodeId, line: &str, retain_failure_output: bool) {
        let node = &mut self.nodes[id.0];
        if node.status.is_terminal() && (node.status != TestStatus::Fail || !retain_failure_output) {
            return;
        }
        node.output.push(line.to_string());
    }

    pub fn mark_running(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.0];
        if node.status == TestStatus::Pending {
            node.status = TestStatus::Running;
        }
    }

    pub fn node(&self, id: NodeId) -> &TestNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TestNode {
        &mut self.nodes[id.0]
    }

    pub fn find(&self, full_name: &str) -> Option<&TestNode> {
        self.index.get(full_name).map(|id| &self.nodes[id.0])
    }

    /// Top-level tests in first-`run` order
    pub fn top_level(&self) -> impl Iterator<Item = &TestNode> {
        self.top_level.iter().map(|id| &self.nodes[id.0])
    }

    /// Children of a node in arrival order
    pub fn children<'a>(&'a self, node: &'a TestNode) -> impl Iterator<Item = &'a TestNode> {
        node.children.iter().map(|id| &self.nodes[id.0])
    }

    /// Subtests whose parent never appeared
    pub fn orphans(&self) -> impl Iterator<Item = &TestNode> {
        self.orphans.iter().map(|id| &self.nodes[id.0])
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Count of terminal nodes with the given status, subtests included
    pub fn count(&self, status: TestStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }

    pub fn any_failed(&self) -> bool {
        self.nodes.iter().any(|n| n.status == TestStatus::Fail)
    }

    /// Package failed but no individual test recorded a failure
    pub fn is_process_failure(&self) -> bool {
        self.status == PackageStatus::Fail && !self.any_failed()
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// All packages seen in the stream, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct ResultTree {
    packages: Vec<PackageResult>,
    index: HashMap<String, usize>,
}

impl ResultTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent create-or-fetch
    pub fn ensure_package(&mut self, name: &str) -> &mut PackageResult {
        let idx = match self.index.get(name) {
            Some(&idx) => idx,
            None => {
                self.packages.push(PackageResult::new(name));
                let idx = self.packages.len() - 1;
                self.index.insert(name.to_string(), idx);
                idx
            }
        };
        &mut self.packages[idx]
    }

    pub fn ensure_test(&mut self, package: &str, full_name: &str) -> NodeId {
        self.ensure_package(package).ensure_test(full_name)
    }

    /// Returns true when the node transitioned to `status`
    pub fn finalize(
        &mut self,
        package: &str,
        full_name: &str,
        status: TestStatus,
        elapsed: Option<f64>,
        retain_failure_output: bool,
    ) -> bool {
        let pkg = self.ensure_package(package);
        let id = pkg.ensure_test(full_name);
        pkg.finalize_test(id, status, elapsed, retain_failure_output)
    }

    pub fn package(&self, name: &str) -> Option<&PackageResult> {
        self.index.get(name).map(|&idx| &self.packages[idx])
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageResult> {
        self.packages.iter()
    }

    pub fn packages_mut(&mut self) -> impl Iterator<Item = &mut PackageResult> {
        self.packages.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_package_is_idempotent() {
        let mut tree = ResultTree::new();
        tree.ensure_package("p").coverage = Some("10.0%".to_string());
        tree.ensure_package("p");
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.package("p").unwrap().coverage.as_deref(), Some("10.0%"));
    }

    #[test]
    fn test_subtest_links_to_existing_parent() {
        let mut pkg = PackageResult::new("p");
        let parent = pkg.ensure_test("TestA");
        let child = pkg.ensure_test("TestA/one");

        assert_eq!(pkg.node(child).parent, Some(parent));
        let names: Vec<_> = pkg.children(pkg.node(parent)).map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["one"]);
        assert_eq!(pkg.top_level().count(), 1);
    }

    #[test]
    fn test_orphan_is_adopted_when_parent_arrives() {
        let mut pkg = PackageResult::new("p");
        pkg.ensure_test("TestA/early");
        assert_eq!(pkg.orphans().count(), 1);

        let parent = pkg.ensure_test("TestA");
        assert_eq!(pkg.orphans().count(), 0);
        assert_eq!(pkg.node(parent).children.len(), 1);
    }

    #[test]
    fn test_orphan_without_parent_stays_unreachable() {
        let mut pkg = PackageResult::new("p");
        pkg.ensure_test("TestGhost/sub");
        pkg.ensure_test("TestOther");

        assert_eq!(pkg.orphans().count(), 1);
        assert!(pkg.top_level().all(|n| n.children.is_empty()));
    }

    #[test]
    fn test_finalize_is_write_once() {
        let mut pkg = PackageResult::new("p");
        let id = pkg.ensure_test("TestA");
        assert!(pkg.finalize_test(id, TestStatus::Pass, Some(0.1), true));
        assert!(!pkg.finalize_test(id, TestStatus::Fail, Some(0.2), true));
        assert_eq!(pkg.node(id).status, TestStatus::Pass);
        assert_eq!(pkg.node(id).elapsed, Some(0.1));
    }

    #[test]
    fn test_output_kept_only_for_failures() {
        let mut pkg = PackageResult::new("p");
        let pass = pkg.ensure_test("TestPass");
        let fail = pkg.ensure_test("TestFail");
        pkg.append_output(pass, "noise\n", true);
        pkg.append_output(fail, "boom\n", true);

        pkg.finalize_test(pass, TestStatus::Pass, None, true);
        pkg.finalize_test(fail, TestStatus::Fail, None, true);

        assert!(pkg.node(pass).output.is_empty());
        assert_eq!(pkg.node(fail).output, vec!["boom\n".to_string()]);
    }

    #[test]
    fn test_failure_output_dropped_when_not_retained() {
        let mut pkg = PackageResult::new("p");
        let fail = pkg.ensure_test("TestFail");
        pkg.append_output(fail, "boom\n", false);
        pkg.finalize_test(fail, TestStatus::Fail, None, false);
        assert!(pkg.node(fail).output.is_empty());
    }

    #[test]
    fn test_late_output_dropped_when_failure_output_not_retained() {
        // Arrange
        let mut pkg = PackageResult::new("p");
        let fail = pkg.ensure_test("TestFail");
        pkg.finalize_test(fail, TestStatus::Fail, None, false);

        // Act
        pkg.append_output(fail, "late trace\n", false);

        // Assert
        assert!(pkg.node(fail).output.is_empty());
    }

    #[test]
    fn test_late_output_kept_for_retained_failure() {
        let mut pkg = PackageResult::new("p");
        let fail = pkg.ensure_test("TestFail");
        pkg.finalize_test(fail, TestStatus::Fail, None, true);

        pkg.append_output(fail, "late trace\n", true);

        assert_eq!(pkg.node(fail).output, vec!["late trace\n".to_string()]);
    }

    #[test]
    fn test_parent_status_independent_of_children() {
        let mut tree = ResultTree::new();
        tree.ensure_test("p", "TestA");
        tree.ensure_test("p", "TestA/x");
        tree.finalize("p", "TestA/x", TestStatus::Fail, None, true);
        tree.finalize("p", "TestA", TestStatus::Pass, None, true);

        let pkg = tree.package("p").unwrap();
        assert_eq!(pkg.find("TestA").unwrap().status, TestStatus::Pass);
        assert_eq!(pkg.find("TestA/x").unwrap().status, TestStatus::Fail);
    }
}
