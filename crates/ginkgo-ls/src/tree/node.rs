//
// tree/node.rs
//
// Test node tree shared by the tree view, code lenses and the runner
//

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::Range;

use super::key::NodeKey;
use crate::outline::OutlineKind;

/// Index of a node in its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Identity of one run. Nodes remember the run that last prepared them, so an
/// older run closing late leaves a newer run's nodes alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

impl RunId {
    pub fn fresh() -> Self {
        RunId(NEXT_RUN.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// The whole file / suite
    Root,
    Container,
    Spec,
}

impl From<OutlineKind> for NodeKind {
    fn from(kind: OutlineKind) -> Self {
        match kind {
            OutlineKind::Container => NodeKind::Container,
            OutlineKind::Spec => NodeKind::Spec,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl RunStatus {
    /// Passed, failed and skipped are final for a run
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Passed | RunStatus::Failed | RunStatus::Skipped)
    }

    pub fn label(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Skipped => "skipped",
        }
    }
}

/// Outcome attached to a node by the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub status: RunStatus,
    pub output: Option<String>,
    pub duration: Option<Duration>,
}

impl RunResult {
    pub fn new(status: RunStatus) -> Self {
        Self {
            status,
            output: None,
            duration: None,
        }
    }
}

/// Per-node view state derived from the attached result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Idle,
    PendingRun,
    Running,
    Done(RunResult),
}

#[derive(Debug, Clone)]
pub struct TestNode {
    pub key: NodeKey,
    pub kind: NodeKind,
    pub name: String,
    pub range: Range,
    pub focused: bool,
    pub pending: bool,
    pub labels: Vec<String>,
    pub children: Vec<NodeId>,
    /// Non-owning back-reference; `None` only for the root
    pub parent: Option<NodeId>,
    /// `None` means idle: never run, or reverted
    pub result: Option<RunResult>,
    /// Run that last prepared this node
    pub run: Option<RunId>,
    pub expanded: bool,
}

impl TestNode {
    /// Compare the parts of a node that come from the outline
    pub fn same_shape(&self, other: &TestNode) -> bool {
        self.kind == other.kind
            && self.name == other.name
            && self.range == other.range
            && self.focused == other.focused
            && self.pending == other.pending
            && self.labels == other.labels
    }
}

/// Arena-backed tree of containers and specs for one file.
///
/// Node 0 is always the root. Nodes are only ever added; a re-parse builds a
/// fresh tree through `merge`.
#[derive(Debug, Clone)]
pub struct TestTree {
    nodes: Vec<TestNode>,
    index: HashMap<NodeKey, NodeId>,
}

impl TestTree {
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = TestNode {
            key: NodeKey::root(),
            kind: NodeKind::Root,
            name: root_name.into(),
            range: Range::default(),
            focused: false,
            pending: false,
            labels: Vec::new(),
            children: Vec::new(),
            parent: None,
            result: None,
            run: None,
            expanded: true,
        };
        let mut index = HashMap::new();
        index.insert(NodeKey::root(), NodeId(0));
        Self {
            nodes: vec![root],
            index,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> &TestNode {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut TestNode {
        &mut self.nodes[id.0]
    }

    pub fn find(&self, key: &NodeKey) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the file has no containers or specs
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Append a node under `parent`; the caller supplies a key unique in this tree
    pub fn push_child(&mut self, parent: NodeId, mut node: TestNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        self.index.insert(node.key.clone(), id);
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// `id` and all of its descendants in pre-order
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.get(next).children.iter().rev().copied());
        }
        out
    }

    /// Ancestors of `id`, nearest first, ending at the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.get(id).parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.get(parent).parent;
        }
        out
    }

    /// All specs in source order
    pub fn specs(&self) -> Vec<NodeId> {
        self.subtree(self.root())
            .into_iter()
            .filter(|id| self.get(*id).kind == NodeKind::Spec)
            .collect()
    }

    pub fn node_state(&self, id: NodeId) -> NodeState {
        match &self.get(id).result {
            None => NodeState::Idle,
            Some(result) => match result.status {
                RunStatus::Pending => NodeState::PendingRun,
                RunStatus::Running => NodeState::Running,
                _ => NodeState::Done(result.clone()),
            },
        }
    }

    /// Status of a node, `None` when idle
    pub fn status(&self, id: NodeId) -> Option<RunStatus> {
        self.get(id).result.as_ref().map(|r| r.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(key: NodeKey, kind: NodeKind) -> TestNode {
        let name = key.names().last().unwrap_or_default().to_string();
        TestNode {
            key,
            kind,
            name,
            range: Range::default(),
            focused: false,
            pending: false,
            labels: Vec::new(),
            children: Vec::new(),
            parent: None,
            result: None,
            run: None,
            expanded: false,
        }
    }

    fn sample() -> TestTree {
        let mut tree = TestTree::new("books_test.go");
        let a = tree.push_child(tree.root(), node(NodeKey::from_names(["A"]), NodeKind::Container));
        tree.push_child(a, node(NodeKey::from_names(["A", "B"]), NodeKind::Spec));
        let c = tree.push_child(a, node(NodeKey::from_names(["A", "C"]), NodeKind::Container));
        tree.push_child(c, node(NodeKey::from_names(["A", "C", "D"]), NodeKind::Spec));
        tree
    }

    #[test]
    fn test_find_and_parent_links() {
        let tree = sample();
        let d = tree.find(&NodeKey::from_names(["A", "C", "D"])).unwrap();
        let c = tree.find(&NodeKey::from_names(["A", "C"])).unwrap();
        assert_eq!(tree.get(d).parent, Some(c));
        assert_eq!(tree.ancestors(d).len(), 3);
        assert_eq!(*tree.ancestors(d).last().unwrap(), tree.root());
    }

    #[test]
    fn test_subtree_is_preorder() {
        let tree = sample();
        let names: Vec<_> = tree
            .subtree(tree.root())
            .into_iter()
            .map(|id| tree.get(id).key.to_string())
            .collect();
        assert_eq!(names, vec!["", "A", "A/B", "A/C", "A/C/D"]);
    }

    #[test]
    fn test_specs_and_state() {
        let mut tree = sample();
        assert_eq!(tree.specs().len(), 2);
        let b = tree.find(&NodeKey::from_names(["A", "B"])).unwrap();
        assert_eq!(tree.node_state(b), NodeState::Idle);

        tree.get_mut(b).result = Some(RunResult::new(RunStatus::Running));
        assert_eq!(tree.node_state(b), NodeState::Running);

        tree.get_mut(b).result = Some(RunResult::new(RunStatus::Passed));
        assert_eq!(tree.node_state(b), NodeState::Done(RunResult::new(RunStatus::Passed)));
    }

    #[test]
    fn test_empty_tree() {
        let tree = TestTree::new("empty_test.go");
        assert!(tree.is_empty());
        assert_eq!(tree.specs(), Vec::<NodeId>::new());
    }
}
