//
// view/tree_view.rs
//
// Tree view payloads exchanged with the client
//

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::{Range, Url};

use crate::tree::{NodeId, NodeKey, NodeKind, RunStatus, TestTree, TreeDelta};

/// One node of the tree view with its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeItem {
    pub key: NodeKey,
    pub label: String,
    /// Secondary text: status, duration, flags and labels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: NodeKind,
    pub status: Option<RunStatus>,
    pub range: Range,
    pub expanded: bool,
    pub children: Vec<TreeItem>,
}

/// Status change of a single node, without its subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub key: NodeKey,
    pub status: Option<RunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Params of the `ginkgo/treeChanged` notification.
///
/// `items` replace whole subtrees, `statuses` update single nodes in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeChangedParams {
    pub uri: Url,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<TreeItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<NodeKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<NodeStatus>,
}

impl TreeChangedParams {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.removed.is_empty() && self.statuses.is_empty()
    }
}

pub enum TreeChanged {}

impl Notification for TreeChanged {
    type Params = TreeChangedParams;
    const METHOD: &'static str = "ginkgo/treeChanged";
}

/// Params of the `ginkgo/testTree` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTreeParams {
    pub uri: Url,
}

fn description(tree: &TestTree, id: NodeId) -> Option<String> {
    let node = tree.get(id);
    let mut parts: Vec<String> = Vec::new();
    if let Some(result) = &node.result {
        match result.duration {
            Some(d) => parts.push(format!("{} ({} ms)", result.status.label(), d.as_millis())),
            None => parts.push(result.status.label().to_string()),
        }
    }
    if node.focused {
        parts.push("focused".to_string());
    }
    if node.pending {
        parts.push("pending".to_string());
    }
    if !node.labels.is_empty() {
        parts.push(format!("[{}]", node.labels.join(", ")));
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

pub fn tree_item(tree: &TestTree, id: NodeId) -> TreeItem {
    let node = tree.get(id);
    TreeItem {
        key: node.key.clone(),
        label: node.name.clone(),
        description: description(tree, id),
        kind: node.kind,
        status: node.result.as_ref().map(|r| r.status),
        range: node.range,
        expanded: node.expanded,
        children: node.children.iter().map(|c| tree_item(tree, *c)).collect(),
    }
}

/// Notification for a reconciliation delta
pub fn delta_params(uri: &Url, tree: &TestTree, delta: &TreeDelta) -> TreeChangedParams {
    TreeChangedParams {
        uri: uri.clone(),
        items: delta
            .changed
            .iter()
            .filter_map(|key| tree.find(key))
            .map(|id| tree_item(tree, id))
            .collect(),
        removed: delta.removed.clone(),
        statuses: Vec::new(),
    }
}

/// Notification for run-state changes of `ids`
pub fn status_params(uri: &Url, tree: &TestTree, ids: &[NodeId]) -> TreeChangedParams {
    let mut seen = HashSet::new();
    let statuses = ids
        .iter()
        .filter(|id| seen.insert(**id))
        .map(|id| NodeStatus {
            key: tree.get(*id).key.clone(),
            status: tree.status(*id),
            description: description(tree, *id),
        })
        .collect();
    TreeChangedParams {
        uri: uri.clone(),
        items: Vec::new(),
        removed: Vec::new(),
        statuses,
    }
}

/// Flip a node's expansion state. Returns the new state, `None` for an
/// unknown key or a spec (specs have nothing to expand).
pub fn toggle_expanded(tree: &mut TestTree, key: &NodeKey) -> Option<bool> {
    let id = tree.find(key)?;
    let node = tree.get_mut(id);
    if node.kind == NodeKind::Spec {
        return None;
    }
    node.expanded = !node.expanded;
    Some(node.expanded)
}
