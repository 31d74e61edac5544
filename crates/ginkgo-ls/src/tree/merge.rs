//
// tree/merge.rs
//
// Reconciliation of a fresh outline against the previous tree
//

use std::collections::{HashMap, HashSet};

use super::key::NodeKey;
use super::node::{NodeId, NodeKind, TestNode, TestTree};
use crate::outline::{Outline, OutlineNode};

/// Subtrees that differ between the previous and the merged tree.
///
/// Only the topmost changed node of each differing subtree is listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDelta {
    pub changed: Vec<NodeKey>,
    pub removed: Vec<NodeKey>,
}

impl TreeDelta {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub tree: TestTree,
    pub delta: TreeDelta,
}

/// Build a tree for `outline`, carrying over run results and expansion
/// state from `previous` for every node whose key is unchanged.
///
/// Keys are name paths; same-named siblings are told apart by their ordinal
/// in source order. Nodes of `previous` whose key disappeared are dropped.
pub fn merge(previous: Option<&TestTree>, outline: &Outline, root_name: &str) -> Reconciled {
    let mut tree = TestTree::new(root_name);
    if let Some(prev) = previous {
        let prev_root = prev.get(prev.root());
        let root = tree.root();
        tree.get_mut(root).result = prev_root.result.clone();
        tree.get_mut(root).run = prev_root.run;
        tree.get_mut(root).expanded = prev_root.expanded;
    }

    let root = tree.root();
    add_children(&mut tree, previous, root, &outline.roots);

    let delta = match previous {
        Some(prev) => diff(prev, &tree),
        None => TreeDelta {
            changed: vec![NodeKey::root()],
            removed: Vec::new(),
        },
    };

    log::trace!(
        "Merged outline for {}: {} nodes, {} changed, {} removed",
        root_name,
        tree.len(),
        delta.changed.len(),
        delta.removed.len()
    );

    Reconciled { tree, delta }
}

fn add_children(
    tree: &mut TestTree,
    previous: Option<&TestTree>,
    parent: NodeId,
    children: &[OutlineNode],
) {
    let parent_key = tree.get(parent).key.clone();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for child in children {
        let ordinal = seen.entry(child.name.as_str()).or_insert(0);
        let key = parent_key.child(child.name.clone(), *ordinal);
        *ordinal += 1;

        let carried = previous.and_then(|prev| prev.find(&key).map(|id| prev.get(id)));

        let node = TestNode {
            key,
            kind: NodeKind::from(child.kind),
            name: child.name.clone(),
            range: child.range,
            focused: child.focused,
            pending: child.pending,
            labels: child.labels.clone(),
            children: Vec::new(),
            parent: None,
            result: carried.and_then(|old| old.result.clone()),
            run: carried.and_then(|old| old.run),
            expanded: carried.map(|old| old.expanded).unwrap_or(false),
        };
        let id = tree.push_child(parent, node);
        add_children(tree, previous, id, &child.children);
    }
}

fn diff(previous: &TestTree, merged: &TestTree) -> TreeDelta {
    let mut delta = TreeDelta::default();

    let mut stack = vec![merged.root()];
    while let Some(id) = stack.pop() {
        let node = merged.get(id);
        let changed = match previous.find(&node.key) {
            None => true,
            Some(old_id) => {
                let old = previous.get(old_id);
                !old.same_shape(node) || !same_child_keys(previous, old, merged, node)
            }
        };
        if changed {
            delta.changed.push(node.key.clone());
        } else {
            stack.extend(node.children.iter().rev().copied());
        }
    }

    let removed: HashSet<&NodeKey> = previous
        .ids()
        .map(|id| &previous.get(id).key)
        .filter(|key| merged.find(key).is_none())
        .collect();
    for id in previous.subtree(previous.root()) {
        let key = &previous.get(id).key;
        if !removed.contains(key) {
            continue;
        }
        let parent_removed = key
            .parent()
            .map(|parent| removed.contains(&parent))
            .unwrap_or(false);
        if !parent_removed {
            delta.removed.push(key.clone());
        }
    }

    delta
}

fn same_child_keys(
    previous: &TestTree,
    old: &TestNode,
    merged: &TestTree,
    new: &TestNode,
) -> bool {
    old.children.len() == new.children.len()
        && old
            .children
            .iter()
            .zip(new.children.iter())
            .all(|(a, b)| previous.get(*a).key == merged.get(*b).key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::OutlineKind;
    use crate::tree::node::{RunResult, RunStatus};
    use proptest::prelude::*;
    use tower_lsp::lsp_types::{Position, Range};

    fn spec(name: &str, line: u32) -> OutlineNode {
        OutlineNode {
            kind: OutlineKind::Spec,
            name: name.to_string(),
            function: "It".to_string(),
            range: Range::new(Position::new(line, 0), Position::new(line, 10)),
            focused: false,
            pending: false,
            labels: Vec::new(),
            children: Vec::new(),
        }
    }

    fn container(name: &str, line: u32, children: Vec<OutlineNode>) -> OutlineNode {
        OutlineNode {
            kind: OutlineKind::Container,
            name: name.to_string(),
            function: "Describe".to_string(),
            range: Range::new(Position::new(line, 0), Position::new(line + 10, 0)),
            focused: false,
            pending: false,
            labels: Vec::new(),
            children,
        }
    }

    fn outline(roots: Vec<OutlineNode>) -> Outline {
        Outline { roots }
    }

    fn key(names: &[&str]) -> NodeKey {
        NodeKey::from_names(names.iter().copied())
    }

    fn set_status(tree: &mut TestTree, names: &[&str], status: RunStatus) {
        let id = tree.find(&key(names)).unwrap();
        tree.get_mut(id).result = Some(RunResult::new(status));
    }

    #[test]
    fn test_first_merge_marks_root_changed() {
        let merged = merge(None, &outline(vec![container("A", 0, vec![spec("B", 1)])]), "a_test.go");
        assert_eq!(merged.delta.changed, vec![NodeKey::root()]);
        assert_eq!(merged.tree.len(), 3);
        assert!(merged.tree.find(&key(&["A", "B"])).is_some());
    }

    #[test]
    fn test_added_sibling_keeps_existing_result() {
        let first = merge(None, &outline(vec![container("A", 0, vec![spec("B", 1)])]), "a_test.go");
        let mut tree = first.tree;
        set_status(&mut tree, &["A", "B"], RunStatus::Passed);

        let second = merge(
            Some(&tree),
            &outline(vec![container("A", 0, vec![spec("B", 1), spec("C", 2)])]),
            "a_test.go",
        );

        let b = second.tree.find(&key(&["A", "B"])).unwrap();
        let c = second.tree.find(&key(&["A", "C"])).unwrap();
        assert_eq!(second.tree.status(b), Some(RunStatus::Passed));
        assert_eq!(second.tree.status(c), None);
        // A's child list changed, so A is the topmost changed subtree
        assert_eq!(second.delta.changed, vec![key(&["A"])]);
        assert!(second.delta.removed.is_empty());
    }

    #[test]
    fn test_renamed_spec_is_new_node() {
        let first = merge(None, &outline(vec![container("A", 0, vec![spec("B", 1)])]), "a_test.go");
        let mut tree = first.tree;
        set_status(&mut tree, &["A", "B"], RunStatus::Passed);

        let second = merge(
            Some(&tree),
            &outline(vec![container("A", 0, vec![spec("B2", 1)])]),
            "a_test.go",
        );

        assert!(second.tree.find(&key(&["A", "B"])).is_none());
        let b2 = second.tree.find(&key(&["A", "B2"])).unwrap();
        assert_eq!(second.tree.status(b2), None);
        assert_eq!(second.delta.removed, vec![key(&["A", "B"])]);
    }

    #[test]
    fn test_reordered_containers_keep_results() {
        let first = merge(
            None,
            &outline(vec![
                container("A", 0, vec![spec("x", 1)]),
                container("B", 20, vec![spec("y", 21)]),
            ]),
            "a_test.go",
        );
        let mut tree = first.tree;
        set_status(&mut tree, &["A", "x"], RunStatus::Failed);
        set_status(&mut tree, &["B", "y"], RunStatus::Passed);

        let second = merge(
            Some(&tree),
            &outline(vec![
                container("B", 0, vec![spec("y", 1)]),
                container("A", 20, vec![spec("x", 21)]),
            ]),
            "a_test.go",
        );

        let x = second.tree.find(&key(&["A", "x"])).unwrap();
        let y = second.tree.find(&key(&["B", "y"])).unwrap();
        assert_eq!(second.tree.status(x), Some(RunStatus::Failed));
        assert_eq!(second.tree.status(y), Some(RunStatus::Passed));
    }

    #[test]
    fn test_duplicate_siblings_matched_left_to_right() {
        let first = merge(
            None,
            &outline(vec![container("A", 0, vec![spec("same", 1), spec("same", 2)])]),
            "a_test.go",
        );
        let mut tree = first.tree;
        let second_dup = NodeKey::root().child("A", 0).child("same", 1);
        let id = tree.find(&second_dup).unwrap();
        tree.get_mut(id).result = Some(RunResult::new(RunStatus::Failed));

        let merged = merge(
            Some(&tree),
            &outline(vec![container("A", 0, vec![spec("same", 1), spec("same", 2)])]),
            "a_test.go",
        );
        let first_dup = merged.tree.find(&NodeKey::root().child("A", 0).child("same", 0)).unwrap();
        let second_id = merged.tree.find(&second_dup).unwrap();
        assert_eq!(merged.tree.status(first_dup), None);
        assert_eq!(merged.tree.status(second_id), Some(RunStatus::Failed));
    }

    #[test]
    fn test_unchanged_outline_has_empty_delta_and_keeps_expansion() {
        let shape = outline(vec![container("A", 0, vec![spec("B", 1)])]);
        let mut tree = merge(None, &shape, "a_test.go").tree;
        let a = tree.find(&key(&["A"])).unwrap();
        tree.get_mut(a).expanded = true;

        let merged = merge(Some(&tree), &shape, "a_test.go");
        assert!(merged.delta.is_empty());
        let a = merged.tree.find(&key(&["A"])).unwrap();
        assert!(merged.tree.get(a).expanded);
    }

    #[test]
    fn test_moved_range_is_changed() {
        let tree = merge(None, &outline(vec![container("A", 0, vec![spec("B", 1)])]), "a_test.go").tree;
        let merged = merge(
            Some(&tree),
            &outline(vec![container("A", 0, vec![spec("B", 3)])]),
            "a_test.go",
        );
        assert_eq!(merged.delta.changed, vec![key(&["A", "B"])]);
    }

    #[test]
    fn test_removed_subtree_listed_once() {
        let tree = merge(
            None,
            &outline(vec![container("A", 0, vec![container("C", 2, vec![spec("D", 3)])])]),
            "a_test.go",
        )
        .tree;
        let merged = merge(Some(&tree), &outline(vec![container("A", 0, vec![])]), "a_test.go");
        assert_eq!(merged.delta.removed, vec![key(&["A", "C"])]);
    }

    proptest! {
        /// Every surviving key keeps its result; every new key starts idle
        #[test]
        fn prop_results_follow_keys(
            before in prop::collection::vec("[a-d]", 0..6),
            after in prop::collection::vec("[a-d]", 0..6),
        ) {
            let make = |names: &[String]| outline(vec![container(
                "Suite",
                0,
                names.iter().enumerate().map(|(i, n)| spec(n, i as u32 + 1)).collect(),
            )]);

            let mut tree = merge(None, &make(&before), "a_test.go").tree;
            for id in tree.specs() {
                tree.get_mut(id).result = Some(RunResult::new(RunStatus::Passed));
            }

            let merged = merge(Some(&tree), &make(&after), "a_test.go").tree;
            for id in merged.specs() {
                let node = merged.get(id);
                let existed = tree.find(&node.key).is_some();
                prop_assert_eq!(merged.status(id).is_some(), existed);
            }
        }
    }
}
