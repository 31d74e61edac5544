//
// view/lens.rs
//
// Inline run affordances rendered as code lenses
//

use serde_json::json;
use tower_lsp::lsp_types::{CodeLens, Command, Range, Url};

use crate::tree::{NodeKey, NodeKind, TestTree};

pub const RUN_FROM_LENS_COMMAND: &str = "ginkgo.runNodeFromLens";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAffordance {
    pub range: Range,
    pub key: NodeKey,
    pub label: String,
}

impl InlineAffordance {
    pub fn to_code_lens(&self, uri: &Url) -> CodeLens {
        CodeLens {
            range: self.range,
            command: Some(Command {
                title: self.label.clone(),
                command: RUN_FROM_LENS_COMMAND.to_string(),
                arguments: Some(vec![json!(uri), json!(self.key)]),
            }),
            data: None,
        }
    }
}

/// One affordance per container and spec, in source order
pub fn affordances(tree: &TestTree, enabled: bool) -> Vec<InlineAffordance> {
    if !enabled {
        return Vec::new();
    }

    tree.subtree(tree.root())
        .into_iter()
        .filter_map(|id| {
            let node = tree.get(id);
            let base = match node.kind {
                NodeKind::Root => return None,
                NodeKind::Container => "run container",
                NodeKind::Spec => "run spec",
            };
            let label = match &node.result {
                Some(result) => format!("{} ({})", base, result.status.label()),
                None => base.to_string(),
            };
            Some(InlineAffordance {
                range: Range::new(node.range.start, node.range.start),
                key: node.key.clone(),
                label,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outline::{Outline, OutlineKind, OutlineNode};
    use crate::tree::{merge, RunResult, RunStatus};
    use tower_lsp::lsp_types::Position;

    fn tree() -> TestTree {
        let outline = Outline {
            roots: vec![OutlineNode {
                kind: OutlineKind::Container,
                name: "Books".to_string(),
                function: "Describe".to_string(),
                range: Range::new(Position::new(3, 0), Position::new(20, 2)),
                focused: false,
                pending: false,
                labels: Vec::new(),
                children: vec![OutlineNode {
                    kind: OutlineKind::Spec,
                    name: "can be lent".to_string(),
                    function: "It".to_string(),
                    range: Range::new(Position::new(5, 1), Position::new(8, 3)),
                    focused: false,
                    pending: false,
                    labels: Vec::new(),
                    children: Vec::new(),
                }],
            }],
        };
        merge(None, &outline, "books_test.go").tree
    }

    #[test]
    fn test_one_affordance_per_node_without_root() {
        let tree = tree();
        let lenses = affordances(&tree, true);
        assert_eq!(lenses.len(), 2);
        assert_eq!(lenses[0].label, "run container");
        assert_eq!(lenses[1].label, "run spec");
        assert_eq!(lenses[1].range, Range::new(Position::new(5, 1), Position::new(5, 1)));
    }

    #[test]
    fn test_disabled_is_empty() {
        assert!(affordances(&tree(), false).is_empty());
    }

    #[test]
    fn test_label_carries_status() {
        let mut tree = tree();
        let spec = tree.specs()[0];
        tree.get_mut(spec).result = Some(RunResult::new(RunStatus::Failed));
        let lenses = affordances(&tree, true);
        assert_eq!(lenses[1].label, "run spec (failed)");
    }

    #[test]
    fn test_code_lens_command_arguments() {
        let uri = Url::parse("file:///src/books_test.go").unwrap();
        let lens = affordances(&tree(), true)[1].to_code_lens(&uri);
        let command = lens.command.unwrap();
        assert_eq!(command.command, RUN_FROM_LENS_COMMAND);
        let args = command.arguments.unwrap();
        assert_eq!(args[0], json!("file:///src/books_test.go"));
        assert_eq!(args[1], json!("Books/can be lent"));
    }
}
