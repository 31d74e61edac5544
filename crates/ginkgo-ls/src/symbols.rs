//
// symbols.rs
//
// Document symbols for go-to-symbol
//

use tower_lsp::lsp_types::{DocumentSymbol, SymbolKind};

use crate::tree::{NodeId, NodeKind, TestTree};

/// Containers and specs as a symbol hierarchy. The root is not a symbol.
pub fn document_symbols(tree: &TestTree) -> Vec<DocumentSymbol> {
    tree.get(tree.root())
        .children
        .iter()
        .map(|id| symbol(tree, *id))
        .collect()
}

#[allow(deprecated)]
fn symbol(tree: &TestTree, id: NodeId) -> DocumentSymbol {
    let node = tree.get(id);
    let kind = match node.kind {
        NodeKind::Spec => SymbolKind::METHOD,
        NodeKind::Container | NodeKind::Root => SymbolKind::NAMESPACE,
    };
    DocumentSymbol {
        name: if node.name.is_empty() {
            "<unnamed>".to_string()
        } else {
            node.name.clone()
        },
        detail: node.result.as_ref().map(|r| r.status.label().to_string()),
        kind,
        tags: None,
        deprecated: None,
        range: node.range,
        selection_range: node.range,
        children: (!node.children.is_empty())
            .then(|| node.children.iter().map(|c| symbol(tree, *c)).collect()),
    }
}
