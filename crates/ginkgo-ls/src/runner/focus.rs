//
// runner/focus.rs
//
// Focus expressions selecting a node's specs
//

use crate::tree::{NodeKey, NodeKind};

/// Regex for Ginkgo's `-focus` flag that selects exactly the specs under
/// `key`. `None` for the root, which runs the whole package.
pub fn focus_pattern(key: &NodeKey, kind: NodeKind) -> Option<String> {
    if key.is_root() {
        return None;
    }
    let text = regex::escape(&key.full_text());
    match kind {
        NodeKind::Root => None,
        NodeKind::Spec => Some(format!("^{}$", text)),
        NodeKind::Container => Some(format!(r"^{}(\s|$)", text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn test_root_has_no_focus() {
        assert_eq!(focus_pattern(&NodeKey::root(), NodeKind::Root), None);
    }

    #[test]
    fn test_spec_focus_is_anchored() {
        let key = NodeKey::from_names(["Books", "is (available)"]);
        let pattern = focus_pattern(&key, NodeKind::Spec).unwrap();
        let re = Regex::new(&pattern).unwrap();
        assert!(re.is_match("Books is (available)"));
        assert!(!re.is_match("Books is (available) twice"));
        assert!(!re.is_match("Books is xavailablex"));
    }

    #[test]
    fn test_container_focus_selects_descendants_only() {
        let key = NodeKey::from_names(["Books"]);
        let pattern = focus_pattern(&key, NodeKind::Container).unwrap();
        let re = Regex::new(&pattern).unwrap();
        assert!(re.is_match("Books can be lent"));
        assert!(re.is_match("Books"));
        assert!(!re.is_match("Bookshelf holds books"));
        assert!(!re.is_match("Library Books"));
    }
}
