//! Deterministic synthetic outlines for tests and benchmarks.
//!
//! Node ranges follow source order so a generated outline looks like one
//! decoded from a real file.

use tower_lsp::lsp_types::{Position, Range};

use crate::outline::{Outline, OutlineKind, OutlineNode};

/// Shape of a generated outline
#[derive(Debug, Clone, Copy)]
pub struct OutlineFixture {
    /// Containers at each level
    pub containers: usize,
    /// Levels of nested containers
    pub depth: usize,
    /// Specs inside every innermost container
    pub specs_per_container: usize,
}

impl OutlineFixture {
    /// About 30 nodes
    pub fn small() -> Self {
        Self {
            containers: 3,
            depth: 2,
            specs_per_container: 2,
        }
    }

    /// About 1,100 nodes
    pub fn large() -> Self {
        Self {
            containers: 10,
            depth: 2,
            specs_per_container: 10,
        }
    }

    pub fn generate(&self) -> Outline {
        let mut line = 0;
        Outline {
            roots: self.level(0, "", &mut line),
        }
    }

    fn level(&self, depth: usize, prefix: &str, line: &mut u32) -> Vec<OutlineNode> {
        if depth == self.depth {
            return (0..self.specs_per_container)
                .map(|i| spec(&format!("{}spec {}", prefix, i), line))
                .collect();
        }
        (0..self.containers)
            .map(|i| {
                let name = format!("{}group {}", prefix, i);
                let start = *line;
                *line += 1;
                let children = self.level(depth + 1, &format!("{} ", name), line);
                *line += 1;
                container_at(&name, start, *line, children)
            })
            .collect()
    }
}

fn spec(name: &str, line: &mut u32) -> OutlineNode {
    let start = *line;
    *line += 3;
    OutlineNode {
        kind: OutlineKind::Spec,
        name: name.to_string(),
        function: "It".to_string(),
        range: Range::new(Position::new(start, 1), Position::new(start + 2, 2)),
        focused: false,
        pending: false,
        labels: Vec::new(),
        children: Vec::new(),
    }
}

fn container_at(name: &str, start: u32, end: u32, children: Vec<OutlineNode>) -> OutlineNode {
    OutlineNode {
        kind: OutlineKind::Container,
        name: name.to_string(),
        function: "Describe".to_string(),
        range: Range::new(Position::new(start, 0), Position::new(end, 2)),
        focused: false,
        pending: false,
        labels: Vec::new(),
        children,
    }
}

/// One `Describe(container)` holding an `It` per entry of `specs`
pub fn suite_outline(container: &str, specs: &[&str]) -> Outline {
    let mut line = 1;
    let children = specs.iter().map(|s| spec(s, &mut line)).collect();
    Outline {
        roots: vec![container_at(container, 0, line, children)],
    }
}
