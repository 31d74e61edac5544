//
// tree/run.rs
//
// Run-state transitions applied to a test tree
//

use std::time::Duration;

use super::node::{NodeId, NodeKind, RunId, RunResult, RunStatus, TestTree};

impl TestTree {
    /// Mark `id` and all of its descendants pending for `run`, dropping
    /// earlier output.
    ///
    /// Returns the nodes whose state changed.
    pub fn prepare_to_run(&mut self, id: NodeId, run: RunId) -> Vec<NodeId> {
        let subtree = self.subtree(id);
        for node in &subtree {
            let node = self.get_mut(*node);
            node.result = Some(RunResult::new(RunStatus::Pending));
            node.run = Some(run);
        }
        subtree
    }

    pub fn is_claimed_by(&self, id: NodeId, run: RunId) -> bool {
        self.get(id).run == Some(run)
    }

    /// Move every pending node of `run` under `scope` to running
    pub fn mark_running(&mut self, scope: NodeId, run: RunId) -> Vec<NodeId> {
        let mut changed = Vec::new();
        for id in self.subtree(scope) {
            if !self.is_claimed_by(id, run) {
                continue;
            }
            if let Some(result) = self.get_mut(id).result.as_mut() {
                if result.status == RunStatus::Pending {
                    result.status = RunStatus::Running;
                    changed.push(id);
                }
            }
        }
        changed
    }

    /// Return unfinished nodes of `run` under `scope` to idle (the run never
    /// started)
    pub fn revert_pending(&mut self, scope: NodeId, run: RunId) -> Vec<NodeId> {
        let mut changed = Vec::new();
        for id in self.subtree(scope) {
            if !self.is_claimed_by(id, run) {
                continue;
            }
            let node = self.get_mut(id);
            let unfinished = node
                .result
                .as_ref()
                .map(|r| !r.status.is_terminal())
                .unwrap_or(false);
            if unfinished {
                node.result = None;
                changed.push(id);
            }
        }
        changed
    }

    /// Specs under `scope` (in source order) whose name path is `names`
    pub fn specs_named(&self, scope: NodeId, names: &[String]) -> Vec<NodeId> {
        self.subtree(scope)
            .into_iter()
            .filter(|id| {
                let node = self.get(*id);
                node.kind == NodeKind::Spec
                    && node.key.depth() == names.len()
                    && node.key.names().zip(names.iter()).all(|(a, b)| a == b)
            })
            .collect()
    }

    /// Find the `occurrence`-th spec under `scope` whose name path is `names`
    pub fn find_spec_by_names(&self, scope: NodeId, names: &[String], occurrence: usize) -> Option<NodeId> {
        self.specs_named(scope, names).get(occurrence).copied()
    }

    /// Record the outcome of one spec and settle any ancestor whose children
    /// are now all finished. A later result for the same spec overwrites an
    /// earlier one.
    ///
    /// Returns the nodes whose state changed; empty when `spec` is not in
    /// this tree's run.
    pub fn apply_spec_result(&mut self, spec: NodeId, result: RunResult) -> Vec<NodeId> {
        let mut changed = vec![spec];
        self.get_mut(spec).result = Some(result);

        for ancestor in self.ancestors(spec) {
            let Some(aggregate) = self.aggregate(ancestor) else {
                continue;
            };
            let node = self.get_mut(ancestor);
            if node.result.as_ref() != Some(&aggregate) {
                node.result = Some(aggregate);
                changed.push(ancestor);
            }
        }
        changed
    }

    /// Close `run` over `scope`: its unfinished specs become skipped and every
    /// container is settled from its children, bottom-up. Ancestors of the
    /// scope are re-aggregated as well. Nodes a later run has prepared keep
    /// their state.
    pub fn finish_run(&mut self, scope: NodeId, run: RunId) -> Vec<NodeId> {
        let mut changed = Vec::new();
        let subtree = self.subtree(scope);

        for id in &subtree {
            if !self.is_claimed_by(*id, run) {
                continue;
            }
            let node = self.get_mut(*id);
            let is_leaf = node.kind == NodeKind::Spec || node.children.is_empty();
            if !is_leaf {
                continue;
            }
            if let Some(result) = node.result.as_mut() {
                if !result.status.is_terminal() {
                    result.status = RunStatus::Skipped;
                    changed.push(*id);
                }
            }
        }

        // Reverse pre-order visits children before their parents
        let containers = subtree
            .iter()
            .rev()
            .copied()
            .filter(|id| !self.get(*id).children.is_empty());
        let containers: Vec<NodeId> = containers.chain(self.ancestors(scope)).collect();
        for id in containers {
            if let Some(aggregate) = self.aggregate(id) {
                let node = self.get_mut(id);
                if node.result.as_ref() != Some(&aggregate) {
                    node.result = Some(aggregate);
                    changed.push(id);
                }
            }
        }

        changed.sort();
        changed.dedup();
        changed
    }

    /// Combined result of a container's children, ignoring idle children.
    ///
    /// `None` while any child is still pending or running, or when no child
    /// has a result at all.
    pub fn aggregate(&self, id: NodeId) -> Option<RunResult> {
        let mut any = false;
        let mut failed = false;
        let mut passed = false;
        let mut total = Duration::ZERO;
        let mut timed = false;

        for child in &self.get(id).children {
            let Some(result) = &self.get(*child).result else {
                continue;
            };
            any = true;
            match result.status {
                RunStatus::Pending | RunStatus::Running => return None,
                RunStatus::Failed => failed = true,
                RunStatus::Passed => passed = true,
                RunStatus::Skipped => {}
            }
            if let Some(d) = result.duration {
                total += d;
                timed = true;
            }
        }

        if !any {
            return None;
        }

        let status = if failed {
            RunStatus::Failed
        } else if passed {
            RunStatus::Passed
        } else {
            RunStatus::Skipped
        };
        Some(RunResult {
            status,
            output: None,
            duration: timed.then_some(total),
        })
    }
}
