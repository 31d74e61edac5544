//
// runner/session.rs
//
// Per-run bookkeeping that applies runner events to a test tree
//

use std::collections::HashMap;

use super::record::{RunnerRecord, SpecRecord, SuiteRecord};
use super::RunEvent;
use crate::tree::{NodeId, NodeKey, RunId, RunResult, TestTree};

/// State of one run over one tree.
///
/// The scope is held by key rather than id: the document may be re-parsed
/// while the run is in flight, and the tree it applies to is then a newly
/// merged one.
#[derive(Debug)]
pub struct RunSession {
    scope: NodeKey,
    run: RunId,
    /// How many in-scope records were seen per name path, for duplicate names
    seen: HashMap<Vec<String>, usize>,
    summary: Option<SuiteRecord>,
    output: Vec<String>,
    records: usize,
    malformed: usize,
    finished: bool,
}

impl RunSession {
    /// Start a run over `scope`, marking it and its descendants pending
    pub fn begin(tree: &mut TestTree, scope: NodeId) -> (Self, Vec<NodeId>) {
        let run = RunId::fresh();
        let changed = tree.prepare_to_run(scope, run);
        let session = Self {
            scope: tree.get(scope).key.clone(),
            run,
            seen: HashMap::new(),
            summary: None,
            output: Vec::new(),
            records: 0,
            malformed: 0,
            finished: false,
        };
        (session, changed)
    }

    pub fn scope(&self) -> &NodeKey {
        &self.scope
    }

    pub fn summary(&self) -> Option<&SuiteRecord> {
        self.summary.as_ref()
    }

    /// Non-record output lines in arrival order
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn malformed(&self) -> usize {
        self.malformed
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Apply one event, returning the nodes whose state changed
    pub fn apply(&mut self, tree: &mut TestTree, event: &RunEvent) -> Vec<NodeId> {
        match event {
            RunEvent::Started => match tree.find(&self.scope) {
                Some(scope) => tree.mark_running(scope, self.run),
                None => Vec::new(),
            },
            RunEvent::Record(RunnerRecord::Spec(spec)) => self.apply_spec(tree, spec),
            RunEvent::Record(RunnerRecord::Suite(suite)) => {
                log::info!(
                    "Suite '{}' finished: success={} passed={} failed={} skipped={}",
                    suite.description,
                    suite.success,
                    suite.passed,
                    suite.failed,
                    suite.skipped
                );
                self.summary = Some(suite.clone());
                Vec::new()
            }
            RunEvent::Malformed(_) => {
                self.malformed += 1;
                Vec::new()
            }
            RunEvent::Output(line) => {
                self.output.push(line.clone());
                Vec::new()
            }
            RunEvent::Exited { .. } => self.finish(tree),
        }
    }

    fn apply_spec(&mut self, tree: &mut TestTree, spec: &SpecRecord) -> Vec<NodeId> {
        let Some(status) = spec.status() else {
            return Vec::new();
        };
        self.records += 1;

        // The package run also reports specs of sibling files
        if let Some(file) = spec.file_name() {
            if file != tree.get(tree.root()).name {
                log::trace!("Skipping runner record from {}", file);
                return Vec::new();
            }
        }
        let Some(scope) = tree.find(&self.scope) else {
            return Vec::new();
        };

        let names = spec.names();
        let candidates = tree.specs_named(scope, &names);
        if candidates.is_empty() {
            log::trace!("No spec in '{}' matches runner record {:?}", self.scope, names);
            return Vec::new();
        }
        let occurrence = self.seen.entry(names.clone()).or_insert(0);
        let nth = *occurrence;
        *occurrence += 1;

        let Some(id) = candidates.get(nth).copied() else {
            log::trace!("Runner record {:?} (#{}) has no matching spec", names, nth);
            return Vec::new();
        };
        if !tree.is_claimed_by(id, self.run) {
            log::trace!("Spec {:?} belongs to a later run", names);
            return Vec::new();
        }

        let result = RunResult {
            status,
            output: spec.captured_output(),
            duration: spec.duration(),
        };
        tree.apply_spec_result(id, result)
    }

    /// Close the run: unfinished specs in scope become skipped and containers
    /// settle. Idempotent.
    pub fn finish(&mut self, tree: &mut TestTree) -> Vec<NodeId> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let Some(scope) = tree.find(&self.scope) else {
            return Vec::new();
        };
        let mut changed = tree.finish_run(scope, self.run);

        // Containers have no output of their own; show the raw run log instead
        if !self.output.is_empty() && tree.is_claimed_by(scope, self.run) {
            if let Some(result) = tree.get_mut(scope).result.as_mut() {
                if result.output.is_none() {
                    result.output = Some(self.output.join("\n"));
                    if !changed.contains(&scope) {
                        changed.push(scope);
                    }
                }
            }
        }

        log::info!(
            "Run over '{}' finished: {} records, {} malformed",
            self.scope,
            self.records,
            self.malformed
        );
        changed
    }

    /// The run never started: return its nodes to idle
    pub fn abort(&mut self, tree: &mut TestTree) -> Vec<NodeId> {
        self.finished = true;
        match tree.find(&self.scope) {
            Some(scope) => tree.revert_pending(scope, self.run),
            None => Vec::new(),
        }
    }
}
