//
// pipeline.rs
//
// Refresh and run orchestration over the shared state
//

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tower_lsp::lsp_types::{MessageType, Url};
use tower_lsp::Client;

use crate::error::{OutlineError, RunnerError};
use crate::runner::{focus_pattern, CoverageReport, RunEvent, RunRequest, RunSession};
use crate::state::{file_path, WorldState};
use crate::tool::package_dir;
use crate::tree::NodeKey;
use crate::view::{
    debounce, status_params, toggle_expanded, tree_item, ClickAction, RefreshTrigger, TreeChanged,
    TreeChangedParams,
};

pub type SharedState = Arc<RwLock<WorldState>>;

pub const INSTALL_COMMAND: &str = "go install github.com/onsi/ginkgo/v2/ginkgo@latest";

/// Where the pipelines send what the user sees
#[async_trait]
pub trait ClientSink: Send + Sync {
    async fn tree_changed(&self, params: TreeChangedParams);
    /// Output panel
    async fn log(&self, typ: MessageType, message: String);
    /// User-facing popup
    async fn show(&self, typ: MessageType, message: String);
    async fn refresh_code_lenses(&self);
}

#[async_trait]
impl ClientSink for Client {
    async fn tree_changed(&self, params: TreeChangedParams) {
        self.send_notification::<TreeChanged>(params).await;
    }

    async fn log(&self, typ: MessageType, message: String) {
        self.log_message(typ, message).await;
    }

    async fn show(&self, typ: MessageType, message: String) {
        self.show_message(typ, message).await;
    }

    async fn refresh_code_lenses(&self) {
        if let Err(e) = self.code_lens_refresh().await {
            log::trace!("Code lens refresh failed: {}", e);
        }
    }
}

async fn refresh_lenses<S: ClientSink + ?Sized>(state: &SharedState, sink: &S) {
    let supported = {
        let state = state.read().await;
        state.code_lens_refresh_supported
    };
    if supported {
        sink.refresh_code_lenses().await;
    }
}

/// Re-outline an open document and publish what changed.
///
/// Change triggers are debounced; a newer trigger for the same document
/// supersedes this one. Returns true when the tree changed.
pub async fn refresh_document<S: ClientSink + ?Sized>(
    state: &SharedState,
    sink: &S,
    uri: &Url,
    trigger: RefreshTrigger,
) -> bool {
    let (ticket, delay, scheduler) = {
        let state = state.read().await;
        if !state.config.refresh_mode.accepts(trigger) {
            log::trace!(
                "Ignoring {:?} for {} in {:?} mode",
                trigger,
                uri,
                state.config.refresh_mode
            );
            return false;
        }
        if !state.documents.contains_key(uri) {
            return false;
        }
        let delay = match trigger {
            RefreshTrigger::Change => state.config.debounce(),
            _ => Duration::ZERO,
        };
        (state.refresh.schedule(uri.clone()), delay, state.refresh.clone())
    };

    if !debounce(&ticket, delay).await {
        log::trace!("Refresh of {} superseded", uri);
        return false;
    }

    let _timing = crate::perf::TimingGuard::new("refresh");

    // Read the text after the debounce so the latest edit is outlined
    let (request, cache) = {
        let state = state.read().await;
        match state.outline_request(uri) {
            Some(request) => (request, state.outline_cache.clone()),
            None => {
                scheduler.complete(uri, &ticket);
                return false;
            }
        }
    };

    let result = cache.get_outline(&request).await;
    scheduler.complete(uri, &ticket);
    if ticket.token.is_cancelled() {
        log::trace!("Dropping outline of {}: document changed or closed", uri);
        return false;
    }

    match result {
        Ok(outline) => {
            let params = {
                let mut state = state.write().await;
                state.apply_outline(uri, &outline)
            };
            match params {
                Some(params) => {
                    sink.tree_changed(params).await;
                    refresh_lenses(state, sink).await;
                    true
                }
                None => false,
            }
        }
        Err(err) => {
            report_outline_error(state, sink, uri, &err).await;
            false
        }
    }
}

async fn report_outline_error<S: ClientSink + ?Sized>(
    state: &SharedState,
    sink: &S,
    uri: &Url,
    err: &OutlineError,
) {
    log::warn!("Outline of {} failed: {}", uri, err);
    sink.log(MessageType::ERROR, format!("Could not outline {}: {}", uri, err))
        .await;
    if let OutlineError::ToolNotFound { path } = err {
        offer_install(state, sink, path).await;
    }
}

async fn offer_install<S: ClientSink + ?Sized>(state: &SharedState, sink: &S, path: &Path) {
    let first = {
        let mut state = state.write().await;
        state.install_offered.insert(path.to_path_buf())
    };
    if first {
        sink.show(
            MessageType::WARNING,
            format!(
                "Ginkgo was not found at '{}'. Install it with `{}` or set ginkgo.path.",
                path.display(),
                INSTALL_COMMAND
            ),
        )
        .await;
    }
}

async fn report_runner_error<S: ClientSink + ?Sized>(state: &SharedState, sink: &S, err: &RunnerError) {
    log::warn!("Test run failed: {}", err);
    match err {
        RunnerError::ToolNotFound { path } => offer_install(state, sink, path).await,
        _ => sink.show(MessageType::ERROR, err.to_string()).await,
    }
}

/// Run the node `key` of an open document and stream results into its tree.
///
/// Returns false when nothing ran: unknown node, or the runner could not
/// be started (the node is back to idle and one message was shown).
pub async fn run_node<S: ClientSink + ?Sized>(state: &SharedState, sink: &S, uri: &Url, key: &NodeKey) -> bool {
    let has_tree = state.read().await.tree(uri).is_some();
    if !has_tree {
        refresh_document(state, sink, uri, RefreshTrigger::Manual).await;
    }

    let prepared = {
        let mut guard = state.write().await;
        let runner = guard.runner();
        let prepared = guard.tree_mut(uri).and_then(|tree| {
            let id = tree.find(key)?;
            let node = tree.get(id);
            let focus = focus_pattern(&node.key, node.kind);
            let (session, changed) = RunSession::begin(tree, id);
            Some((session, status_params(uri, tree, &changed), focus))
        });
        if prepared.is_some() {
            guard.runs_in_flight += 1;
        }
        prepared.map(|(session, params, focus)| (session, params, focus, runner))
    };
    let Some((mut session, params, focus, runner)) = prepared else {
        log::warn!("Cannot run '{}' in {}: no such node", key, uri);
        return false;
    };
    sink.tree_changed(params).await;

    let request = RunRequest {
        package_dir: package_dir(&file_path(uri)),
        focus,
    };
    let mut handle = match runner.run(&request) {
        Ok(handle) => handle,
        Err(err) => {
            let params = {
                let mut guard = state.write().await;
                guard.runs_in_flight = guard.runs_in_flight.saturating_sub(1);
                guard.tree_mut(uri).map(|tree| {
                    let changed = session.abort(tree);
                    status_params(uri, tree, &changed)
                })
            };
            if let Some(params) = params {
                sink.tree_changed(params).await;
            }
            report_runner_error(state, sink, &err).await;
            return false;
        }
    };

    while let Some(event) = handle.events.recv().await {
        if let RunEvent::Output(line) = &event {
            sink.log(MessageType::LOG, line.clone()).await;
        }
        let params = {
            let mut guard = state.write().await;
            guard.tree_mut(uri).map(|tree| {
                let changed = session.apply(tree, &event);
                status_params(uri, tree, &changed)
            })
        };
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            sink.tree_changed(params).await;
        }
    }

    let params = {
        let mut guard = state.write().await;
        guard.runs_in_flight = guard.runs_in_flight.saturating_sub(1);
        guard.tree_mut(uri).map(|tree| {
            let changed = session.finish(tree);
            status_params(uri, tree, &changed)
        })
    };
    if let Some(params) = params.filter(|p| !p.is_empty()) {
        sink.tree_changed(params).await;
    }

    if let Some(summary) = session.summary() {
        sink.log(
            MessageType::INFO,
            format!(
                "Ginkgo: {} passed, {} failed, {} skipped",
                summary.passed, summary.failed, summary.skipped
            ),
        )
        .await;
    }
    refresh_lenses(state, sink).await;
    true
}

pub async fn run_all<S: ClientSink + ?Sized>(state: &SharedState, sink: &S, uri: &Url) -> bool {
    run_node(state, sink, uri, &NodeKey::root()).await
}

/// Captured output of a node, also written to the output panel
pub async fn show_output<S: ClientSink + ?Sized>(
    state: &SharedState,
    sink: &S,
    uri: &Url,
    key: &NodeKey,
) -> Option<String> {
    let output = {
        let state = state.read().await;
        let tree = state.tree(uri)?;
        let id = tree.find(key)?;
        tree.get(id).result.as_ref()?.output.clone()
    }?;
    sink.log(MessageType::INFO, output.clone()).await;
    Some(output)
}

pub async fn generate_coverage<S: ClientSink + ?Sized>(
    state: &SharedState,
    sink: &S,
    uri: &Url,
) -> Result<CoverageReport, RunnerError> {
    let runner = state.read().await.runner();
    let dir = package_dir(&file_path(uri));
    match runner.generate_coverage(&dir).await {
        Ok(report) => {
            sink.log(MessageType::INFO, report.render_text()).await;
            Ok(report)
        }
        Err(err) => {
            report_runner_error(state, sink, &err).await;
            Err(err)
        }
    }
}

/// Handle a click on a tree item: a single click toggles expansion, a
/// double click runs the node.
pub async fn click<S: ClientSink + ?Sized>(
    state: &SharedState,
    sink: &S,
    uri: &Url,
    key: &NodeKey,
) -> Option<ClickAction> {
    let (clicks, threshold) = {
        let state = state.read().await;
        (state.clicks.clone(), state.config.double_click_threshold())
    };
    let action = clicks.on_click((uri.clone(), key.clone()), threshold).await?;

    match action {
        ClickAction::Expand => {
            let params = {
                let mut guard = state.write().await;
                guard.tree_mut(uri).and_then(|tree| {
                    toggle_expanded(tree, key)?;
                    let id = tree.find(key)?;
                    Some(TreeChangedParams {
                        uri: uri.clone(),
                        items: vec![tree_item(tree, id)],
                        removed: Vec::new(),
                        statuses: Vec::new(),
                    })
                })
            };
            if let Some(params) = params {
                sink.tree_changed(params).await;
            }
        }
        ClickAction::Run => {
            run_node(state, sink, uri, key).await;
        }
    }
    Some(action)
}

/// Flip inline affordances on or off. Returns the new setting.
pub async fn toggle_code_lens<S: ClientSink + ?Sized>(state: &SharedState, sink: &S) -> bool {
    let enabled = {
        let mut state = state.write().await;
        state.config.code_lens_enabled = !state.config.code_lens_enabled;
        state.config.code_lens_enabled
    };
    log::info!("Code lenses {}", if enabled { "enabled" } else { "disabled" });
    refresh_lenses(state, sink).await;
    enabled
}
