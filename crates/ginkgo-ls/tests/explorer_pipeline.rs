//! End-to-end checks of the refresh, click and run pipelines.
//!
//! A recording sink stands in for the editor. Outlines come from a static
//! provider; runs use a fake `ginkgo` shell script on unix.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tower_lsp::lsp_types::MessageType;
use url::Url;

use ginkgo_ls::config::ExplorerConfig;
use ginkgo_ls::error::OutlineError;
use ginkgo_ls::pipeline::{self, ClientSink, SharedState};
use ginkgo_ls::state::WorldState;
use ginkgo_ls::test_utils::{suite_outline, StaticOutliner};
use ginkgo_ls::tree::{NodeKey, RunStatus};
use ginkgo_ls::view::{RefreshTrigger, TreeChangedParams};

#[derive(Default)]
struct RecordingSink {
    trees: Mutex<Vec<TreeChangedParams>>,
    logs: Mutex<Vec<(MessageType, String)>>,
    shown: Mutex<Vec<(MessageType, String)>>,
}

impl RecordingSink {
    fn trees(&self) -> usize {
        self.trees.lock().unwrap().len()
    }

    fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    fn logged(&self, needle: &str) -> bool {
        self.logs.lock().unwrap().iter().any(|(_, m)| m.contains(needle))
    }
}

#[async_trait]
impl ClientSink for RecordingSink {
    async fn tree_changed(&self, params: TreeChangedParams) {
        self.trees.lock().unwrap().push(params);
    }

    async fn log(&self, typ: MessageType, message: String) {
        self.logs.lock().unwrap().push((typ, message));
    }

    async fn show(&self, typ: MessageType, message: String) {
        self.shown.lock().unwrap().push((typ, message));
    }

    async fn refresh_code_lenses(&self) {}
}

fn shared(config: ExplorerConfig, provider: Arc<StaticOutliner>) -> SharedState {
    Arc::new(RwLock::new(WorldState::with_provider(config, provider)))
}

async fn open(state: &SharedState, uri: &Url, text: &str) {
    state.write().await.open(uri.clone(), text.to_string(), Some(1));
}

async fn status(state: &SharedState, uri: &Url, names: &[&str]) -> Option<RunStatus> {
    let state = state.read().await;
    let tree = state.tree(uri).unwrap();
    let id = tree.find(&NodeKey::from_names(names.iter().copied())).unwrap();
    tree.status(id)
}

fn books_uri(dir: &std::path::Path) -> Url {
    Url::from_file_path(dir.join("books_test.go")).unwrap()
}

#[tokio::test]
async fn test_refresh_publishes_tree_once() {
    let provider = Arc::new(StaticOutliner::new(suite_outline("Books", &["lends", "returns"])));
    let state = shared(ExplorerConfig::default(), provider.clone());
    let sink = RecordingSink::default();
    let uri = Url::parse("file:///src/books/books_test.go").unwrap();
    open(&state, &uri, "package books").await;

    assert!(pipeline::refresh_document(&state, &sink, &uri, RefreshTrigger::Open).await);
    assert_eq!(sink.trees(), 1);
    assert_eq!(state.read().await.tree(&uri).unwrap().specs().len(), 2);

    // Same text again: served from the cache, nothing to publish
    assert!(!pipeline::refresh_document(&state, &sink, &uri, RefreshTrigger::Manual).await);
    assert_eq!(sink.trees(), 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_refresh_of_unopened_document_does_nothing() {
    let provider = Arc::new(StaticOutliner::empty());
    let state = shared(ExplorerConfig::default(), provider.clone());
    let sink = RecordingSink::default();
    let uri = Url::parse("file:///src/books/books_test.go").unwrap();

    assert!(!pipeline::refresh_document(&state, &sink, &uri, RefreshTrigger::Manual).await);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_edits_outlines_once() {
    let provider = Arc::new(StaticOutliner::new(suite_outline("Books", &["lends"])));
    let state = shared(ExplorerConfig::default(), provider.clone());
    let sink = Arc::new(RecordingSink::default());
    let uri = Url::parse("file:///src/books/books_test.go").unwrap();
    open(&state, &uri, "").await;

    let mut tasks = Vec::new();
    for i in 0..5 {
        state
            .write()
            .await
            .update(&uri, format!("package books // {}", i), Some(i + 2));
        let (state, sink, uri) = (state.clone(), sink.clone(), uri.clone());
        tasks.push(tokio::spawn(async move {
            pipeline::refresh_document(&state, &*sink, &uri, RefreshTrigger::Change).await
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let mut refreshed = 0;
    for task in tasks {
        if task.await.unwrap() {
            refreshed += 1;
        }
    }
    assert_eq!(refreshed, 1);
    assert_eq!(provider.calls(), 1);
    assert_eq!(sink.trees(), 1);
}

#[tokio::test]
async fn test_on_save_mode_ignores_edits() {
    let provider = Arc::new(StaticOutliner::new(suite_outline("Books", &["lends"])));
    let config = ExplorerConfig {
        refresh_mode: ginkgo_ls::config::RefreshMode::OnSave,
        ..Default::default()
    };
    let state = shared(config, provider.clone());
    let sink = RecordingSink::default();
    let uri = Url::parse("file:///src/books/books_test.go").unwrap();
    open(&state, &uri, "").await;

    assert!(!pipeline::refresh_document(&state, &sink, &uri, RefreshTrigger::Change).await);
    assert_eq!(provider.calls(), 0);
    assert!(pipeline::refresh_document(&state, &sink, &uri, RefreshTrigger::Save).await);
}

#[tokio::test]
async fn test_missing_outliner_offers_install_once() {
    let path = PathBuf::from("/no/such/ginkgo");
    let provider = Arc::new(StaticOutliner::failing(OutlineError::ToolNotFound {
        path: path.clone(),
    }));
    let state = shared(ExplorerConfig::default(), provider);
    let sink = RecordingSink::default();
    let uri = Url::parse("file:///src/books/books_test.go").unwrap();
    open(&state, &uri, "package books").await;

    for _ in 0..3 {
        assert!(!pipeline::refresh_document(&state, &sink, &uri, RefreshTrigger::Manual).await);
    }
    let shown = sink.shown();
    assert_eq!(shown.len(), 1);
    assert!(shown[0].contains("go install"));
    assert!(sink.logged("Could not outline"));
    assert!(state.read().await.tree(&uri).is_none());
}

#[tokio::test]
async fn test_missing_runner_reverts_to_idle() {
    let provider = Arc::new(StaticOutliner::new(suite_outline("Books", &["lends", "returns"])));
    let config = ExplorerConfig {
        ginkgo_path: PathBuf::from("/no/such/dir/ginkgo"),
        ..Default::default()
    };
    let state = shared(config, provider);
    let sink = RecordingSink::default();
    let uri = Url::parse("file:///src/books/books_test.go").unwrap();
    open(&state, &uri, "package books").await;

    // No tree yet: the run refreshes first
    assert!(!pipeline::run_all(&state, &sink, &uri).await);

    assert_eq!(status(&state, &uri, &["Books", "lends"]).await, None);
    assert_eq!(status(&state, &uri, &["Books"]).await, None);
    assert_eq!(sink.shown().len(), 1);
    assert_eq!(state.read().await.runs_in_flight, 0);
}

#[tokio::test]
async fn test_run_of_unknown_node() {
    let provider = Arc::new(StaticOutliner::new(suite_outline("Books", &["lends"])));
    let state = shared(ExplorerConfig::default(), provider);
    let sink = RecordingSink::default();
    let uri = Url::parse("file:///src/books/books_test.go").unwrap();
    open(&state, &uri, "").await;

    let key = NodeKey::from_names(["Movies"]);
    assert!(!pipeline::run_node(&state, &sink, &uri, &key).await);
    assert!(sink.shown().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_single_click_toggles_expansion() {
    let provider = Arc::new(StaticOutliner::new(suite_outline("Books", &["lends"])));
    let state = shared(ExplorerConfig::default(), provider);
    let sink = RecordingSink::default();
    let uri = Url::parse("file:///src/books/books_test.go").unwrap();
    open(&state, &uri, "").await;
    pipeline::refresh_document(&state, &sink, &uri, RefreshTrigger::Open).await;
    let before = sink.trees();

    let key = NodeKey::from_names(["Books"]);
    let action = pipeline::click(&state, &sink, &uri, &key).await;
    assert_eq!(action, Some(ginkgo_ls::view::ClickAction::Expand));
    assert_eq!(sink.trees(), before + 1);

    let last = sink.trees.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].key, key);
}

#[tokio::test]
async fn test_toggle_code_lens() {
    let state = shared(ExplorerConfig::default(), Arc::new(StaticOutliner::empty()));
    let sink = RecordingSink::default();
    assert!(!pipeline::toggle_code_lens(&state, &sink).await);
    assert!(pipeline::toggle_code_lens(&state, &sink).await);
}

#[cfg(unix)]
mod with_fake_ginkgo {
    use super::*;
    use ginkgo_ls::test_utils::{
        json_report, report_script, run_script, spec_record, spec_report, suite_record, write_fake_ginkgo,
    };

    async fn setup(
        dir: &std::path::Path,
        lines: &[String],
        code: i32,
    ) -> (SharedState, RecordingSink, Url) {
        setup_script(dir, &run_script(lines, code)).await
    }

    async fn setup_script(dir: &std::path::Path, body: &str) -> (SharedState, RecordingSink, Url) {
        let ginkgo = write_fake_ginkgo(dir, body);
        let provider = Arc::new(StaticOutliner::new(suite_outline("Books", &["lends", "returns"])));
        let config = ExplorerConfig {
            ginkgo_path: ginkgo,
            ..Default::default()
        };
        let state = shared(config, provider);
        let sink = RecordingSink::default();
        let uri = books_uri(dir);
        open(&state, &uri, "package books").await;
        pipeline::refresh_document(&state, &sink, &uri, RefreshTrigger::Open).await;
        (state, sink, uri)
    }

    #[tokio::test]
    async fn test_run_all_reports_pass_and_fail() {
        let dir = tempfile::tempdir().unwrap();
        let lines = vec![
            "Running Suite: Books".to_string(),
            spec_record(&["Books"], "lends", "passed"),
            spec_record(&["Books"], "returns", "failed"),
            suite_record(false, 1, 1),
        ];
        let (state, sink, uri) = setup(dir.path(), &lines, 1).await;

        assert!(pipeline::run_all(&state, &sink, &uri).await);

        assert_eq!(status(&state, &uri, &["Books", "lends"]).await, Some(RunStatus::Passed));
        assert_eq!(status(&state, &uri, &["Books", "returns"]).await, Some(RunStatus::Failed));
        assert_eq!(status(&state, &uri, &["Books"]).await, Some(RunStatus::Failed));
        assert!(sink.logged("1 passed, 1 failed"));
        assert!(sink.logged("Running Suite: Books"));
        assert_eq!(state.read().await.runs_in_flight, 0);

        let output = pipeline::show_output(&state, &sink, &uri, &NodeKey::root()).await;
        assert!(output.unwrap().contains("Running Suite: Books"));
    }

    #[tokio::test]
    async fn test_run_all_from_json_report() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("books_test.go").display().to_string();
        let report = json_report(
            false,
            vec![
                spec_report(&["Books"], "lends", "passed", &file),
                // A sibling file of the package declares the same names
                spec_report(&["Books"], "returns", "passed", "/elsewhere/shelf_test.go"),
                spec_report(&["Books"], "returns", "failed", &file),
            ],
        );
        let (state, sink, uri) = setup_script(dir.path(), &report_script(&report, 1)).await;

        assert!(pipeline::run_all(&state, &sink, &uri).await);

        assert_eq!(status(&state, &uri, &["Books", "lends"]).await, Some(RunStatus::Passed));
        assert_eq!(status(&state, &uri, &["Books", "returns"]).await, Some(RunStatus::Failed));
        assert_eq!(status(&state, &uri, &["Books"]).await, Some(RunStatus::Failed));
        assert!(sink.logged("2 passed, 1 failed"));
    }

    #[tokio::test]
    async fn test_crashed_run_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let lines = vec![spec_record(&["Books"], "lends", "passed")];
        let (state, sink, uri) = setup(dir.path(), &lines, 2).await;

        assert!(pipeline::run_all(&state, &sink, &uri).await);

        assert_eq!(status(&state, &uri, &["Books", "lends"]).await, Some(RunStatus::Passed));
        assert_eq!(status(&state, &uri, &["Books", "returns"]).await, Some(RunStatus::Skipped));
        assert_eq!(status(&state, &uri, &["Books"]).await, Some(RunStatus::Passed));
    }

    #[tokio::test]
    async fn test_running_one_spec_leaves_siblings_idle() {
        let dir = tempfile::tempdir().unwrap();
        let lines = vec![spec_record(&["Books"], "lends", "passed")];
        let (state, sink, uri) = setup(dir.path(), &lines, 0).await;

        let key = NodeKey::from_names(["Books", "lends"]);
        assert!(pipeline::run_node(&state, &sink, &uri, &key).await);

        assert_eq!(status(&state, &uri, &["Books", "lends"]).await, Some(RunStatus::Passed));
        assert_eq!(status(&state, &uri, &["Books", "returns"]).await, None);
    }

    #[tokio::test]
    async fn test_double_click_runs_node() {
        let dir = tempfile::tempdir().unwrap();
        let lines = vec![spec_record(&["Books"], "lends", "passed")];
        let (state, sink, uri) = setup(dir.path(), &lines, 0).await;
        let sink = Arc::new(sink);
        let key = NodeKey::from_names(["Books", "lends"]);

        let first = {
            let (state, sink, uri, key) = (state.clone(), sink.clone(), uri.clone(), key.clone());
            tokio::spawn(async move { pipeline::click(&state, &*sink, &uri, &key).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = pipeline::click(&state, &*sink, &uri, &key).await;

        assert_eq!(second, Some(ginkgo_ls::view::ClickAction::Run));
        assert_eq!(first.await.unwrap(), None);
        assert_eq!(status(&state, &uri, &["Books", "lends"]).await, Some(RunStatus::Passed));
    }

    #[tokio::test]
    async fn test_outline_through_real_provider() {
        let dir = tempfile::tempdir().unwrap();
        let content = "Describe(\"Books\", func() {\n\tIt(\"lends\", func() {})\n})\n";
        let json = r#"[{"name":"Describe","text":"Books","start":0,"end":46,"spec":false,"nodes":[{"name":"It","text":"lends","start":28,"end":43,"spec":true}]}]"#;
        let ginkgo = write_fake_ginkgo(dir.path(), &ginkgo_ls::test_utils::outline_script(json));

        let config = ExplorerConfig {
            ginkgo_path: ginkgo,
            ..Default::default()
        };
        let state: SharedState = Arc::new(RwLock::new(WorldState::new(config)));
        let sink = RecordingSink::default();
        let uri = books_uri(dir.path());
        open(&state, &uri, content).await;

        assert!(pipeline::refresh_document(&state, &sink, &uri, RefreshTrigger::Open).await);
        let state = state.read().await;
        let tree = state.tree(&uri).unwrap();
        let spec = tree.find(&NodeKey::from_names(["Books", "lends"])).unwrap();
        assert_eq!(tree.get(spec).range.start.line, 1);
    }
}
