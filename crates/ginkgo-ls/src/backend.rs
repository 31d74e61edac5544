//
// backend.rs
//
// LSP server wiring for the Ginkgo test explorer
//

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::Client;
use tower_lsp::LanguageServer;
use tower_lsp::LspService;
use tower_lsp::Server;

use crate::config::{parse_explorer_config, ExplorerConfig};
use crate::outline::OutlineRequest;
use crate::pipeline::{self, SharedState};
use crate::state::{file_path, root_name, WorldState};
use crate::symbols::document_symbols;
use crate::tree::{merge, NodeKey};
use crate::view::{affordances, tree_item, RefreshTrigger, TestTreeParams, TreeItem};

pub const RUN_NODE_COMMAND: &str = "ginkgo.runNode";
pub const RUN_ALL_COMMAND: &str = "ginkgo.runAll";
pub const SHOW_OUTPUT_COMMAND: &str = "ginkgo.showOutput";
pub const GENERATE_COVERAGE_COMMAND: &str = "ginkgo.generateCoverage";
pub const CLICK_COMMAND: &str = "ginkgo.click";
pub const REFRESH_COMMAND: &str = "ginkgo.refresh";
pub const TOGGLE_CODE_LENS_COMMAND: &str = "ginkgo.toggleCodeLens";

/// Request for the whole tree of one file
pub const TEST_TREE_METHOD: &str = "ginkgo/testTree";

fn commands() -> Vec<String> {
    [
        RUN_NODE_COMMAND,
        crate::view::RUN_FROM_LENS_COMMAND,
        RUN_ALL_COMMAND,
        SHOW_OUTPUT_COMMAND,
        GENERATE_COVERAGE_COMMAND,
        CLICK_COMMAND,
        REFRESH_COMMAND,
        TOGGLE_CODE_LENS_COMMAND,
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

fn uri_arg(args: &[Value], index: usize) -> Option<Url> {
    args.get(index)
        .and_then(|v| v.as_str())
        .and_then(|s| Url::parse(s).ok())
}

fn key_arg(args: &[Value], index: usize) -> Option<NodeKey> {
    args.get(index).and_then(|v| v.as_str()).map(NodeKey::parse)
}

#[derive(Clone)]
pub struct Backend {
    client: Client,
    state: SharedState,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        let state = Arc::new(RwLock::new(WorldState::new(ExplorerConfig::default())));
        Self { client, state }
    }

    /// Refresh in the background so the notification handler returns at once
    fn spawn_refresh(&self, uri: Url, trigger: RefreshTrigger) {
        let this = self.clone();
        tokio::spawn(async move {
            pipeline::refresh_document(&this.state, &this.client, &uri, trigger).await;
        });
    }

    /// Handle the ginkgo/testTree request
    async fn handle_test_tree(&self, params: TestTreeParams) -> Result<Option<TreeItem>> {
        let uri = params.uri;
        let open = self.state.read().await.documents.contains_key(&uri);

        if open {
            let has_tree = self.state.read().await.tree(&uri).is_some();
            if !has_tree {
                pipeline::refresh_document(&self.state, &self.client, &uri, RefreshTrigger::Manual)
                    .await;
            }
            let state = self.state.read().await;
            return Ok(state.tree(&uri).map(|tree| tree_item(tree, tree.root())));
        }

        // Closed file: outline what is on disk without tracking it
        let request = match OutlineRequest::from_disk(file_path(&uri)) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("Cannot read {}: {}", uri, e);
                return Ok(None);
            }
        };
        let cache = self.state.read().await.outline_cache.clone();
        match cache.get_outline(&request).await {
            Ok(outline) => {
                let tree = merge(None, &outline, &root_name(&uri)).tree;
                Ok(Some(tree_item(&tree, tree.root())))
            }
            Err(e) => {
                log::warn!("Outline of {} failed: {}", uri, e);
                Ok(None)
            }
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        log::info!("Initializing ginkgo-ls");

        let lens_refresh = params
            .capabilities
            .workspace
            .as_ref()
            .and_then(|w| w.code_lens.as_ref())
            .and_then(|c| c.refresh_support)
            .unwrap_or(false);

        {
            let mut state = self.state.write().await;
            state.code_lens_refresh_supported = lens_refresh;
            if let Some(config) = params
                .initialization_options
                .as_ref()
                .and_then(parse_explorer_config)
            {
                state.apply_config(config);
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::FULL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(false),
                        })),
                        ..Default::default()
                    },
                )),
                document_symbol_provider: Some(OneOf::Left(true)),
                code_lens_provider: Some(CodeLensOptions {
                    resolve_provider: Some(false),
                }),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: commands(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: String::from("ginkgo-ls"),
                version: Some(String::from(env!("CARGO_PKG_VERSION"))),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("ginkgo-ls initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        log::info!("ginkgo-ls shutting down");
        self.state.write().await.shutdown();
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let doc = params.text_document;
        {
            let mut state = self.state.write().await;
            state.open(doc.uri.clone(), doc.text, Some(doc.version));
        }
        self.spawn_refresh(doc.uri, RefreshTrigger::Open);
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        // Full sync: the last change holds the whole text
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };
        {
            let mut state = self.state.write().await;
            state.update(&uri, change.text, Some(params.text_document.version));
        }
        self.spawn_refresh(uri, RefreshTrigger::Change);
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(text) = params.text {
            let mut state = self.state.write().await;
            let version = state.documents.get(&uri).and_then(|d| d.version);
            state.update(&uri, text, version);
        }
        self.spawn_refresh(uri, RefreshTrigger::Save);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = &params.text_document.uri;
        let mut state = self.state.write().await;
        state.close(uri);
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        log::trace!("Configuration changed");
        let Some(config) = parse_explorer_config(&params.settings) else {
            log::warn!("No ginkgo section in settings, keeping the current configuration");
            return;
        };

        let (change, open_uris, lens_refresh) = {
            let mut state = self.state.write().await;
            let change = state.apply_config(config);
            let open_uris: Vec<Url> = state.documents.keys().cloned().collect();
            (change, open_uris, state.code_lens_refresh_supported)
        };

        if change.provider_changed {
            for uri in open_uris {
                self.spawn_refresh(uri, RefreshTrigger::Manual);
            }
        }
        if change.code_lens_changed && lens_refresh {
            if let Err(e) = self.client.code_lens_refresh().await {
                log::trace!("Code lens refresh failed: {}", e);
            }
        }
    }

    async fn code_lens(&self, params: CodeLensParams) -> Result<Option<Vec<CodeLens>>> {
        let uri = params.text_document.uri;
        let state = self.state.read().await;
        let Some(tree) = state.tree(&uri) else {
            return Ok(None);
        };
        let lenses = affordances(tree, state.config.code_lens_enabled)
            .iter()
            .map(|a| a.to_code_lens(&uri))
            .collect();
        Ok(Some(lenses))
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        let state = self.state.read().await;
        Ok(state
            .tree(&params.text_document.uri)
            .map(|tree| DocumentSymbolResponse::Nested(document_symbols(tree))))
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<Value>> {
        let args = params.arguments;
        log::trace!("executeCommand {} {:?}", params.command, args);

        match params.command.as_str() {
            RUN_NODE_COMMAND | crate::view::RUN_FROM_LENS_COMMAND => {
                let (Some(uri), Some(key)) = (uri_arg(&args, 0), key_arg(&args, 1)) else {
                    return Err(tower_lsp::jsonrpc::Error::invalid_params("expected [uri, key]"));
                };
                let this = self.clone();
                tokio::spawn(async move {
                    pipeline::run_node(&this.state, &this.client, &uri, &key).await;
                });
                Ok(None)
            }
            RUN_ALL_COMMAND => {
                let Some(uri) = uri_arg(&args, 0) else {
                    return Err(tower_lsp::jsonrpc::Error::invalid_params("expected [uri]"));
                };
                let this = self.clone();
                tokio::spawn(async move {
                    pipeline::run_all(&this.state, &this.client, &uri).await;
                });
                Ok(None)
            }
            SHOW_OUTPUT_COMMAND => {
                let (Some(uri), Some(key)) = (uri_arg(&args, 0), key_arg(&args, 1)) else {
                    return Err(tower_lsp::jsonrpc::Error::invalid_params("expected [uri, key]"));
                };
                let output = pipeline::show_output(&self.state, &self.client, &uri, &key).await;
                Ok(output.map(Value::String))
            }
            GENERATE_COVERAGE_COMMAND => {
                let Some(uri) = uri_arg(&args, 0) else {
                    return Err(tower_lsp::jsonrpc::Error::invalid_params("expected [uri]"));
                };
                match pipeline::generate_coverage(&self.state, &self.client, &uri).await {
                    Ok(report) => Ok(Some(json!({
                        "report": report,
                        "percent": report.percent(),
                        "text": report.render_text(),
                    }))),
                    Err(_) => Ok(None),
                }
            }
            CLICK_COMMAND => {
                let (Some(uri), Some(key)) = (uri_arg(&args, 0), key_arg(&args, 1)) else {
                    return Err(tower_lsp::jsonrpc::Error::invalid_params("expected [uri, key]"));
                };
                let this = self.clone();
                tokio::spawn(async move {
                    pipeline::click(&this.state, &this.client, &uri, &key).await;
                });
                Ok(None)
            }
            REFRESH_COMMAND => {
                let Some(uri) = uri_arg(&args, 0) else {
                    return Err(tower_lsp::jsonrpc::Error::invalid_params("expected [uri]"));
                };
                let changed =
                    pipeline::refresh_document(&self.state, &self.client, &uri, RefreshTrigger::Manual)
                        .await;
                Ok(Some(Value::Bool(changed)))
            }
            TOGGLE_CODE_LENS_COMMAND => {
                let enabled = pipeline::toggle_code_lens(&self.state, &self.client).await;
                Ok(Some(Value::Bool(enabled)))
            }
            other => {
                log::warn!("Unknown command: {}", other);
                Err(tower_lsp::jsonrpc::Error::method_not_found())
            }
        }
    }
}

pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(Backend::new)
        .custom_method(TEST_TREE_METHOD, Backend::handle_test_tree)
        .finish();
    Server::new(stdin, stdout, socket).serve(service).await;

    Ok(())
}
