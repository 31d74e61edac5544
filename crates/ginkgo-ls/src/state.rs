//
// state.rs
//
// Server-wide state: configuration, open documents and their test trees
//

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use crate::config::ExplorerConfig;
use crate::outline::{GinkgoOutliner, Outline, OutlineCache, OutlineProvider, OutlineRequest};
use crate::runner::GinkgoRunner;
use crate::tree::{merge, TestTree};
use crate::view::{delta_params, ClickTracker, RefreshScheduler, TreeChangedParams};

/// An open document
#[derive(Debug, Clone)]
pub struct TrackedDocument {
    pub text: String,
    pub version: Option<i32>,
    /// `None` until the first successful outline
    pub tree: Option<TestTree>,
}

impl TrackedDocument {
    pub fn new(text: impl Into<String>, version: Option<i32>) -> Self {
        Self {
            text: text.into(),
            version,
            tree: None,
        }
    }
}

/// Effects of a configuration change the caller must act on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChange {
    pub provider_changed: bool,
    pub code_lens_changed: bool,
}

pub struct WorldState {
    pub config: ExplorerConfig,
    pub outline_cache: Arc<OutlineCache>,
    pub documents: HashMap<Url, TrackedDocument>,
    pub refresh: Arc<RefreshScheduler>,
    pub clicks: Arc<ClickTracker>,
    /// Number of test runs currently streaming
    pub runs_in_flight: usize,
    /// Executables for which the install hint was already shown
    pub install_offered: HashSet<PathBuf>,
    /// Client accepts `workspace/codeLens/refresh`
    pub code_lens_refresh_supported: bool,
}

impl WorldState {
    pub fn new(config: ExplorerConfig) -> Self {
        let provider = Arc::new(GinkgoOutliner::new(config.ginkgo_path.clone()));
        Self::with_provider(config, provider)
    }

    /// State with a custom outline provider
    pub fn with_provider(config: ExplorerConfig, provider: Arc<dyn OutlineProvider>) -> Self {
        let outline_cache = Arc::new(OutlineCache::new(provider, config.outline_cache_ttl));
        Self {
            config,
            outline_cache,
            documents: HashMap::new(),
            refresh: Arc::new(RefreshScheduler::new()),
            clicks: Arc::new(ClickTracker::new()),
            runs_in_flight: 0,
            install_offered: HashSet::new(),
            code_lens_refresh_supported: false,
        }
    }

    /// Switch to `config`, swapping the outline provider when the executable
    /// changed. Debounce and click thresholds apply from the next event.
    pub fn apply_config(&mut self, config: ExplorerConfig) -> ConfigChange {
        let change = ConfigChange {
            provider_changed: self.config.provider_changed(&config),
            code_lens_changed: self.config.code_lens_enabled != config.code_lens_enabled,
        };

        if change.provider_changed {
            log::info!(
                "Ginkgo executable changed to {}, clearing outline cache",
                config.ginkgo_path.display()
            );
            self.outline_cache
                .set_provider(Arc::new(GinkgoOutliner::new(config.ginkgo_path.clone())));
            self.install_offered.clear();
        }
        if self.config.outline_cache_ttl != config.outline_cache_ttl {
            self.outline_cache.set_ttl(config.outline_cache_ttl);
        }

        self.config = config;
        change
    }

    pub fn runner(&self) -> GinkgoRunner {
        GinkgoRunner::new(self.config.ginkgo_path.clone(), self.config.run_args.clone())
    }

    pub fn open(&mut self, uri: Url, text: String, version: Option<i32>) {
        self.documents.insert(uri, TrackedDocument::new(text, version));
    }

    /// Replace an open document's text. Its tree stays until the next refresh.
    pub fn update(&mut self, uri: &Url, text: String, version: Option<i32>) {
        match self.documents.get_mut(uri) {
            Some(doc) => {
                doc.text = text;
                doc.version = version;
            }
            None => {
                self.documents
                    .insert(uri.clone(), TrackedDocument::new(text, version));
            }
        }
    }

    /// Dispose of a closed document's tree, pending refresh and cache entry
    pub fn close(&mut self, uri: &Url) {
        self.refresh.cancel(uri);
        self.outline_cache.invalidate(&file_path(uri));
        self.documents.remove(uri);
    }

    /// Outline request for an open document's current text
    pub fn outline_request(&self, uri: &Url) -> Option<OutlineRequest> {
        let doc = self.documents.get(uri)?;
        Some(OutlineRequest::from_text(file_path(uri), doc.text.clone()))
    }

    /// Reconcile an open document's tree with a fresh outline.
    ///
    /// Returns the notification for the delta; `None` when the document is no
    /// longer open or nothing changed.
    pub fn apply_outline(&mut self, uri: &Url, outline: &Outline) -> Option<TreeChangedParams> {
        let doc = self.documents.get_mut(uri)?;
        let reconciled = merge(doc.tree.as_ref(), outline, &root_name(uri));
        doc.tree = Some(reconciled.tree);
        if reconciled.delta.is_empty() {
            return None;
        }
        doc.tree
            .as_ref()
            .map(|tree| delta_params(uri, tree, &reconciled.delta))
    }

    pub fn tree(&self, uri: &Url) -> Option<&TestTree> {
        self.documents.get(uri)?.tree.as_ref()
    }

    pub fn tree_mut(&mut self, uri: &Url) -> Option<&mut TestTree> {
        self.documents.get_mut(uri)?.tree.as_mut()
    }

    /// Release everything held for the session
    pub fn shutdown(&mut self) {
        self.refresh.cancel_all();
        self.clicks.cancel_all();
        self.outline_cache.clear();
        self.documents.clear();
        log::info!("Explorer state released");
    }
}

/// Filesystem path of a document URI
pub fn file_path(uri: &Url) -> PathBuf {
    uri.to_file_path()
        .unwrap_or_else(|_| PathBuf::from(uri.path()))
}

/// Label of a document's root node: its file name
pub fn root_name(uri: &Url) -> String {
    file_path(uri)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| uri.to_string())
}
