//
// config.rs
//
// Explorer configuration read from LSP settings
//

use std::path::PathBuf;
use std::time::Duration;

use crate::outline::DEFAULT_OUTLINE_TTL;

/// When document edits trigger a re-parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Refresh on save only
    OnSave,
    /// Refresh on every change (debounced) and on save
    #[default]
    OnType,
    /// Refresh only on open and explicit request
    Manual,
}

/// Event that may cause a refresh of a document's tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Open,
    Change,
    Save,
    Manual,
}

impl RefreshMode {
    pub fn accepts(self, trigger: RefreshTrigger) -> bool {
        match trigger {
            RefreshTrigger::Open | RefreshTrigger::Manual => true,
            RefreshTrigger::Save => matches!(self, RefreshMode::OnSave | RefreshMode::OnType),
            RefreshTrigger::Change => self == RefreshMode::OnType,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "onsave" | "save" => Some(RefreshMode::OnSave),
            "ontype" | "type" => Some(RefreshMode::OnType),
            "manual" | "off" => Some(RefreshMode::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerConfig {
    /// Ginkgo executable, bare name or path
    pub ginkgo_path: PathBuf,
    pub outline_cache_ttl: Duration,
    pub refresh_mode: RefreshMode,
    /// Delay before a change-triggered refresh runs
    pub debounce_ms: u64,
    /// Two clicks on the same node within this window run it
    pub double_click_threshold_ms: u64,
    pub code_lens_enabled: bool,
    /// Extra arguments passed to every test run
    pub run_args: Vec<String>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            ginkgo_path: PathBuf::from("ginkgo"),
            outline_cache_ttl: DEFAULT_OUTLINE_TTL,
            refresh_mode: RefreshMode::default(),
            debounce_ms: 300,
            double_click_threshold_ms: 400,
            code_lens_enabled: true,
            run_args: Vec::new(),
        }
    }
}

impl ExplorerConfig {
    /// True when switching to `other` requires a new outline provider
    pub fn provider_changed(&self, other: &ExplorerConfig) -> bool {
        self.ginkgo_path != other.ginkgo_path
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn double_click_threshold(&self) -> Duration {
        Duration::from_millis(self.double_click_threshold_ms)
    }
}

fn parse_path(v: &serde_json::Value) -> Option<PathBuf> {
    let s = v.as_str()?;
    if s.is_empty() || s.contains('\0') {
        log::warn!("Ignoring invalid executable path setting: {:?}", s);
        return None;
    }
    Some(PathBuf::from(s))
}

/// Parse explorer settings from a `{"ginkgo": {...}}` object.
///
/// Returns `None` when the `ginkgo` section is absent; absent fields keep
/// their defaults.
pub fn parse_explorer_config(settings: &serde_json::Value) -> Option<ExplorerConfig> {
    let ginkgo = settings.get("ginkgo")?;
    let mut config = ExplorerConfig::default();

    if let Some(path) = ginkgo.get("path").and_then(parse_path) {
        config.ginkgo_path = path;
    }
    if let Some(v) = ginkgo.get("outlineCacheTtlMs").and_then(|v| v.as_u64()) {
        config.outline_cache_ttl = Duration::from_millis(v);
    }
    if let Some(v) = ginkgo.get("refreshMode").and_then(|v| v.as_str()) {
        match RefreshMode::parse(v) {
            Some(mode) => config.refresh_mode = mode,
            None => log::warn!(
                "Unknown refreshMode '{}', using {:?}",
                v,
                config.refresh_mode
            ),
        }
    }
    if let Some(v) = ginkgo.get("debounceMs").and_then(|v| v.as_u64()) {
        config.debounce_ms = v;
    }
    if let Some(v) = ginkgo
        .get("doubleClickThresholdMs")
        .and_then(|v| v.as_u64())
    {
        config.double_click_threshold_ms = v;
    }
    if let Some(v) = ginkgo.get("codeLens").and_then(|v| v.as_bool()) {
        config.code_lens_enabled = v;
    }
    if let Some(args) = ginkgo.get("runArgs").and_then(|v| v.as_array()) {
        config.run_args = args
            .iter()
            .filter_map(|a| a.as_str())
            .filter(|s| !s.is_empty() && !s.contains('\0'))
            .map(str::to_string)
            .collect();
    }

    log::info!("Ginkgo explorer configuration loaded from LSP settings:");
    log::info!("  ginkgo_path: {}", config.ginkgo_path.display());
    log::info!("  outline_cache_ttl: {:?}", config.outline_cache_ttl);
    log::info!("  refresh_mode: {:?}", config.refresh_mode);
    log::info!("  debounce_ms: {}", config.debounce_ms);
    log::info!(
        "  double_click_threshold_ms: {}",
        config.double_click_threshold_ms
    );
    log::info!("  code_lens_enabled: {}", config.code_lens_enabled);
    log::info!("  run_args: {:?}", config.run_args);

    Some(config)
}
