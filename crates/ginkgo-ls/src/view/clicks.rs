//
// view/clicks.rs
//
// Single- vs double-click disambiguation for tree items
//

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;

use crate::tree::NodeKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
    /// Double click: run the node
    Run,
    /// Single click: toggle expansion
    Expand,
}

pub type ClickTarget = (Url, NodeKey);

#[derive(Debug, Default)]
struct Waiting {
    next_id: u64,
    clicks: HashMap<ClickTarget, (u64, CancellationToken)>,
}

#[derive(Debug, Default)]
pub struct ClickTracker {
    waiting: Mutex<Waiting>,
}

impl ClickTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Waiting> {
        self.waiting.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a click on `target`.
    ///
    /// A second click on the same target within `threshold` resolves
    /// immediately to `Run` and the first click resolves to `None`.
    /// Otherwise the click resolves to `Expand` once the threshold passes.
    pub async fn on_click(&self, target: ClickTarget, threshold: Duration) -> Option<ClickAction> {
        let (id, token) = {
            let mut waiting = self.lock();
            if let Some((_, first)) = waiting.clicks.remove(&target) {
                first.cancel();
                log::trace!("Double click on {}", target.1);
                return Some(ClickAction::Run);
            }
            let id = waiting.next_id;
            waiting.next_id += 1;
            let token = CancellationToken::new();
            waiting.clicks.insert(target.clone(), (id, token.clone()));
            (id, token)
        };

        tokio::select! {
            _ = token.cancelled() => None,
            _ = tokio::time::sleep(threshold) => {
                let mut waiting = self.lock();
                if waiting.clicks.get(&target).map(|(i, _)| *i) == Some(id) {
                    waiting.clicks.remove(&target);
                }
                Some(ClickAction::Expand)
            }
        }
    }

    /// Drop every waiting click; their callers resolve to `None`
    pub fn cancel_all(&self) {
        for (_, (_, token)) in self.lock().clicks.drain() {
            token.cancel();
        }
    }
}
