//
// view/refresh.rs
//
// Debounced refresh scheduling per document
//

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;

pub use crate::config::RefreshTrigger;

/// Handle for one scheduled refresh
#[derive(Debug, Clone)]
pub struct RefreshTicket {
    generation: u64,
    pub token: CancellationToken,
}

#[derive(Debug, Default)]
struct Pending {
    next_generation: u64,
    tokens: HashMap<Url, (u64, CancellationToken)>,
}

/// Tracks the pending refresh of each document. Scheduling a refresh
/// cancels the one before it, so a burst of edits produces one refresh.
#[derive(Debug, Default)]
pub struct RefreshScheduler {
    pending: RwLock<Pending>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Pending> {
        self.pending.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> RwLockReadGuard<'_, Pending> {
        self.pending.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule a refresh for `uri`, cancelling any pending one
    pub fn schedule(&self, uri: Url) -> RefreshTicket {
        let mut pending = self.write();
        if let Some((_, old)) = pending.tokens.remove(&uri) {
            old.cancel();
        }
        let generation = pending.next_generation;
        pending.next_generation += 1;
        let token = CancellationToken::new();
        pending.tokens.insert(uri, (generation, token.clone()));
        RefreshTicket { generation, token }
    }

    /// Mark a refresh as complete. A ticket that was superseded leaves the
    /// newer one in place.
    pub fn complete(&self, uri: &Url, ticket: &RefreshTicket) {
        let mut pending = self.write();
        if pending.tokens.get(uri).map(|(g, _)| *g) == Some(ticket.generation) {
            pending.tokens.remove(uri);
        }
    }

    pub fn cancel(&self, uri: &Url) {
        if let Some((_, token)) = self.write().tokens.remove(uri) {
            token.cancel();
        }
    }

    pub fn cancel_all(&self) {
        for (_, (_, token)) in self.write().tokens.drain() {
            token.cancel();
        }
    }

    pub fn is_pending(&self, uri: &Url) -> bool {
        self.read().tokens.contains_key(uri)
    }
}

/// Wait out the debounce delay. Returns false if the ticket was cancelled
/// first.
pub async fn debounce(ticket: &RefreshTicket, delay: Duration) -> bool {
    if delay.is_zero() {
        return !ticket.token.is_cancelled();
    }
    tokio::select! {
        _ = ticket.token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///src/{}", name)).unwrap()
    }

    #[test]
    fn test_schedule_cancels_previous() {
        let scheduler = RefreshScheduler::new();
        let first = scheduler.schedule(uri("a_test.go"));
        let second = scheduler.schedule(uri("a_test.go"));
        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());
    }

    #[test]
    fn test_documents_are_independent() {
        let scheduler = RefreshScheduler::new();
        let a = scheduler.schedule(uri("a_test.go"));
        let _b = scheduler.schedule(uri("b_test.go"));
        assert!(!a.token.is_cancelled());
    }

    #[test]
    fn test_stale_complete_keeps_newer_ticket() {
        let scheduler = RefreshScheduler::new();
        let doc = uri("a_test.go");
        let first = scheduler.schedule(doc.clone());
        let second = scheduler.schedule(doc.clone());
        scheduler.complete(&doc, &first);
        assert!(scheduler.is_pending(&doc));
        scheduler.complete(&doc, &second);
        assert!(!scheduler.is_pending(&doc));
    }

    #[test]
    fn test_cancel_all() {
        let scheduler = RefreshScheduler::new();
        let a = scheduler.schedule(uri("a_test.go"));
        let b = scheduler.schedule(uri("b_test.go"));
        scheduler.cancel_all();
        assert!(a.token.is_cancelled());
        assert!(b.token.is_cancelled());
        assert!(!scheduler.is_pending(&uri("a_test.go")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_changes_refreshes_once() {
        let scheduler = Arc::new(RefreshScheduler::new());
        let refreshes = Arc::new(AtomicUsize::new(0));
        let doc = uri("a_test.go");

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let ticket = scheduler.schedule(doc.clone());
            let scheduler = scheduler.clone();
            let refreshes = refreshes.clone();
            let doc = doc.clone();
            tasks.push(tokio::spawn(async move {
                if debounce(&ticket, Duration::from_millis(300)).await {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    scheduler.complete(&doc, &ticket);
                }
            }));
            tokio::time::advance(Duration::from_millis(50)).await;
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending(&doc));
    }
}
