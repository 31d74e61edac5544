//
// outline/cache.rs
//
// Outline cache keyed by file path and content signature
//

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;

use super::provider::{Outline, OutlineProvider};
use super::signature::ContentSignature;
use crate::error::OutlineError;

/// Default time an outline stays valid without being recomputed
pub const DEFAULT_OUTLINE_TTL: Duration = Duration::from_secs(60);

type OutlineFuture = Shared<BoxFuture<'static, Result<Arc<Outline>, OutlineError>>>;

/// A document to outline: identity, current text and its signature
#[derive(Debug, Clone)]
pub struct OutlineRequest {
    pub path: PathBuf,
    pub content: String,
    pub signature: ContentSignature,
}

impl OutlineRequest {
    /// Request for an open document's in-memory text
    pub fn from_text(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        let signature = ContentSignature::from_text(&content);
        Self {
            path: path.into(),
            content,
            signature,
        }
    }

    /// Request for a file read from disk
    pub fn from_disk(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let (content, signature) = ContentSignature::from_disk(&path)?;
        Ok(Self {
            path,
            content,
            signature,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests answered from a valid entry
    pub hits: u64,
    /// Requests that joined a computation already in flight
    pub shared: u64,
    /// Computations started (one provider invocation each)
    pub computations: u64,
}

struct CacheEntry {
    signature: ContentSignature,
    outline: Arc<Outline>,
    created: Instant,
}

struct InFlight {
    ticket: u64,
    signature: ContentSignature,
    future: OutlineFuture,
    /// Set when the entry was invalidated while computing; the result is
    /// still handed to waiters but not stored
    stale: bool,
}

struct Inner {
    provider: Arc<dyn OutlineProvider>,
    ttl: Duration,
    entries: HashMap<PathBuf, CacheEntry>,
    in_flight: HashMap<PathBuf, InFlight>,
    next_ticket: u64,
    stats: CacheStats,
}

/// Memoizes outlines per file.
///
/// An entry is served only while it is younger than the TTL and its
/// signature matches the request. At most one provider invocation per path is
/// in flight; concurrent requests await the same shared future. A failed
/// computation is returned to every waiter and leaves nothing behind.
pub struct OutlineCache {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for OutlineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutlineCache").finish_non_exhaustive()
    }
}

impl OutlineCache {
    pub fn new(provider: Arc<dyn OutlineProvider>, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                provider,
                ttl,
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                next_ticket: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the outline for `request`, computing it at most once per path.
    ///
    /// A computation in flight for different content is awaited first (it is
    /// still the only invocation allowed for the path) and never returned.
    pub async fn get_outline(&self, request: &OutlineRequest) -> Result<Arc<Outline>, OutlineError> {
        loop {
            let (ticket, future, current) = {
                let mut inner = self.lock();
                let now = Instant::now();
                let ttl = inner.ttl;

                if let Some(entry) = inner.entries.get(&request.path) {
                    if now.duration_since(entry.created) < ttl && entry.signature.matches(&request.signature) {
                        let outline = entry.outline.clone();
                        inner.stats.hits += 1;
                        log::trace!("Outline cache hit for {}", request.path.display());
                        return Ok(outline);
                    }
                }

                if let Some(flight) = inner.in_flight.get(&request.path) {
                    let current = flight.signature.matches(&request.signature);
                    let joined = (flight.ticket, flight.future.clone(), current);
                    if current {
                        inner.stats.shared += 1;
                    } else {
                        log::trace!(
                            "Waiting out an outline of older content for {}",
                            request.path.display()
                        );
                    }
                    joined
                } else {
                    let provider = inner.provider.clone();
                    let path = request.path.clone();
                    let content = request.content.clone();
                    let future = async move {
                        provider
                            .extract_outline(&content, &path)
                            .await
                            .map(Arc::new)
                    }
                    .boxed()
                    .shared();

                    let ticket = inner.next_ticket;
                    inner.next_ticket += 1;
                    inner.stats.computations += 1;
                    inner.in_flight.insert(
                        request.path.clone(),
                        InFlight {
                            ticket,
                            signature: request.signature,
                            future: future.clone(),
                            stale: false,
                        },
                    );
                    log::trace!("Outline cache miss for {}", request.path.display());
                    (ticket, future, true)
                }
            };

            let result = future.await;
            self.finish(&request.path, ticket, &result);
            if current {
                return result;
            }
        }
    }

    /// Retire the in-flight slot for `ticket` and store a successful result.
    ///
    /// Every waiter calls this; only the first one to arrive finds the slot.
    fn finish(&self, path: &Path, ticket: u64, result: &Result<Arc<Outline>, OutlineError>) {
        let mut inner = self.lock();
        let owns_slot = inner
            .in_flight
            .get(path)
            .map(|flight| flight.ticket == ticket)
            .unwrap_or(false);
        if !owns_slot {
            return;
        }
        let Some(flight) = inner.in_flight.remove(path) else {
            return;
        };

        match result {
            Ok(outline) if !flight.stale => {
                inner.entries.insert(
                    path.to_path_buf(),
                    CacheEntry {
                        signature: flight.signature,
                        outline: outline.clone(),
                        created: Instant::now(),
                    },
                );
            }
            Ok(_) => {
                log::trace!("Discarding outline for {} invalidated while computing", path.display());
            }
            Err(e) => {
                log::trace!("Outline computation for {} failed: {}", path.display(), e);
            }
        }
    }

    /// Drop the entry for one path
    pub fn invalidate(&self, path: &Path) {
        let mut inner = self.lock();
        inner.entries.remove(path);
        if let Some(flight) = inner.in_flight.get_mut(path) {
            flight.stale = true;
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        for flight in inner.in_flight.values_mut() {
            flight.stale = true;
        }
    }

    pub fn set_ttl(&self, ttl: Duration) {
        self.lock().ttl = ttl;
    }

    pub fn ttl(&self) -> Duration {
        self.lock().ttl
    }

    /// Swap the provider and drop everything computed by the old one.
    ///
    /// Computations still running for the old provider finish for their
    /// current waiters but are no longer joinable.
    pub fn set_provider(&self, provider: Arc<dyn OutlineProvider>) {
        let mut inner = self.lock();
        log::info!("Outline provider changed to {}", provider.describe());
        inner.provider = provider;
        inner.entries.clear();
        inner.in_flight.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}
