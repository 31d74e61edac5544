//! Shared helpers for unit tests, integration tests and benchmarks.

pub mod fake_ginkgo;
pub mod fixture_outline;

pub use fake_ginkgo::*;
pub use fixture_outline::*;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::OutlineError;
use crate::outline::{Outline, OutlineProvider};

/// Outline provider answering with a preset result, counting invocations.
pub struct StaticOutliner {
    result: Mutex<Result<Outline, OutlineError>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl StaticOutliner {
    pub fn new(outline: Outline) -> Self {
        Self {
            result: Mutex::new(Ok(outline)),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn empty() -> Self {
        Self::new(Outline::default())
    }

    pub fn failing(err: OutlineError) -> Self {
        Self {
            result: Mutex::new(Err(err)),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Sleep this long inside every invocation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_outline(&self, outline: Outline) {
        *self.result.lock().unwrap() = Ok(outline);
    }

    pub fn set_error(&self, err: OutlineError) {
        *self.result.lock().unwrap() = Err(err);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutlineProvider for StaticOutliner {
    async fn extract_outline(&self, _content: &str, _path: &Path) -> Result<Outline, OutlineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.lock().unwrap().clone()
    }

    fn describe(&self) -> String {
        "static outline".to_string()
    }
}
