// perf.rs - Timing instrumentation for subprocess calls and refreshes
//
// Controlled via the GINKGO_LS_PERF environment variable.
//
// Usage:
//   GINKGO_LS_PERF=1 ginkgo-ls --stdio        # Log operation durations
//   GINKGO_LS_PERF=verbose ginkgo-ls --stdio  # Also warn when thresholds are exceeded

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static PERF_ENABLED: OnceLock<bool> = OnceLock::new();

static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

/// Number of external tool invocations since startup
static TOOL_INVOCATIONS: AtomicUsize = AtomicUsize::new(0);

/// Check if performance timing is enabled
pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var("GINKGO_LS_PERF")
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

/// Check if verbose mode is enabled
pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var("GINKGO_LS_PERF")
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

pub fn increment_tool_invocations() {
    TOOL_INVOCATIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn tool_invocations() -> usize {
    TOOL_INVOCATIONS.load(Ordering::Relaxed)
}

/// RAII timing guard that logs duration on drop
///
/// ```
/// use ginkgo_ls::perf::TimingGuard;
///
/// let _guard = TimingGuard::new("refresh");
/// // ... do work ...
/// ```
pub struct TimingGuard {
    start: Instant,
    name: &'static str,
    threshold_warn_ms: Option<u64>,
    enabled: bool,
}

impl TimingGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: None,
            enabled: is_enabled(),
        }
    }

    /// Create a timing guard that also warns (in verbose mode) past `threshold_ms`
    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        increment_tool_invocations();
        Self {
            start: Instant::now(),
            name,
            threshold_warn_ms: Some(threshold_ms),
            enabled: is_enabled(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }

        let elapsed = self.start.elapsed();
        log::info!("[PERF] {} completed in {:?}", self.name, elapsed);

        if let Some(threshold) = self.threshold_warn_ms {
            if elapsed.as_millis() > threshold as u128 && is_verbose() {
                log::warn!(
                    "[PERF] {} exceeded threshold ({}ms > {}ms)",
                    self.name,
                    elapsed.as_millis(),
                    threshold
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_measures_elapsed() {
        let guard = TimingGuard::new("test");
        std::thread::sleep(Duration::from_millis(2));
        assert!(guard.elapsed() >= Duration::from_millis(2));
    }

    #[test]
    fn test_threshold_guard_counts_invocations() {
        let before = tool_invocations();
        let _guard = TimingGuard::with_threshold("tool", 10);
        assert!(tool_invocations() > before);
    }
}
