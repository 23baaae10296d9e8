//! Time-bounded set of processed message-ids with background eviction.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

const MIN_EVICTION_INTERVAL: Duration = Duration::from_secs(60);

struct Inner {
    seen: DashMap<String, Instant>,
    retention: Duration,
    closed: AtomicBool,
    shutdown: Notify,
}

/// At-most-once guard over message-ids within a retention window.
///
/// `MarkProcessed`/`IsProcessed` never surface errors. A background task
/// evicts entries older than `retention` every `max(retention/2, 1 min)`;
/// a panic inside it is caught, logged, and the loop continues.
pub struct IdempotencyTracker {
    inner: Arc<Inner>,
    evictor: Option<JoinHandle<()>>,
}

impl IdempotencyTracker {
    /// Start a tracker with the given retention window and spawn its evictor.
    pub fn new(retention: Duration) -> Self {
        let inner = Arc::new(Inner {
            seen: DashMap::new(),
            retention,
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        });

        let evict_interval = retention.checked_div(2).unwrap_or(retention).max(MIN_EVICTION_INTERVAL);
        let evictor_inner = Arc::clone(&inner);
        let evictor = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(evict_interval) => {
                        if evictor_inner.closed.load(Ordering::Acquire) {
                            break;
                        }
                        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            evictor_inner.evict_expired();
                        }));
                        if let Err(panic) = outcome {
                            tracing::error!(?panic, "idempotency evictor panicked, continuing");
                        }
                    }
                    _ = evictor_inner.shutdown.notified() => break,
                }
            }
        });

        Self {
            inner,
            evictor: Some(evictor),
        }
    }

    /// Record `id` as processed, stamped with the current time.
    pub fn mark_processed(&self, id: &str) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        self.inner.seen.insert(id.to_string(), Instant::now());
    }

    /// `true` iff `id` was marked processed within the retention window.
    pub fn is_processed(&self, id: &str) -> bool {
        if self.inner.closed.load(Ordering::Acquire) {
            return false;
        }
        match self.inner.seen.get(id) {
            Some(seen_at) => seen_at.elapsed() < self.inner.retention,
            None => false,
        }
    }

    /// Idempotently stop the evictor and clear the set. After this,
    /// `mark_processed` is a no-op and `is_processed` always returns `false`.
    pub fn close(&mut self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.notify_one();
        self.inner.seen.clear();
        if let Some(handle) = self.evictor.take() {
            handle.abort();
        }
    }
}

impl Inner {
    fn evict_expired(&self) {
        let cutoff = self.retention;
        self.seen.retain(|_, seen_at| seen_at.elapsed() < cutoff);
    }
}

impl Drop for IdempotencyTracker {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mark_then_check() {
        let tracker = IdempotencyTracker::new(Duration::from_secs(60));
        assert!(!tracker.is_processed("m1"));
        tracker.mark_processed("m1");
        assert!(tracker.is_processed("m1"));
    }

    #[tokio::test]
    async fn expired_entries_are_not_processed() {
        let tracker = IdempotencyTracker::new(Duration::from_millis(10));
        tracker.mark_processed("m1");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!tracker.is_processed("m1"));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_disables_tracking() {
        let mut tracker = IdempotencyTracker::new(Duration::from_secs(60));
        tracker.mark_processed("m1");
        tracker.close();
        tracker.close();
        assert!(!tracker.is_processed("m1"));
        tracker.mark_processed("m2");
        assert!(!tracker.is_processed("m2"));
    }
}
