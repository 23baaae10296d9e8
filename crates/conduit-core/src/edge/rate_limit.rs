//! Per-client token-bucket rate limiting with idle-entry eviction.

use crate::resilience::{RateLimitError, RateLimiter};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// A per-client bucket plus the last time it was touched, so the sweeper can
/// evict clients that have gone quiet.
struct ClientBucket {
    limiter: RateLimiter,
    last_seen: Instant,
}

/// Per-IP token bucket rate limiter. Clients are created on demand on first
/// request and swept in the background once idle past a configured TTL.
pub struct ClientRateLimiter {
    buckets: Arc<DashMap<String, ClientBucket>>,
    rps: u32,
    burst: u32,
    sweeper: std::sync::Mutex<Option<JoinHandle<()>>>,
    stopped: Arc<AtomicBool>,
}

impl ClientRateLimiter {
    /// Build a limiter with the given per-client rate/burst and idle TTL. The
    /// sweeper runs every `max(ttl/2, 1 minute)`.
    pub fn new(rps: u32, burst: u32, ttl: Duration) -> Arc<Self> {
        let limiter = Arc::new(Self {
            buckets: Arc::new(DashMap::new()),
            rps,
            burst,
            sweeper: std::sync::Mutex::new(None),
            stopped: Arc::new(AtomicBool::new(false)),
        });
        limiter.clone().spawn_sweeper(ttl);
        limiter
    }

    fn spawn_sweeper(self: Arc<Self>, ttl: Duration) {
        let interval = ttl.max(Duration::from_secs(120)) / 2;
        let interval = interval.max(Duration::from_secs(60));
        let buckets = Arc::clone(&self.buckets);
        let stopped = Arc::clone(&self.stopped);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if stopped.load(Ordering::Acquire) {
                    return;
                }
                buckets.retain(|_, bucket| bucket.last_seen.elapsed() < ttl);
            }
        });
        *self.sweeper.lock().unwrap() = Some(handle);
    }

    /// Check whether `ip` may proceed, creating its bucket on first use.
    pub fn check(&self, ip: &str) -> Result<(), RateLimitError> {
        let mut entry = self
            .buckets
            .entry(ip.to_string())
            .or_insert_with(|| ClientBucket {
                limiter: RateLimiter::new(self.rps, self.burst),
                last_seen: Instant::now(),
            });
        entry.last_seen = Instant::now();
        entry.limiter.check()
    }

    /// Stop the background sweeper. Idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

impl Drop for ClientRateLimiter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Strip an optional `:port` suffix from a socket address string, matching
/// the real remote-address format (`ip:port` or a bare IPv6 literal).
pub fn strip_port(remote_addr: &str) -> &str {
    if remote_addr.starts_with('[') {
        // bracketed IPv6 with port, e.g. "[::1]:8080"
        return remote_addr
            .rsplit_once("]:")
            .map(|(host, _)| host.trim_start_matches('['))
            .unwrap_or(remote_addr);
    }
    match remote_addr.matches(':').count() {
        1 => remote_addr.rsplit_once(':').map(|(ip, _)| ip).unwrap_or(remote_addr),
        _ => remote_addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_port_handles_ipv4() {
        assert_eq!(strip_port("203.0.113.5:54321"), "203.0.113.5");
    }

    #[test]
    fn strip_port_handles_bare_ipv6() {
        assert_eq!(strip_port("::1"), "::1");
    }

    #[test]
    fn strip_port_handles_bracketed_ipv6() {
        assert_eq!(strip_port("[::1]:8080"), "::1");
    }

    #[tokio::test]
    async fn different_ips_do_not_share_buckets() {
        let limiter = ClientRateLimiter::new(1, 1, Duration::from_secs(60));
        assert!(limiter.check("1.1.1.1").is_ok());
        assert!(limiter.check("1.1.1.1").is_err());
        assert!(limiter.check("2.2.2.2").is_ok());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let limiter = ClientRateLimiter::new(10, 10, Duration::from_secs(60));
        limiter.stop();
        limiter.stop();
    }
}
