//! Fixed-window request admission control.
//!
//! [`RateLimiter`] keeps an in-memory map from caller identifier to a
//! counted window. It is an explicitly constructed component — share it
//! via `Arc<RateLimiter>` and call [`RateLimiter::start_sweep`] once at
//! startup — so tests can instantiate isolated instances instead of
//! fighting a process-wide singleton.
//!
//! The algorithm is a fixed (not sliding) window: the first request for
//! an identifier opens a window of `quota.window` and counts 1; later
//! requests in the same window increment the counter; once the window
//! has passed, the entry is lazily deleted on next access and a fresh
//! window starts. Rejected requests do not increment the counter.
//!
//! Counters are not persisted; on process restart the limiter fails
//! open. Callers without a user id or forwarded IP all share the
//! literal `"unknown"` bucket — a documented limitation, kept as is.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::types::Timestamp;

/// How often the background sweep evicts expired windows.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Bucket identifier for callers with no user id and no forwarded IP.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

// ---------------------------------------------------------------------------
// Quota
// ---------------------------------------------------------------------------

/// A request quota: at most `max_requests` per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitQuota {
    max_requests: u32,
    window: Duration,
}

impl RateLimitQuota {
    /// Build a quota, rejecting misconfiguration up front. A zero
    /// `max_requests` or zero window would deny or allow everything;
    /// both are configuration errors, caught at load time rather than
    /// at request time.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, CoreError> {
        if max_requests == 0 {
            return Err(CoreError::Validation(
                "Rate limit max_requests must be at least 1".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(CoreError::Validation(
                "Rate limit window must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Default quotas per operation class. Callers may override these from
/// configuration; the algorithm itself never hard-codes a limit.
pub mod quotas {
    use super::RateLimitQuota;
    use std::time::Duration;

    const MINUTE: Duration = Duration::from_secs(60);

    /// Music generation: 10 requests / 60 s.
    pub fn music_generation() -> RateLimitQuota {
        RateLimitQuota {
            max_requests: 10,
            window: MINUTE,
        }
    }

    /// Prompt improvement: 20 requests / 60 s.
    pub fn prompt_improvement() -> RateLimitQuota {
        RateLimitQuota {
            max_requests: 20,
            window: MINUTE,
        }
    }

    /// Lyrics generation: 15 requests / 60 s.
    pub fn lyrics_generation() -> RateLimitQuota {
        RateLimitQuota {
            max_requests: 15,
            window: MINUTE,
        }
    }

    /// Stem separation: 5 requests / 60 s.
    pub fn stem_separation() -> RateLimitQuota {
        RateLimitQuota {
            max_requests: 5,
            window: MINUTE,
        }
    }

    /// General API traffic: 100 requests / 60 s.
    pub fn general_api() -> RateLimitQuota {
        RateLimitQuota {
            max_requests: 100,
            window: MINUTE,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// The outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window (0 when rejected).
    pub remaining: u32,
    /// When the current window resets.
    pub reset_at: Timestamp,
}

impl RateLimitDecision {
    /// Seconds the caller should wait before retrying, rounded up.
    /// Suitable for a `Retry-After` header.
    pub fn retry_after_secs(&self, now: Timestamp) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000)
    }
}

// ---------------------------------------------------------------------------
// Limiter
// ---------------------------------------------------------------------------

struct WindowEntry {
    count: u32,
    reset_at: Timestamp,
}

/// In-memory fixed-window rate limiter.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, WindowEntry>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check and count a request for `identifier` under `quota`.
    ///
    /// This is the single critical section per key: the lookup,
    /// lazy eviction, and increment happen under one lock so concurrent
    /// requests from the same identifier cannot lose updates. It never
    /// fails — a poisoned lock is recovered, not propagated.
    pub fn check(&self, identifier: &str, quota: &RateLimitQuota) -> RateLimitDecision {
        let now = chrono::Utc::now();
        let mut windows = self.lock_windows();

        // Lazy eviction: an expired window is deleted on access.
        if windows
            .get(identifier)
            .is_some_and(|entry| entry.reset_at <= now)
        {
            windows.remove(identifier);
        }

        match windows.get_mut(identifier) {
            None => {
                let reset_at = now
                    + chrono::Duration::from_std(quota.window)
                        .unwrap_or_else(|_| chrono::Duration::seconds(60));
                windows.insert(
                    identifier.to_string(),
                    WindowEntry { count: 1, reset_at },
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: quota.max_requests - 1,
                    reset_at,
                }
            }
            Some(entry) if entry.count >= quota.max_requests => RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: entry.reset_at,
            },
            Some(entry) => {
                entry.count += 1;
                RateLimitDecision {
                    allowed: true,
                    remaining: quota.max_requests - entry.count,
                    reset_at: entry.reset_at,
                }
            }
        }
    }

    /// Remove all expired windows. Returns how many were evicted.
    pub fn evict_expired(&self) -> usize {
        let now = chrono::Utc::now();
        let mut windows = self.lock_windows();
        let before = windows.len();
        windows.retain(|_, entry| entry.reset_at > now);
        before - windows.len()
    }

    /// Number of live windows (expired-but-unswept entries included).
    pub fn window_count(&self) -> usize {
        self.lock_windows().len()
    }

    /// Spawn the periodic eviction task bounding the map's memory.
    /// The task exits when `cancel` is triggered.
    pub fn start_sweep(
        limiter: Arc<RateLimiter>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Rate limiter sweep stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        let evicted = limiter.evict_expired();
                        if evicted > 0 {
                            tracing::debug!(evicted, "Rate limiter sweep evicted expired windows");
                        }
                    }
                }
            }
        })
    }

    fn lock_windows(&self) -> MutexGuard<'_, HashMap<String, WindowEntry>> {
        // A panic while holding the lock leaves the map structurally
        // intact (counters may be slightly off), so recover instead of
        // propagating the poison to every later request.
        match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(max: u32, window_ms: u64) -> RateLimitQuota {
        RateLimitQuota::new(max, Duration::from_millis(window_ms)).unwrap()
    }

    #[test]
    fn quota_rejects_zero_max_requests() {
        assert!(RateLimitQuota::new(0, Duration::from_secs(60)).is_err());
    }

    #[test]
    fn quota_rejects_zero_window() {
        assert!(RateLimitQuota::new(10, Duration::ZERO).is_err());
    }

    #[test]
    fn first_request_opens_window() {
        let limiter = RateLimiter::new();
        let decision = limiter.check("user-1", &quota(3, 60_000));
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn request_over_limit_is_rejected_without_increment() {
        let limiter = RateLimiter::new();
        let q = quota(3, 60_000);

        for _ in 0..3 {
            assert!(limiter.check("user-1", &q).allowed);
        }

        // 4th and 5th are both rejected: rejection must not consume quota.
        let fourth = limiter.check("user-1", &q);
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
        assert!(!limiter.check("user-1", &q).allowed);
    }

    #[test]
    fn identifiers_have_independent_windows() {
        let limiter = RateLimiter::new();
        let q = quota(1, 60_000);

        assert!(limiter.check("user-1", &q).allowed);
        assert!(!limiter.check("user-1", &q).allowed);
        assert!(limiter.check("user-2", &q).allowed);
    }

    #[tokio::test]
    async fn window_expiry_resets_the_counter() {
        let limiter = RateLimiter::new();
        let q = quota(2, 30);

        assert!(limiter.check("user-1", &q).allowed);
        assert!(limiter.check("user-1", &q).allowed);
        assert!(!limiter.check("user-1", &q).allowed);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let fresh = limiter.check("user-1", &q);
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 1);
    }

    #[tokio::test]
    async fn evict_expired_drops_only_stale_windows() {
        let limiter = RateLimiter::new();
        limiter.check("short", &quota(5, 20));
        limiter.check("long", &quota(5, 60_000));
        assert_eq!(limiter.window_count(), 2);

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(limiter.evict_expired(), 1);
        assert_eq!(limiter.window_count(), 1);
    }

    #[test]
    fn retry_after_rounds_up_and_never_goes_negative() {
        let now = chrono::Utc::now();
        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at: now + chrono::Duration::milliseconds(1500),
        };
        assert_eq!(decision.retry_after_secs(now), 2);

        let stale = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at: now - chrono::Duration::seconds(5),
        };
        assert_eq!(stale.retry_after_secs(now), 0);
    }

    #[test]
    fn preset_quotas_are_valid() {
        for q in [
            quotas::music_generation(),
            quotas::prompt_improvement(),
            quotas::lyrics_generation(),
            quotas::stem_separation(),
            quotas::general_api(),
        ] {
            assert!(q.max_requests() > 0);
            assert!(!q.window().is_zero());
        }
        assert_eq!(quotas::music_generation().max_requests(), 10);
        assert_eq!(quotas::stem_separation().max_requests(), 5);
    }
}
