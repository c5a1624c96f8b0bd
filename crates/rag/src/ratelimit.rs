use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

pub const WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 1;
pub const GLOBAL_KEY: &str = "global";
/// Map size past which expired buckets are swept on the next call.
pub const DEFAULT_SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: Instant,
    count: u32,
}

/// Fixed 60 second window per admission key.
///
/// Buckets live in a sharded map; a call only locks the shard of its own
/// key, so different callers never wait on each other. Buckets whose window
/// has passed carry no state worth keeping and are swept once the map grows
/// past the sweep threshold.
pub struct RateLimiter {
    qpm: u32,
    sweep_threshold: usize,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(qpm: u32) -> Self {
        Self {
            qpm,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            buckets: DashMap::new(),
        }
    }

    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold;
        self
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drops every bucket whose window ended before `now`.
    pub fn sweep_expired(&self, now: Instant) {
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.window_start) < WINDOW);
    }

    pub fn qpm(&self) -> u32 {
        self.qpm
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        let allowed = self.charge(key, now);
        if self.buckets.len() > self.sweep_threshold {
            self.sweep_expired(now);
        }
        allowed
    }

    fn charge(&self, key: &str, now: Instant) -> bool {
        match self.buckets.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Bucket {
                    window_start: now,
                    count: 1,
                });
                true
            }
            Entry::Occupied(mut slot) => {
                let bucket = slot.get_mut();
                if now.saturating_duration_since(bucket.window_start) >= WINDOW {
                    bucket.window_start = now;
                    bucket.count = 1;
                    true
                } else if bucket.count < self.qpm {
                    bucket.count += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Whole seconds left in the key's window, never zero.
    pub fn retry_after(&self, key: &str) -> u64 {
        self.retry_after_at(key, Instant::now())
    }

    pub fn retry_after_at(&self, key: &str, now: Instant) -> u64 {
        let Some(bucket) = self.buckets.get(key).map(|b| *b) else {
            return DEFAULT_RETRY_AFTER_SECS;
        };
        let elapsed = now.saturating_duration_since(bucket.window_start);
        let remaining = WINDOW.saturating_sub(elapsed);
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        secs.max(DEFAULT_RETRY_AFTER_SECS)
    }
}

/// Which budget a request is charged against: credential, then session,
/// then one shared anonymous bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionKey {
    Credential(String),
    Session(String),
    Global,
}

impl AdmissionKey {
    pub fn select(api_key: Option<&str>, session_id: Option<&str>) -> Self {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }
        if let Some(key) = present(api_key) {
            return AdmissionKey::Credential(key.to_string());
        }
        if let Some(session) = present(session_id) {
            return AdmissionKey::Session(session.to_string());
        }
        AdmissionKey::Global
    }

    pub fn bucket_key(&self) -> String {
        match self {
            AdmissionKey::Credential(key) => format!("key:{key}"),
            AdmissionKey::Session(session) => format!("session:{session}"),
            AdmissionKey::Global => GLOBAL_KEY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_after_budget_and_keeps_keys_apart() {
        let limiter = RateLimiter::new(3);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.allow_at("a", now));
        }
        for _ in 3..6 {
            assert!(!limiter.allow_at("a", now));
        }
        assert!(limiter.allow_at("b", now));
    }

    #[test]
    fn window_resets_after_sixty_seconds() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        assert!(limiter.allow_at("a", start));
        assert!(!limiter.allow_at("a", start + Duration::from_secs(59)));
        assert!(limiter.allow_at("a", start + WINDOW));
        assert!(!limiter.allow_at("a", start + WINDOW));
    }

    #[test]
    fn retry_after_counts_down() {
        let limiter = RateLimiter::new(1);
        let start = Instant::now();
        assert_eq!(limiter.retry_after_at("unknown", start), DEFAULT_RETRY_AFTER_SECS);
        limiter.allow_at("a", start);
        assert_eq!(limiter.retry_after_at("a", start), 60);
        assert_eq!(limiter.retry_after_at("a", start + Duration::from_millis(10_500)), 50);
        assert_eq!(limiter.retry_after_at("a", start + WINDOW), DEFAULT_RETRY_AFTER_SECS);
    }

    #[test]
    fn expired_buckets_are_swept_past_the_threshold() {
        let limiter = RateLimiter::new(5).with_sweep_threshold(2);
        let start = Instant::now();
        limiter.allow_at("a", start);
        limiter.allow_at("b", start);
        assert_eq!(limiter.len(), 2);
        limiter.allow_at("c", start + WINDOW + Duration::from_secs(1));
        assert_eq!(limiter.len(), 1);

        let later = start + WINDOW * 3;
        for i in 0..500 {
            limiter.allow_at(&format!("rot-{i}"), later + WINDOW * i);
        }
        assert!(limiter.len() <= 3);
    }

    #[test]
    fn live_buckets_survive_a_sweep() {
        let limiter = RateLimiter::new(1).with_sweep_threshold(1);
        let start = Instant::now();
        assert!(limiter.allow_at("a", start));
        assert!(limiter.allow_at("b", start + Duration::from_secs(1)));
        assert!(!limiter.allow_at("a", start + Duration::from_secs(2)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_on_one_key_admit_exactly_the_budget() {
        const BUDGET: u32 = 50;
        let limiter = std::sync::Arc::new(RateLimiter::new(BUDGET));
        let handles: Vec<_> = (0..BUDGET * 2)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.allow("k") })
            })
            .collect();
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, BUDGET);
    }

    #[test]
    fn admission_key_prefers_credential() {
        assert_eq!(
            AdmissionKey::select(Some("k1"), Some("s1")),
            AdmissionKey::Credential("k1".to_string())
        );
        assert_eq!(
            AdmissionKey::select(Some("  "), Some("s1")),
            AdmissionKey::Session("s1".to_string())
        );
        assert_eq!(AdmissionKey::select(None, None), AdmissionKey::Global);
        assert_eq!(AdmissionKey::Global.bucket_key(), "global");
        assert_ne!(
            AdmissionKey::Credential("x".into()).bucket_key(),
            AdmissionKey::Session("x".into()).bucket_key()
        );
    }
}
