use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::ports::AnswerCache;

/// `subject::query::strict=<bool>`.
///
/// The subject always leads and the suffix is fixed for a given query and
/// flag, so two subjects never derive the same key for the same question.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(subject: &str, query: &str, strict: bool) -> Self {
        Self(format!("{subject}::{query}::strict={strict}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct CachedText {
    text: String,
    stored_at: Instant,
}

/// Process-local answer cache holding raw, pre-redaction text.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<CacheKey, CachedText>,
    ttl: Option<Duration>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries older than `ttl` read as misses.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: Some(ttl),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CachedText) -> bool {
        match self.ttl {
            Some(ttl) => entry.stored_at.elapsed() >= ttl,
            None => false,
        }
    }
}

#[async_trait]
impl AnswerCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>> {
        let expired = match self.entries.get(key) {
            Some(entry) if !self.is_expired(&entry) => return Ok(Some(entry.text.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| self.is_expired(entry));
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, text: &str) -> Result<()> {
        self.entries.insert(
            key.clone(),
            CachedText {
                text: text.to_string(),
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let key = CacheKey::derive("CLI-1", "What is PTO?", true);
        assert_eq!(key.as_str(), "CLI-1::What is PTO?::strict=true");
        assert_ne!(key, CacheKey::derive("CLI-1", "What is PTO?", false));
    }

    #[tokio::test]
    async fn stores_and_reads_back() {
        let cache = MemoryCache::new();
        let key = CacheKey::derive("A", "q", false);
        assert_eq!(cache.get(&key).await.unwrap(), None);
        cache.set(&key, "raw 24567579").await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("raw 24567579"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = MemoryCache::with_ttl(Duration::ZERO);
        let key = CacheKey::derive("A", "q", false);
        cache.set(&key, "text").await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
        assert!(cache.is_empty());

        let cache = MemoryCache::with_ttl(Duration::from_secs(3600));
        cache.set(&key, "text").await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("text"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_on_one_key_never_tear_values() {
        let cache = std::sync::Arc::new(MemoryCache::new());
        let key = CacheKey::derive("CLI-1", "q", false);
        let written: Vec<String> = (0..32).map(|i| format!("answer {i} ").repeat(64)).collect();
        let mut handles = Vec::new();
        for text in written.clone() {
            let cache = cache.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache.set(&key, &text).await.unwrap();
                cache.get(&key).await.unwrap()
            }));
        }
        for handle in handles {
            let seen = handle.await.unwrap().expect("a value is always present after a set");
            assert!(written.contains(&seen));
        }
        let last = cache.get(&key).await.unwrap().unwrap();
        assert!(written.contains(&last));
        assert_eq!(cache.len(), 1);
    }
}
