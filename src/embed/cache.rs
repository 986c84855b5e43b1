//! Content-addressed embedding cache
//!
//! Keys are blake3 hashes of normalized text plus the embedding space, so
//! identical content never pays for a second backend call. The cache is not
//! authoritative: losing an entry only costs recomputation.

use super::{Embedder, EmbeddingSpace};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Clone)]
struct CacheEntry {
    vector: Vec<f32>,
    inserted_at: DateTime<Utc>,
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Embedding cache fronting one embedder per space.
///
/// Entries are written once per key and never mutated in place; concurrent
/// readers always see either a complete vector or a miss.
pub struct EmbeddingCache {
    embedders: HashMap<EmbeddingSpace, Arc<dyn Embedder>>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    stats: RwLock<CacheStats>,
    max_entries: usize,
    ttl: Duration,
}

/// Fold whitespace runs and case so cosmetically different text shares a key
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn cache_key(text: &str, space: EmbeddingSpace) -> String {
    let normalized = normalize_text(text);
    let hash = blake3::hash(normalized.as_bytes());
    format!("{}:{}", space, hash.to_hex())
}

impl EmbeddingCache {
    pub fn new(
        embedders: HashMap<EmbeddingSpace, Arc<dyn Embedder>>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            embedders,
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            max_entries: config.max_entries,
            ttl: Duration::seconds(config.ttl_secs as i64),
        }
    }

    fn embedder(&self, space: EmbeddingSpace) -> Result<&Arc<dyn Embedder>> {
        self.embedders
            .get(&space)
            .ok_or_else(|| Error::Embedding(format!("No embedder configured for space '{}'", space)))
    }

    /// Look up one text, computing and caching it on a miss.
    ///
    /// Backend failures propagate and are never cached.
    pub async fn get_or_compute(&self, text: &str, space: EmbeddingSpace) -> Result<Vec<f32>> {
        let vectors = self.get_or_compute_batch(&[text.to_string()], space).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Backend returned no vector".to_string()))
    }

    /// Batch variant: only the uncached texts hit the backend.
    pub async fn get_or_compute_batch(
        &self,
        texts: &[String],
        space: EmbeddingSpace,
    ) -> Result<Vec<Vec<f32>>> {
        let now = Utc::now();
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut missing: Vec<(usize, String)> = Vec::new();

        {
            let entries = self.entries.read().await;
            let mut stats = self.stats.write().await;

            for (i, text) in texts.iter().enumerate() {
                let key = cache_key(text, space);
                match entries.get(&key) {
                    Some(entry) if now - entry.inserted_at <= self.ttl => {
                        stats.hits += 1;
                        results[i] = Some(entry.vector.clone());
                    }
                    _ => {
                        stats.misses += 1;
                        missing.push((i, text.clone()));
                    }
                }
            }
        }

        if !missing.is_empty() {
            debug!("Cache miss for {} of {} texts", missing.len(), texts.len());

            let uncached: Vec<String> = missing.iter().map(|(_, t)| t.clone()).collect();
            let computed = self.embedder(space)?.embed(uncached).await?;

            if computed.len() != missing.len() {
                return Err(Error::Embedding(format!(
                    "Backend returned {} vectors for {} inputs",
                    computed.len(),
                    missing.len()
                )));
            }

            self.evict_if_full(missing.len()).await;

            let mut entries = self.entries.write().await;
            for ((i, text), vector) in missing.into_iter().zip(computed) {
                entries.insert(
                    cache_key(&text, space),
                    CacheEntry {
                        vector: vector.clone(),
                        inserted_at: now,
                    },
                );
                results[i] = Some(vector);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Drop expired entries. Safe to call at any time; eviction only costs
    /// recomputation.
    pub async fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - self.ttl;
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at > cutoff);
        let removed = before - entries.len();

        if removed > 0 {
            let mut stats = self.stats.write().await;
            stats.evictions += removed as u64;
            debug!("Evicted {} expired embedding cache entries", removed);
        }
        removed
    }

    async fn evict_if_full(&self, incoming: usize) {
        let mut entries = self.entries.write().await;
        if entries.len() + incoming <= self.max_entries {
            return;
        }

        // Oldest entries go first
        let mut by_age: Vec<(String, DateTime<Utc>)> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.inserted_at))
            .collect();
        by_age.sort_by_key(|(_, at)| *at);

        let excess = entries.len() + incoming - self.max_entries;
        let mut stats = self.stats.write().await;
        for (key, _) in by_age.into_iter().take(excess) {
            entries.remove(&key);
            stats.evictions += 1;
        }
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Spawn a periodic cleanup task. The task holds a weak reference so it
    /// winds down once the cache is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>, config: &CacheConfig) -> tokio::task::JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let interval = std::time::Duration::from_secs(config.cleanup_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.cleanup().await;
                    }
                    None => {
                        warn!("Embedding cache dropped; stopping cleanup task");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CountingEmbedder {
        calls: RwLock<usize>,
        fail: bool,
    }

    impl CountingEmbedder {
        fn new(fail: bool) -> Self {
            Self {
                calls: RwLock::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            *self.calls.write().await += 1;
            if self.fail {
                return Err(Error::Embedding("backend unavailable".to_string()));
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let h = blake3::hash(t.as_bytes());
                    h.as_bytes()[..4].iter().map(|b| *b as f32 / 255.0).collect()
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn space(&self) -> EmbeddingSpace {
            EmbeddingSpace::Local
        }
    }

    fn cache_with(embedder: Arc<CountingEmbedder>, config: CacheConfig) -> EmbeddingCache {
        let mut embedders: HashMap<EmbeddingSpace, Arc<dyn Embedder>> = HashMap::new();
        embedders.insert(EmbeddingSpace::Local, embedder);
        EmbeddingCache::new(embedders, &config)
    }

    #[tokio::test]
    async fn test_second_lookup_hits_cache() {
        let embedder = Arc::new(CountingEmbedder::new(false));
        let cache = cache_with(Arc::clone(&embedder), CacheConfig::default());

        let a = cache
            .get_or_compute("hello world", EmbeddingSpace::Local)
            .await
            .unwrap();
        let b = cache
            .get_or_compute("hello world", EmbeddingSpace::Local)
            .await
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(*embedder.calls.read().await, 1);

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_normalization_folds_whitespace_and_case() {
        let embedder = Arc::new(CountingEmbedder::new(false));
        let cache = cache_with(Arc::clone(&embedder), CacheConfig::default());

        cache
            .get_or_compute("Hello   World", EmbeddingSpace::Local)
            .await
            .unwrap();
        cache
            .get_or_compute("  hello world\n", EmbeddingSpace::Local)
            .await
            .unwrap();

        assert_eq!(*embedder.calls.read().await, 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let failing = Arc::new(CountingEmbedder::new(true));
        let cache = cache_with(Arc::clone(&failing), CacheConfig::default());

        assert!(cache
            .get_or_compute("text", EmbeddingSpace::Local)
            .await
            .is_err());
        assert!(cache
            .get_or_compute("text", EmbeddingSpace::Local)
            .await
            .is_err());

        // Both attempts reached the backend; nothing was cached
        assert_eq!(*failing.calls.read().await, 2);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_batch_only_embeds_missing() {
        let embedder = Arc::new(CountingEmbedder::new(false));
        let cache = cache_with(Arc::clone(&embedder), CacheConfig::default());

        cache
            .get_or_compute("first", EmbeddingSpace::Local)
            .await
            .unwrap();

        let vectors = cache
            .get_or_compute_batch(
                &["first".to_string(), "second".to_string()],
                EmbeddingSpace::Local,
            )
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(*embedder.calls.read().await, 2);
    }

    #[tokio::test]
    async fn test_size_bound_evicts() {
        let embedder = Arc::new(CountingEmbedder::new(false));
        let config = CacheConfig {
            max_entries: 5,
            ..CacheConfig::default()
        };
        let cache = cache_with(embedder, config);

        for i in 0..10 {
            cache
                .get_or_compute(&format!("text {}", i), EmbeddingSpace::Local)
                .await
                .unwrap();
        }

        assert!(cache.len().await <= 5);
        assert!(cache.stats().await.evictions > 0);
    }

    #[tokio::test]
    async fn test_clear_forces_recompute() {
        let embedder = Arc::new(CountingEmbedder::new(false));
        let cache = cache_with(Arc::clone(&embedder), CacheConfig::default());

        cache
            .get_or_compute("text", EmbeddingSpace::Local)
            .await
            .unwrap();
        cache.clear().await;
        cache
            .get_or_compute("text", EmbeddingSpace::Local)
            .await
            .unwrap();

        assert_eq!(*embedder.calls.read().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_evicts_expired_entries() {
        let embedder = Arc::new(CountingEmbedder::new(false));
        let config = CacheConfig {
            ttl_secs: 0,
            cleanup_interval_secs: 1,
            ..CacheConfig::default()
        };
        let cache = Arc::new(cache_with(embedder, config.clone()));
        let handle = cache.spawn_cleanup(&config);

        cache
            .get_or_compute("text", EmbeddingSpace::Local)
            .await
            .unwrap();
        assert_eq!(cache.len().await, 1);

        for _ in 0..20 {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            if cache.is_empty().await {
                break;
            }
        }
        assert!(cache.is_empty().await);
        handle.abort();
    }

    #[tokio::test]
    async fn test_ttl_cleanup() {
        let embedder = Arc::new(CountingEmbedder::new(false));
        let config = CacheConfig {
            ttl_secs: 0,
            ..CacheConfig::default()
        };
        let cache = cache_with(embedder, config);

        cache
            .get_or_compute("text", EmbeddingSpace::Local)
            .await
            .unwrap();
        // TTL of zero: the entry is expired as soon as time advances
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let removed = cache.cleanup().await;
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 0);
    }
}
