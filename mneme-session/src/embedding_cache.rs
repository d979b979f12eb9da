//! LRU cache in front of an [`EmbeddingProvider`].
//!
//! Recall re-embeds the same memory contents on every query; caching by
//! exact text keeps hybrid ranking of a 50-candidate batch cheap.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use mneme_core::embedding::EmbeddingProvider;
use mneme_core::error::Result;
use mneme_core::types::Embedding;
use parking_lot::Mutex;

/// Caching wrapper. Failed embeddings are not cached.
pub struct CachedEmbedder<E> {
    inner: E,
    cache: Mutex<LruCache<String, Embedding>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<E: EmbeddingProvider> CachedEmbedder<E> {
    /// Wrap `inner`, keeping at most `capacity` vectors (minimum 1).
    #[must_use]
    pub fn new(inner: E, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The wrapped provider.
    #[must_use]
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// `(hits, misses)` since creation.
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    /// Cached vectors right now.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl<E: EmbeddingProvider> EmbeddingProvider for CachedEmbedder<E> {
    fn embed(&self, text: &str) -> Result<Embedding> {
        if let Some(hit) = self.cache.lock().get(text) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Embed outside the lock; a concurrent miss on the same text just
        // computes the same vector twice.
        let embedding = self.inner.embed(text)?;
        self.cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mneme_core::embedding::TfIdfEmbedder;

    #[test]
    fn repeated_text_hits_cache() {
        let cached = CachedEmbedder::new(TfIdfEmbedder::default(), 8);
        let first = cached.embed("phoenix liveview project").expect("embed");
        let second = cached.embed("phoenix liveview project").expect("embed");
        assert_eq!(first, second);
        assert_eq!(cached.stats(), (1, 1));
        assert_eq!(cached.len(), 1);
    }

    #[test]
    fn capacity_bounds_entries() {
        let cached = CachedEmbedder::new(TfIdfEmbedder::default(), 2);
        for text in ["alpha beta", "gamma delta", "epsilon zeta"] {
            cached.embed(text).expect("embed");
        }
        assert_eq!(cached.len(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let cached = CachedEmbedder::new(TfIdfEmbedder::default(), 0);
        assert!(cached.embed("a the").is_err());
        assert!(cached.is_empty());
        assert_eq!(cached.dimensions(), 512);
        assert_eq!(cached.model_name(), cached.inner().model_name());
    }
}
