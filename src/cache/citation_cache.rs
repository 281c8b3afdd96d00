use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Thread-safe LRU cache of paper citation counts
///
/// Filled from the `CC` attribute of every paper record that passes through
/// an analyzer, and consulted when choosing how to look for bridge papers.
/// Shared across analyzers, so counts seen by one request help the next.
pub struct CitationCountCache {
    cache: Mutex<LruCache<i64, u64>>,
}

impl CitationCountCache {
    /// Create a cache holding at most `capacity` counts (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    /// Citation count of `paper_id`, if one has been seen.
    pub fn get(&self, paper_id: i64) -> Option<u64> {
        self.cache.lock().unwrap().get(&paper_id).copied()
    }

    pub fn put(&self, paper_id: i64, count: u64) {
        self.cache.lock().unwrap().put(paper_id, count);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}
