//! Alias resolution with a bounded LRU cache.
//!
//! Maps `(value, scheme)` pairs — tickers, ISINs, company name variants —
//! to the canonical node guid behind them. Misses are cached too, so a
//! stream of unknown names from the extractor does not hammer the graph.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use gofriq::Result;

use crate::graph_store::GraphStore;

/// Default cache capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 2048;

type CacheKey = (String, Option<String>);

/// Resolves alias values to canonical guids through the graph, with an
/// in-process LRU cache (negative results included).
pub struct AliasResolver {
    graph: Arc<dyn GraphStore>,
    cache: Mutex<LruCache<CacheKey, Option<String>>>,
}

impl AliasResolver {
    /// Resolver with the default cache capacity.
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self::with_capacity(graph, DEFAULT_CACHE_CAPACITY)
    }

    /// Resolver with an explicit cache capacity (minimum 1).
    pub fn with_capacity(graph: Arc<dyn GraphStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self { graph, cache: Mutex::new(LruCache::new(capacity)) }
    }

    fn cache_key(value: &str, scheme: Option<&str>) -> CacheKey {
        (value.trim().to_lowercase(), scheme.map(str::to_uppercase))
    }

    /// Resolve a value (and optional scheme) to the canonical guid.
    ///
    /// Returns `None` for unknown aliases; the miss is cached.
    pub async fn resolve(&self, value: &str, scheme: Option<&str>) -> Result<Option<String>> {
        if value.trim().is_empty() {
            return Ok(None);
        }
        let key = Self::cache_key(value, scheme);

        if let Some(cached) = self.cache.lock().get(&key) {
            return Ok(cached.clone());
        }

        let resolved = self.graph.lookup_alias(value, scheme).await?;
        self.cache.lock().put(key, resolved.clone());
        Ok(resolved)
    }

    /// Resolve a ticker through the TICKER scheme.
    pub async fn resolve_ticker(&self, ticker: &str) -> Result<Option<String>> {
        self.resolve(ticker, Some("TICKER")).await
    }

    /// Drop every cached entry (used after bulk alias loads).
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    /// Number of cached entries, for diagnostics.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory_graph::MemoryGraph;

    async fn graph_with_alias() -> Arc<MemoryGraph> {
        let graph = Arc::new(MemoryGraph::new());
        graph.add_alias("TRUCK", "TICKER", "TRUCK").await.unwrap();
        graph.add_alias("Heavy Truck Co", "NAME_VARIANT", "TRUCK").await.unwrap();
        graph
    }

    #[tokio::test]
    async fn test_resolve_by_scheme() {
        let graph = graph_with_alias().await;
        let resolver = AliasResolver::new(graph);

        let hit = resolver.resolve("truck", Some("TICKER")).await.unwrap();
        assert_eq!(hit.as_deref(), Some("TRUCK"));

        let name = resolver.resolve("heavy truck co", Some("NAME_VARIANT")).await.unwrap();
        assert_eq!(name.as_deref(), Some("TRUCK"));
    }

    #[tokio::test]
    async fn test_resolve_without_scheme() {
        let graph = graph_with_alias().await;
        let resolver = AliasResolver::new(graph);
        let hit = resolver.resolve("Heavy Truck Co", None).await.unwrap();
        assert_eq!(hit.as_deref(), Some("TRUCK"));
    }

    #[tokio::test]
    async fn test_negative_result_cached() {
        let graph = graph_with_alias().await;
        let resolver = AliasResolver::new(graph.clone());

        assert_eq!(resolver.resolve("GHOST", Some("TICKER")).await.unwrap(), None);
        assert_eq!(resolver.cached_entries(), 1);

        // Adding the alias later is invisible until invalidation: the miss
        // was cached.
        graph.add_alias("GHOST", "TICKER", "GHOST-GUID").await.unwrap();
        assert_eq!(resolver.resolve("GHOST", Some("TICKER")).await.unwrap(), None);

        resolver.invalidate();
        assert_eq!(
            resolver.resolve("GHOST", Some("TICKER")).await.unwrap().as_deref(),
            Some("GHOST-GUID")
        );
    }

    #[tokio::test]
    async fn test_eviction_is_bounded() {
        let graph = graph_with_alias().await;
        let resolver = AliasResolver::with_capacity(graph, 2);

        resolver.resolve("a", None).await.unwrap();
        resolver.resolve("b", None).await.unwrap();
        resolver.resolve("c", None).await.unwrap();
        assert_eq!(resolver.cached_entries(), 2);
    }

    #[tokio::test]
    async fn test_empty_value_short_circuits() {
        let graph = graph_with_alias().await;
        let resolver = AliasResolver::new(graph);
        assert_eq!(resolver.resolve("  ", None).await.unwrap(), None);
        assert_eq!(resolver.cached_entries(), 0);
    }
}
