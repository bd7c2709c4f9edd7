use crate::constants::{
    LOCATION_CACHE_COORD_PRECISION, LOCATION_CACHE_MAX_ENTRIES, LOCATION_CACHE_TTL_SECONDS,
};
use crate::models::Coordinates;
use crate::services::collaborators::{ClientResult, LocationResolver, ResolvedLocation};
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory cache in front of a location resolver, keyed on coordinates
/// rounded to ~100 m. Only successful lookups are cached.
pub struct CachedLocationResolver {
    inner: Arc<dyn LocationResolver>,
    cache: Cache<(i64, i64), ResolvedLocation>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedLocationResolver {
    pub fn new(inner: Arc<dyn LocationResolver>) -> Self {
        Self::with_limits(
            inner,
            Duration::from_secs(LOCATION_CACHE_TTL_SECONDS),
            LOCATION_CACHE_MAX_ENTRIES,
        )
    }

    pub fn with_limits(inner: Arc<dyn LocationResolver>, ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_capacity)
            .build();

        CachedLocationResolver {
            inner,
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn cache_key(at: &Coordinates) -> (i64, i64) {
        let rounded = at.round(LOCATION_CACHE_COORD_PRECISION);
        let scale = 10_f64.powi(LOCATION_CACHE_COORD_PRECISION as i32);
        (
            (rounded.lat * scale).round() as i64,
            (rounded.lon * scale).round() as i64,
        )
    }

    /// `(hits, misses)` since startup.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[async_trait]
impl LocationResolver for CachedLocationResolver {
    async fn resolve(&self, at: &Coordinates) -> ClientResult<ResolvedLocation> {
        let key = Self::cache_key(at);
        if let Some(found) = self.cache.get(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(lat = at.lat, lon = at.lon, "Location cache hit");
            return Ok(found);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let resolved = self.inner.resolve(at).await?;
        self.cache.insert(key, resolved.clone()).await;
        Ok(resolved)
    }
}
