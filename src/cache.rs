//! # Cache Module
//!
//! Key-value cache in front of the relational store. [`CacheStore`] is the
//! seam: Redis in production, [`MemoryCache`] when no Redis is configured and
//! in tests. [`get_or_load`] implements the cache-aside read path.

use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How long a registered user row stays cached
pub const USER_TTL: Duration = Duration::from_secs(60 * 60);

/// How long a miss (absent row, empty list) stays cached
pub const NEGATIVE_TTL: Duration = Duration::from_secs(60);

/// Capacity of the in-process cache
pub const MAX_MEMORY_ENTRIES: u64 = 100_000;

/// Cache keys used by the catalog service
pub mod keys {
    pub const CATEGORIES: &str = "categories";

    pub fn category_by_name(name: &str) -> String {
        format!("category:name:{name}")
    }

    pub fn products_of_category(category_id: i64) -> String {
        format!("products:category:{category_id}")
    }

    pub fn product(product_id: i64) -> String {
        format!("product:{product_id}")
    }

    pub fn cart(user_id: i64) -> String {
        format!("cart:{user_id}")
    }

    pub fn user(telegram_id: i64) -> String {
        format!("user:{telegram_id}")
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value; `None` keeps it until invalidated
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    async fn invalidate(&self, keys: &[String]) -> Result<()>;
}

/// Redis-backed cache sharing one multiplexed connection
#[derive(Clone)]
pub struct RedisCache {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid Redis URL")?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .with_context(|| format!("Redis GET {key} failed"))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn
                    .set_ex(key, value, ttl.as_secs().max(1))
                    .await
                    .with_context(|| format!("Redis SETEX {key} failed"))?;
            }
            None => {
                let _: () = conn
                    .set(key, value)
                    .await
                    .with_context(|| format!("Redis SET {key} failed"))?;
            }
        }
        Ok(())
    }

    async fn invalidate(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(keys.to_vec())
            .await
            .with_context(|| format!("Redis DEL {keys:?} failed"))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    ttl: Option<Duration>,
}

/// Expiry taken from each entry's own TTL, reset on overwrite
struct EntryTtl;

impl Expiry<String, MemoryEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &MemoryEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &MemoryEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// In-process cache with per-entry expiry and a bounded size
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, MemoryEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(MAX_MEMORY_ENTRIES)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryTtl)
            .build();
        Self { entries }
    }

    /// Number of live entries once pending evictions have run
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        self.entries
            .insert(key.to_string(), MemoryEntry { value, ttl })
            .await;
        Ok(())
    }

    async fn invalidate(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.entries.invalidate(key.as_str()).await;
        }
        Ok(())
    }
}

/// TTL for a value about to be cached. Misses (`null`, `[]`) never outlive
/// [`NEGATIVE_TTL`] since their keys can come from forged callback data.
pub fn entry_ttl(raw: &str, ttl: Option<Duration>) -> Option<Duration> {
    if raw == "null" || raw == "[]" {
        Some(ttl.map_or(NEGATIVE_TTL, |ttl| ttl.min(NEGATIVE_TTL)))
    } else {
        ttl
    }
}

/// Cache-aside read: return the cached value for `key`, or run `load`,
/// cache its JSON and return it.
///
/// A broken cache never fails the read; it is logged and the store answers.
pub async fn get_or_load<T, F, Fut>(
    cache: &dyn CacheStore,
    key: &str,
    ttl: Option<Duration>,
    load: F,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
            Ok(value) => {
                debug!(key, "Cache hit");
                return Ok(value);
            }
            Err(e) => warn!(key, error = %e, "Discarding undecodable cache entry"),
        },
        Ok(None) => debug!(key, "Cache miss"),
        Err(e) => warn!(key, error = %e, "Cache read failed, falling back to store"),
    }

    let value = load().await?;

    match serde_json::to_string(&value) {
        Ok(raw) => {
            let ttl = entry_ttl(&raw, ttl);
            if let Err(e) = cache.set(key, raw, ttl).await {
                warn!(key, error = %e, "Failed to populate cache");
            }
        }
        Err(e) => warn!(key, error = %e, "Failed to serialize value for cache"),
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_memory_cache_ttl_expiry() -> Result<()> {
        let cache = MemoryCache::new();
        cache
            .set("short", "1".to_string(), Some(Duration::from_millis(20)))
            .await?;
        cache.set("forever", "2".to_string(), None).await?;

        assert_eq!(cache.get("short").await?, Some("1".to_string()));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("short").await?, None);
        assert_eq!(cache.get("forever").await?, Some("2".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_cache_drops_expired_keys_never_read_again() -> Result<()> {
        let cache = MemoryCache::new();
        for id in 0..1000 {
            cache
                .set(&keys::product(id), "null".to_string(), Some(Duration::from_millis(1)))
                .await?;
        }
        // Expired entries are swept on the timer wheel's next tick (about a second)
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        for id in 0..10 {
            cache.set(&keys::cart(id), "[]".to_string(), None).await?;
        }

        assert_eq!(cache.entry_count().await, 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_cache_is_bounded() -> Result<()> {
        let cache = MemoryCache::with_capacity(50);
        for id in 0..500 {
            cache.set(&keys::user(id), "{}".to_string(), None).await?;
        }

        assert!(cache.entry_count().await <= 50);
        Ok(())
    }

    #[test]
    fn test_misses_get_a_short_ttl() {
        assert_eq!(entry_ttl("null", None), Some(NEGATIVE_TTL));
        assert_eq!(entry_ttl("[]", None), Some(NEGATIVE_TTL));
        assert_eq!(
            entry_ttl("null", Some(Duration::from_secs(5))),
            Some(Duration::from_secs(5))
        );
        assert_eq!(entry_ttl("null", Some(USER_TTL)), Some(NEGATIVE_TTL));
        assert_eq!(entry_ttl("[{\"id\":1}]", None), None);
        assert_eq!(entry_ttl("{}", Some(USER_TTL)), Some(USER_TTL));
    }

    #[tokio::test]
    async fn test_get_or_load_hits_store_once_until_invalidated() -> Result<()> {
        let cache = MemoryCache::new();
        let counter = AtomicUsize::new(0);
        let loads = &counter;
        let load = move || async move {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>(vec!["Pizza".to_string(), "Drinks".to_string()])
        };

        let first: Vec<String> = get_or_load(&cache, keys::CATEGORIES, None, load).await?;
        let second: Vec<String> = get_or_load(&cache, keys::CATEGORIES, None, load).await?;
        assert_eq!(first, second);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        cache.invalidate(&[keys::CATEGORIES.to_string()]).await?;
        let _: Vec<String> = get_or_load(&cache, keys::CATEGORIES, None, load).await?;
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_or_load_ignores_corrupt_entry() -> Result<()> {
        let cache = MemoryCache::new();
        cache.set("product:1", "not json".to_string(), None).await?;

        let value: i64 = get_or_load(&cache, "product:1", None, || async { Ok::<_, anyhow::Error>(7) }).await?;
        assert_eq!(value, 7);
        assert_eq!(cache.get("product:1").await?, Some("7".to_string()));
        Ok(())
    }

    #[test]
    fn test_keys_are_deterministic() {
        assert_eq!(keys::products_of_category(3), "products:category:3");
        assert_eq!(keys::cart(42), "cart:42");
        assert_eq!(keys::user(42), "user:42");
    }
}
