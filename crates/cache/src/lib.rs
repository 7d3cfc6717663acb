//! Reference in-memory cache for ghostcache
//!
//! A bounded LRU map with per-entry TTLs. It implements
//! [`ghostcache_aof::CacheBackend`], so it can be replayed from and
//! compacted into an append-only log, and it reports every mutation to an
//! attached [`ghostcache_aof::RecordSink`].

pub mod store;

pub use store::LruCache;
