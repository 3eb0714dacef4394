//! JSON cache access for the slot services.
//!
//! `ResilientCacheClient` talks to Redis with per-operation timeouts,
//! bounded retries and a background health check. `MemoryCache` honours
//! the same contract in process and backs local runs and tests.

pub mod client;
pub mod error;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

pub use client::ResilientCacheClient;
pub use error::CacheError;
pub use memory::MemoryCache;

/// Write semantics for `JsonCache::set_json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Only written when the key is absent. First writer wins.
    CreateOnly,
    Overwrite,
}

#[async_trait]
pub trait JsonCache: Send + Sync {
    async fn get_json(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Values come back in the same order as `keys`.
    async fn mget_json(&self, keys: &[String]) -> Result<Vec<Option<Value>>, CacheError>;

    /// Returns `false` when a `CreateOnly` write found the key already set.
    async fn set_json(
        &self,
        key: &str,
        value: &Value,
        ttl: Duration,
        mode: SetMode,
    ) -> Result<bool, CacheError>;
}
