use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, RedisError};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use shared_config::RedisSettings;
use shared_utils::{Backoff, RetryPolicy};

use crate::{CacheError, JsonCache, SetMode};

/// Redis-backed JSON cache shared by every request in the process.
///
/// The connection is opened lazily and guarded by a single async mutex, so
/// concurrent callers never race to connect. Every operation is bounded by
/// `operation_timeout` and retried up to `retry_attempts` times, with a single
/// reconnect attempt before each retry. A retry skips the reconnect when a
/// concurrent caller already replaced the connection. Payloads that fail to
/// decode are reported immediately.
pub struct ResilientCacheClient {
    client: Client,
    settings: RedisSettings,
    connection: Mutex<Option<ConnectionManager>>,
    generation: AtomicU64,
    health_task: StdMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ResilientCacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientCacheClient")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ResilientCacheClient {
    pub fn new(settings: RedisSettings) -> Result<Self, CacheError> {
        let client = Client::open(settings.url.as_str()).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            CacheError::Config(format!("Invalid Redis URL: {}", e))
        })?;

        Ok(Self {
            client,
            settings,
            connection: Mutex::new(None),
            generation: AtomicU64::new(0),
            health_task: StdMutex::new(None),
        })
    }

    /// Spawns the periodic health check. Calling it again while the task is
    /// alive does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self
            .health_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(self);
        let interval = self.settings.health_check_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else { break };
                if let Err(e) = cache.ping().await {
                    warn!("Redis health check failed: {}", e);
                    if let Err(e) = cache.reconnect().await {
                        error!("Redis reconnect after failed health check did not succeed: {}", e);
                    }
                }
            }
        }));
        info!("Redis health check started (every {:?})", interval);
    }

    /// Stops the health check and drops the connection. Safe to call more
    /// than once.
    pub async fn close(&self) {
        let task = self
            .health_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }

        if self.connection.lock().await.take().is_some() {
            info!("Redis connection closed");
        }
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let (mut conn, _) = self.connection().await?;
        let reply = timeout(
            self.settings.operation_timeout,
            redis::cmd("PING").query_async::<_, String>(&mut conn),
        )
        .await;

        match reply {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(unavailable("PING", "", e)),
            Err(_) => Err(CacheError::Timeout {
                operation: "PING",
                key: String::new(),
                timeout: self.settings.operation_timeout,
            }),
        }
    }

    /// Drops the current connection and opens a new one, trying up to
    /// `reconnect_attempts` times with a linearly growing delay.
    pub async fn reconnect(&self) -> Result<(), CacheError> {
        let policy = RetryPolicy::new(
            self.settings.reconnect_attempts,
            Backoff::Linear(self.settings.reconnect_delay),
        );
        self.replace_connection(None, policy).await
    }

    /// Replaces the connection unless it already changed since generation
    /// `seen` was handed out.
    async fn replace_connection(
        &self,
        seen: Option<u64>,
        policy: RetryPolicy,
    ) -> Result<(), CacheError> {
        let mut guard = self.connection.lock().await;
        if let Some(seen) = seen {
            if guard.is_some() && self.generation.load(Ordering::SeqCst) != seen {
                debug!("Redis connection already replaced, skipping reconnect");
                return Ok(());
            }
        }
        guard.take();

        let conn = policy
            .run(|_| self.connect(), CacheError::is_transient)
            .await?;
        *guard = Some(conn);
        self.generation.fetch_add(1, Ordering::SeqCst);
        info!("Redis reconnected");
        Ok(())
    }

    /// Current connection and its generation, connecting on first use.
    async fn connection(&self) -> Result<(ConnectionManager, u64), CacheError> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok((conn.clone(), self.generation.load(Ordering::SeqCst)));
        }

        let conn = self.connect().await?;
        *guard = Some(conn.clone());
        Ok((conn, self.generation.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn connect(&self) -> Result<ConnectionManager, CacheError> {
        debug!("Connecting to Redis");
        match timeout(
            self.settings.connect_timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(unavailable("CONNECT", "", e)),
            Err(_) => Err(CacheError::Timeout {
                operation: "CONNECT",
                key: String::new(),
                timeout: self.settings.connect_timeout,
            }),
        }
    }

    async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        key: &str,
        command: F,
    ) -> Result<T, CacheError>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = Result<T, RedisError>>,
    {
        let policy = RetryPolicy::new(self.settings.retry_attempts, Backoff::None);
        let command = &command;
        let seen = AtomicU64::new(0);
        let seen = &seen;

        policy
            .run(
                |attempt| async move {
                    if attempt > 1 {
                        // One connect per retry; the attempt budget bounds the total.
                        let stale = seen.load(Ordering::SeqCst);
                        self.replace_connection(Some(stale), RetryPolicy::once()).await?;
                    }
                    let (conn, generation) = self.connection().await?;
                    seen.store(generation, Ordering::SeqCst);
                    match timeout(self.settings.operation_timeout, command(conn)).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(unavailable(operation, key, e)),
                        Err(_) => Err(CacheError::Timeout {
                            operation,
                            key: key.to_string(),
                            timeout: self.settings.operation_timeout,
                        }),
                    }
                },
                CacheError::is_transient,
            )
            .await
            .inspect_err(|e| error!("Redis {} gave up: {}", operation, e))
    }
}

fn unavailable(operation: &'static str, key: &str, e: RedisError) -> CacheError {
    CacheError::Unavailable {
        operation,
        key: key.to_string(),
        reason: e.to_string(),
    }
}

fn decode(key: &str, raw: &str) -> Result<Value, CacheError> {
    serde_json::from_str(raw).map_err(|source| {
        error!("Corrupt JSON at cache key {}", key);
        CacheError::Corrupt {
            key: key.to_string(),
            source,
        }
    })
}

#[async_trait]
impl JsonCache for ResilientCacheClient {
    #[instrument(skip(self))]
    async fn get_json(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let raw: Option<String> = self
            .execute("GET", key, |mut conn| async move {
                redis::cmd("GET")
                    .arg(key)
                    .query_async::<_, Option<String>>(&mut conn)
                    .await
            })
            .await?;

        raw.map(|raw| decode(key, &raw)).transpose()
    }

    #[instrument(skip(self), fields(count = keys.len()))]
    async fn mget_json(&self, keys: &[String]) -> Result<Vec<Option<Value>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let label = keys.first().cloned().unwrap_or_default();
        let raw: Vec<Option<String>> = self
            .execute("MGET", &label, |mut conn| async move {
                redis::cmd("MGET")
                    .arg(keys)
                    .query_async::<_, Vec<Option<String>>>(&mut conn)
                    .await
            })
            .await?;

        keys.iter()
            .zip(raw)
            .map(|(key, raw)| raw.map(|raw| decode(key, &raw)).transpose())
            .collect()
    }

    #[instrument(skip(self, value))]
    async fn set_json(
        &self,
        key: &str,
        value: &Value,
        ttl: Duration,
        mode: SetMode,
    ) -> Result<bool, CacheError> {
        let payload = value.to_string();
        let ttl_secs = ttl.as_secs().max(1);

        let reply: Option<String> = self
            .execute("SET", key, |mut conn| {
                let payload = payload.as_str();
                async move {
                    let mut cmd = redis::cmd("SET");
                    cmd.arg(key).arg(payload).arg("EX").arg(ttl_secs);
                    if mode == SetMode::CreateOnly {
                        cmd.arg("NX");
                    }
                    cmd.query_async::<_, Option<String>>(&mut conn).await
                }
            })
            .await?;

        let written = reply.is_some();
        debug!("SET {} ({:?}) written={}", key, mode, written);
        Ok(written)
    }
}
