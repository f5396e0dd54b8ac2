use redis::{AsyncCommands, Client};
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::{
    error::{AppError, AppResult},
    models::RecommendationType,
};

/// Keys of values the service keeps in Redis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Public trending targets, optionally narrowed to one type
    Trending {
        kind: Option<RecommendationType>,
        limit: usize,
    },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Trending { kind, limit } => write!(
                f,
                "trending:{}:{}",
                kind.map_or("all", RecommendationType::as_str),
                limit
            ),
        }
    }
}

/// Creates a Redis client for caching
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// A pending write handed to the background writer
struct PendingWrite {
    key: String,
    value: String,
    ttl: u64,
}

/// Read-through cache with fire-and-forget writes
#[derive(Clone)]
pub struct Cache {
    client: Client,
    writes: mpsc::UnboundedSender<PendingWrite>,
    ttl: u64,
}

/// Handle for stopping the background writer
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Asks the writer to flush outstanding writes and exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl Cache {
    /// Creates the cache and spawns its writer task
    ///
    /// `ttl` is the expiry in seconds applied to every value written through
    /// [`Cache::set_in_background`].
    pub fn new(client: Client, ttl: u64) -> (Self, CacheWriterHandle) {
        let (writes, pending) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        tokio::spawn(Self::run_writer(client.clone(), pending, shutdown_rx));

        (
            Self {
                client,
                writes,
                ttl,
            },
            CacheWriterHandle { shutdown_tx },
        )
    }

    async fn run_writer(
        client: Client,
        mut pending: mpsc::UnboundedReceiver<PendingWrite>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");

        loop {
            tokio::select! {
                Some(write) = pending.recv() => {
                    if let Err(e) = Self::write(&client, write).await {
                        tracing::error!(error = %e, "Failed to write to Redis cache");
                    }
                }
                _ = shutdown_rx.recv() => {
                    pending.close();
                    while let Some(write) = pending.recv().await {
                        if let Err(e) = Self::write(&client, write).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }
                    tracing::info!("Cache writer task stopped");
                    break;
                }
            }
        }
    }

    async fn write(client: &Client, write: PendingWrite) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(write.key, write.value, write.ttl).await?;
        Ok(())
    }

    /// Returns the cached value for `key`, if present
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        cached
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })
            })
            .transpose()
    }

    /// Queues a value for writing without waiting for Redis
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T) {
        let value = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let write = PendingWrite {
            key: key.to_string(),
            value,
            ttl: self.ttl,
        };
        if let Err(e) = self.writes.send(write) {
            tracing::error!(error = %e, "Failed to queue cache write");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    #[test]
    fn test_cache_key_display_all_types() {
        let key = CacheKey::Trending {
            kind: None,
            limit: 10,
        };
        assert_eq!(key.to_string(), "trending:all:10");
    }

    #[test]
    fn test_cache_key_display_single_type() {
        let key = CacheKey::Trending {
            kind: Some(RecommendationType::Destination),
            limit: 5,
        };
        assert_eq!(key.to_string(), "trending:destination:5");
    }

    #[tokio::test]
    #[ignore = "requires a running Redis"]
    async fn test_set_in_background_writes_to_cache() {
        let client = create_redis_client(&redis_url()).unwrap();
        let (cache, handle) = Cache::new(client.clone(), 60);

        let key = CacheKey::Trending {
            kind: Some(RecommendationType::Blog),
            limit: 3,
        };
        let value = vec!["JP".to_string(), "TH".to_string()];
        cache.set_in_background(&key, &value);
        handle.shutdown().await;
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let cached: Option<Vec<String>> = cache.get_from_cache(&key).await.unwrap();
        assert_eq!(cached, Some(value));

        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        let _: () = conn.del(key.to_string()).await.unwrap();
    }
}
