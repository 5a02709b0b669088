//! Tier-2 (shared) cache backends
//!
//! Tier 2 is strictly best effort. Any operational error drops the
//! connection and starts a cooldown during which every call is a cheap miss.

use futures::future::BoxFuture;

/// Out-of-process key/value store shared between engine instances
pub trait SharedCache: Send + Sync {
    /// Stored value for `key`, or `None` on a miss or any error
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>>;

    /// Store `value` under `key` with the backend's own TTL; errors are swallowed
    fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, ()>;
}

#[cfg(feature = "redis-backend")]
pub use self::redis_backend::RedisCache;

#[cfg(feature = "redis-backend")]
mod redis_backend {
    use super::SharedCache;
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use log::{debug, info, warn};
    use redis::aio::MultiplexedConnection;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tokio::time::{Instant, timeout};

    use crate::utils::constants::{SHARED_CACHE_CONNECT_TIMEOUT, SHARED_CACHE_COOLDOWN};

    const KEY_PREFIX: &str = "webfetch:";

    #[derive(Default)]
    struct ConnectionState {
        connection: Option<MultiplexedConnection>,
        cooldown_until: Option<Instant>,
    }

    /// Redis-backed tier 2, connected lazily on first use
    pub struct RedisCache {
        client: redis::Client,
        ttl: Duration,
        cooldown: Duration,
        state: Mutex<ConnectionState>,
    }

    impl std::fmt::Debug for RedisCache {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisCache")
                .field("ttl", &self.ttl)
                .finish_non_exhaustive()
        }
    }

    impl RedisCache {
        /// Parse the connection string; nothing is contacted yet.
        ///
        /// # Errors
        /// Returns the parse error for a malformed connection string.
        pub fn new(url: &str, ttl: Duration) -> redis::RedisResult<Self> {
            Ok(Self {
                client: redis::Client::open(url)?,
                ttl,
                cooldown: SHARED_CACHE_COOLDOWN,
                state: Mutex::new(ConnectionState::default()),
            })
        }

        #[must_use]
        pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
            self.cooldown = cooldown;
            self
        }

        /// Whether tier 2 is currently being skipped after an error
        pub async fn is_cooling_down(&self) -> bool {
            self.state
                .lock()
                .await
                .cooldown_until
                .is_some_and(|until| Instant::now() < until)
        }

        /// A live connection, connecting if needed; `None` while cooling down
        async fn connection(&self) -> Option<MultiplexedConnection> {
            let mut state = self.state.lock().await;
            if let Some(until) = state.cooldown_until {
                if Instant::now() < until {
                    return None;
                }
                state.cooldown_until = None;
            }
            if let Some(connection) = &state.connection {
                return Some(connection.clone());
            }

            match timeout(
                SHARED_CACHE_CONNECT_TIMEOUT,
                self.client.get_multiplexed_async_connection(),
            )
            .await
            {
                Ok(Ok(connection)) => {
                    info!("Connected to shared cache");
                    state.connection = Some(connection.clone());
                    Some(connection)
                }
                Ok(Err(e)) => {
                    warn!("Shared cache connection failed: {e}");
                    state.cooldown_until = Some(Instant::now() + self.cooldown);
                    None
                }
                Err(_) => {
                    warn!(
                        "Shared cache connection timed out after {:?}",
                        SHARED_CACHE_CONNECT_TIMEOUT
                    );
                    state.cooldown_until = Some(Instant::now() + self.cooldown);
                    None
                }
            }
        }

        async fn trip(&self, reason: &str) {
            warn!(
                "Shared cache error ({reason}), skipping it for {}s",
                self.cooldown.as_secs()
            );
            let mut state = self.state.lock().await;
            state.connection = None;
            state.cooldown_until = Some(Instant::now() + self.cooldown);
        }

        async fn get_value(&self, key: &str) -> Option<String> {
            let mut connection = self.connection().await?;
            let query = run_get(&mut connection, format!("{KEY_PREFIX}{key}"));
            match timeout(SHARED_CACHE_CONNECT_TIMEOUT, query).await {
                Ok(Ok(value)) => value,
                Ok(Err(e)) => {
                    self.trip(&e.to_string()).await;
                    None
                }
                Err(_) => {
                    self.trip("GET timed out").await;
                    None
                }
            }
        }

        async fn set_value(&self, key: &str, value: String) {
            let Some(mut connection) = self.connection().await else {
                return;
            };
            let ttl_secs = self.ttl.as_secs().max(1);
            let query = run_set(&mut connection, format!("{KEY_PREFIX}{key}"), value, ttl_secs);
            match timeout(SHARED_CACHE_CONNECT_TIMEOUT, query).await {
                Ok(Ok(())) => debug!("Stored {key} in shared cache"),
                Ok(Err(e)) => self.trip(&e.to_string()).await,
                Err(_) => self.trip("SET timed out").await,
            }
        }
    }

    async fn run_get(
        connection: &mut MultiplexedConnection,
        key: String,
    ) -> redis::RedisResult<Option<String>> {
        redis::cmd("GET").arg(key).query_async(connection).await
    }

    async fn run_set(
        connection: &mut MultiplexedConnection,
        key: String,
        value: String,
        ttl_secs: u64,
    ) -> redis::RedisResult<()> {
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(connection)
            .await
    }

    impl SharedCache for RedisCache {
        fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<String>> {
            self.get_value(key).boxed()
        }

        fn set<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, ()> {
            self.set_value(key, value).boxed()
        }
    }

}
