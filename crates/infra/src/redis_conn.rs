//! Lazily-established, shared Redis connection.
//!
//! The client is opened eagerly (URL parsing only, no IO); the multiplexed
//! connection is created on first use and cloned for every call afterwards.
//! On a command error callers `reset()` it so the next call reconnects.

use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct LazyRedisConnection {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl LazyRedisConnection {
    pub fn open(redis_url: impl AsRef<str>) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url.as_ref())?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
        })
    }

    /// Get the shared connection, connecting if necessary.
    pub async fn get(&self) -> redis::RedisResult<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the cached connection.
    pub async fn reset(&self) {
        *self.conn.lock().await = None;
    }
}
