//! Redis-backed idempotency records.
//!
//! Uses a single `SET key value NX GET EX ttl` so the check and the store are
//! one atomic command (requires Redis >= 7.0). The reply is the previous
//! value when the key already existed, nil when our value was stored.

use std::time::Duration;

use async_trait::async_trait;
use tracing::instrument;

use crate::redis_conn::LazyRedisConnection;

use super::{IdempotencyBackend, IdempotencyError, IdempotencyRecord};

const BACKEND: &str = "redis";

#[derive(Debug)]
pub struct RedisIdempotencyBackend {
    conn: LazyRedisConnection,
}

impl RedisIdempotencyBackend {
    /// Open a client for `redis_url`. No connection is made until first use.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, IdempotencyError> {
        let conn = LazyRedisConnection::open(redis_url).map_err(backend_error)?;
        Ok(Self { conn })
    }
}

fn backend_error(e: impl core::fmt::Display) -> IdempotencyError {
    IdempotencyError::Backend {
        backend: BACKEND,
        message: e.to_string(),
    }
}

#[async_trait]
impl IdempotencyBackend for RedisIdempotencyBackend {
    #[instrument(skip(self, record), fields(key = %record.key), err)]
    async fn insert_if_absent(
        &self,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let value = serde_json::to_string(record).map_err(backend_error)?;
        let mut conn = self.conn.get().await.map_err(backend_error)?;

        // EX must be at least one second.
        let ttl_secs = ttl.as_secs().max(1);

        let previous: Option<String> = match redis::cmd("SET")
            .arg(&record.key)
            .arg(&value)
            .arg("NX")
            .arg("GET")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
        {
            Ok(prev) => prev,
            Err(e) => {
                self.conn.reset().await;
                return Err(backend_error(format!("SET NX GET failed: {e}")));
            }
        };

        previous
            .map(|raw| {
                serde_json::from_str::<IdempotencyRecord>(&raw)
                    .map_err(|e| backend_error(format!("corrupt record at {}: {e}", record.key)))
            })
            .transpose()
    }

    #[instrument(skip(self), err)]
    async fn remove(&self, key: &str) -> Result<(), IdempotencyError> {
        let mut conn = self.conn.get().await.map_err(backend_error)?;
        let result: redis::RedisResult<i64> = redis::cmd("DEL").arg(key).query_async(&mut conn).await;
        if let Err(e) = result {
            self.conn.reset().await;
            return Err(backend_error(format!("DEL failed: {e}")));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        BACKEND
    }
}
