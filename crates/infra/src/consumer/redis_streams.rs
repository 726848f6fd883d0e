//! Redis Streams-backed sinks.
//!
//! - **Requeue**: `XADD <wire topic>` with a `deliver_at` field; the stream
//!   consumer is expected to hold the entry until that time.
//! - **Dead letter**: `XADD <dead-letter topic>` with the failure metadata
//!   promoted to stream fields for inspection without decoding the payload.
//!
//! Stream keys are the wire topic names, optionally namespaced by a prefix
//! (e.g. `mercato:inventory.sync.v1`).

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use tracing::{instrument, warn};

use mercato_events::QueueEnvelope;

use crate::redis_conn::LazyRedisConnection;

use super::sinks::{QueueSinks, SinkError};

#[derive(Debug)]
pub struct RedisStreamsSinks {
    conn: LazyRedisConnection,
    key_prefix: Option<String>,
}

impl RedisStreamsSinks {
    /// Create sinks for `redis_url`. No connection is made until first use.
    pub fn new(redis_url: impl AsRef<str>, key_prefix: Option<String>) -> Result<Self, SinkError> {
        let conn = LazyRedisConnection::open(redis_url)
            .map_err(|e| SinkError::Requeue(format!("invalid redis url: {e}")))?;
        Ok(Self { conn, key_prefix })
    }

    fn stream_key(&self, topic: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{prefix}:{topic}"),
            None => topic.to_string(),
        }
    }

    async fn xadd(&self, stream: &str, fields: &[(&str, String)]) -> redis::RedisResult<String> {
        let mut conn = self.conn.get().await?;
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (name, value) in fields {
            cmd.arg(*name).arg(value);
        }

        let result = cmd.query_async(&mut conn).await;
        if result.is_err() {
            self.conn.reset().await;
        }
        result
    }
}

#[async_trait]
impl<T> QueueSinks<T> for RedisStreamsSinks
where
    T: Serialize + Send + Sync + 'static,
{
    #[instrument(skip(self, envelope), fields(topic = %envelope.topic(), attempt = envelope.attempt()), err)]
    async fn requeue(&self, envelope: QueueEnvelope<T>, delay_seconds: u64) -> Result<(), SinkError> {
        let payload =
            serde_json::to_string(&envelope).map_err(|e| SinkError::Serialization(e.to_string()))?;

        let delay = ChronoDuration::try_seconds(i64::try_from(delay_seconds).unwrap_or(i64::MAX))
            .unwrap_or(ChronoDuration::MAX);
        let deliver_at = envelope
            .retry()
            .next_retry_at
            .unwrap_or_else(|| Utc::now() + delay);

        let stream = self.stream_key(envelope.topic());
        self.xadd(
            &stream,
            &[
                ("attempt", envelope.attempt().to_string()),
                ("deliver_at", deliver_at.to_rfc3339()),
                ("envelope", payload),
            ],
        )
        .await
        .map_err(|e| SinkError::Requeue(format!("XADD {stream} failed: {e}")))?;

        Ok(())
    }

    #[instrument(skip(self, envelope), fields(topic = %envelope.dead_letter_topic(), attempt = envelope.attempt()), err)]
    async fn publish_to_dlq(&self, envelope: QueueEnvelope<T>) -> Result<(), SinkError> {
        let payload =
            serde_json::to_string(&envelope).map_err(|e| SinkError::Serialization(e.to_string()))?;

        let retry = envelope.retry();
        let failed_at = retry.failed_at.unwrap_or_else(Utc::now).to_rfc3339();
        let last_error = retry.last_error.clone().unwrap_or_default();

        let stream = self.stream_key(envelope.dead_letter_topic());
        self.xadd(
            &stream,
            &[
                ("original_topic", envelope.topic().to_string()),
                ("attempt", envelope.attempt().to_string()),
                ("failed_at", failed_at),
                ("last_error", last_error),
                ("envelope", payload),
            ],
        )
        .await
        .map_err(|e| SinkError::DeadLetter(format!("XADD {stream} failed: {e}")))?;

        warn!(
            stream = %stream,
            attempt = envelope.attempt(),
            "message sent to dead-letter stream"
        );
        Ok(())
    }
}
