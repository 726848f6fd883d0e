//! Queue envelopes: the unit handed to requeue and dead-letter sinks.
//!
//! An envelope wraps a validated payload with its wire topic and the retry
//! bookkeeping copied from the topic's policy at build time.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::topic::{RegistryError, TopicContract, TopicRegistry};

/// Retry bookkeeping attached to every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryMetadata {
    /// 0-based delivery attempt (0 = first delivery).
    pub attempt: u32,
    pub max_retries: u32,
    pub backoff_seconds: u64,
    /// Set only when the envelope is handed to the requeue sink.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Set only when the envelope is dead-lettered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    pub retry: RetryMetadata,
    pub published_at: DateTime<Utc>,
    pub dead_letter_topic: String,
}

/// Unit handed to the requeue and dead-letter sinks.
///
/// Envelopes are values: every retry or dead-letter decision builds a new
/// one, they are never patched in place. The JSON form uses camelCase keys
/// and omits absent optional fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEnvelope<T> {
    topic: String,
    payload: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    metadata: EnvelopeMetadata,
}

impl<T> QueueEnvelope<T> {
    /// Wrap `payload` for `topic` at `attempt`, stamped with `published_at`.
    pub fn build_at(
        topic: &TopicContract,
        payload: T,
        attempt: u32,
        idempotency_key: Option<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            topic: topic.wire_topic.clone(),
            payload,
            idempotency_key,
            trace_id: None,
            metadata: EnvelopeMetadata {
                retry: RetryMetadata {
                    attempt,
                    max_retries: topic.policy.max_retries,
                    backoff_seconds: topic.policy.backoff_seconds,
                    next_retry_at: None,
                    failed_at: None,
                    last_error: None,
                },
                published_at,
                dead_letter_topic: topic.policy.dead_letter_topic.clone(),
            },
        }
    }

    pub fn build(topic: &TopicContract, payload: T, attempt: u32, idempotency_key: Option<String>) -> Self {
        Self::build_at(topic, payload, attempt, idempotency_key, Utc::now())
    }

    pub fn with_trace_id(mut self, trace_id: Option<String>) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// Mark the envelope as scheduled for redelivery at `next_retry_at`.
    pub fn scheduled_for(mut self, next_retry_at: DateTime<Utc>) -> Self {
        self.metadata.retry.next_retry_at = Some(next_retry_at);
        self
    }

    /// Mark the envelope as permanently failed.
    pub fn dead_lettered(mut self, failed_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        self.metadata.retry.failed_at = Some(failed_at);
        self.metadata.retry.last_error = Some(error.into());
        self
    }

    /// Fresh delivery cycle for a dead letter: attempt 0, failure metadata cleared.
    pub fn replayed(mut self, published_at: DateTime<Utc>) -> Self {
        self.metadata.retry.attempt = 0;
        self.metadata.retry.next_retry_at = None;
        self.metadata.retry.failed_at = None;
        self.metadata.retry.last_error = None;
        self.metadata.published_at = published_at;
        self
    }

    /// When the next attempt is due, `published_at + backoff`.
    pub fn due_at(&self) -> DateTime<Utc> {
        let backoff = i64::try_from(self.metadata.retry.backoff_seconds).unwrap_or(i64::MAX);
        self.metadata
            .published_at
            .checked_add_signed(ChronoDuration::try_seconds(backoff).unwrap_or(ChronoDuration::MAX))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether the attempt counter has run past the retry budget.
    pub fn is_exhausted(&self) -> bool {
        self.metadata.retry.attempt > self.metadata.retry.max_retries
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn metadata(&self) -> &EnvelopeMetadata {
        &self.metadata
    }

    pub fn retry(&self) -> &RetryMetadata {
        &self.metadata.retry
    }

    pub fn attempt(&self) -> u32 {
        self.metadata.retry.attempt
    }

    pub fn dead_letter_topic(&self) -> &str {
        &self.metadata.dead_letter_topic
    }
}

/// Look up `topic_key` and wrap `payload` in a fresh envelope stamped now.
pub fn build_envelope<T>(
    registry: &TopicRegistry,
    topic_key: &str,
    payload: T,
    attempt: u32,
    idempotency_key: Option<String>,
) -> Result<QueueEnvelope<T>, RegistryError> {
    let topic = registry.get(topic_key)?;
    Ok(QueueEnvelope::build(topic, payload, attempt, idempotency_key))
}
