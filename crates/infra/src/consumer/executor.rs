//! Queue consumer executor.
//!
//! One call is one complete transition from "delivered" to a terminal
//! outcome:
//!
//! ```text
//! validate ──✗──> Err(ContractViolation)          (not an attempt)
//!    │
//! idempotency ──duplicate──> Duplicate
//!    │        ──conflict───> IdempotencyConflict
//!    │
//! handler ──ok──> Processed
//!    │
//!    └──err──> attempt + 1 > max_retries ? publish_to_dlq ─> Dlq
//!                                        : requeue ───────> Retry
//! ```
//!
//! Nothing is persisted about "processing". The attempt counter is the only
//! cross-call state besides the idempotency store, and the caller threads it
//! forward through whatever transport redelivers the message.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{error, info, instrument, warn};

use mercato_core::ContractViolation;
use mercato_events::{Contract, QueueEnvelope, RegistryError, TopicRegistry};

use crate::idempotency::{IdempotencyCheck, IdempotencyError, IdempotencyStore};

use super::sinks::{QueueSinks, SinkError};

/// Infrastructure or configuration failure.
///
/// Business outcomes (duplicate, conflict, retry, dlq) are never errors; they
/// are returned as `ConsumeOutcome`.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("contract violation: {0}")]
    ContractViolation(#[from] ContractViolation),

    #[error("idempotency store failure: {0}")]
    Idempotency(#[from] IdempotencyError),

    #[error("sink failure: {0}")]
    Sink(#[from] SinkError),
}

/// One delivery of one message.
#[derive(Debug, Clone)]
pub struct ConsumeRequest<'a> {
    pub topic_key: &'a str,
    /// Raw payload; validated against the handler's contract before anything else.
    pub payload: JsonValue,
    pub idempotency_key: Option<String>,
    pub trace_id: Option<String>,
    /// 0-based delivery attempt.
    pub attempt: u32,
}

impl<'a> ConsumeRequest<'a> {
    pub fn new(topic_key: &'a str, payload: JsonValue) -> Self {
        Self {
            topic_key,
            payload,
            idempotency_key: None,
            trace_id: None,
            attempt: 0,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn at_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumeStatus {
    Processed,
    Duplicate,
    IdempotencyConflict,
    Retry,
    Dlq,
}

/// Terminal outcome of one consumer call.
///
/// `retries` is the attempt count reached: the incoming attempt for
/// processed/duplicate/conflict, `attempt + 1` for retry/dlq.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "ConsumeReport")]
pub enum ConsumeOutcome {
    Processed {
        retries: u32,
    },
    Duplicate {
        retries: u32,
    },
    IdempotencyConflict {
        retries: u32,
        message: String,
    },
    Retry {
        retries: u32,
        next_retry_at: DateTime<Utc>,
        error: String,
    },
    Dlq {
        retries: u32,
        error: String,
    },
}

impl ConsumeOutcome {
    pub fn status(&self) -> ConsumeStatus {
        match self {
            ConsumeOutcome::Processed { .. } => ConsumeStatus::Processed,
            ConsumeOutcome::Duplicate { .. } => ConsumeStatus::Duplicate,
            ConsumeOutcome::IdempotencyConflict { .. } => ConsumeStatus::IdempotencyConflict,
            ConsumeOutcome::Retry { .. } => ConsumeStatus::Retry,
            ConsumeOutcome::Dlq { .. } => ConsumeStatus::Dlq,
        }
    }

    pub fn retries(&self) -> u32 {
        match self {
            ConsumeOutcome::Processed { retries }
            | ConsumeOutcome::Duplicate { retries }
            | ConsumeOutcome::IdempotencyConflict { retries, .. }
            | ConsumeOutcome::Retry { retries, .. }
            | ConsumeOutcome::Dlq { retries, .. } => *retries,
        }
    }

    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ConsumeOutcome::Retry { next_retry_at, .. } => Some(*next_retry_at),
            _ => None,
        }
    }

    /// Handler error (retry/dlq) or conflict message.
    pub fn error(&self) -> Option<&str> {
        match self {
            ConsumeOutcome::IdempotencyConflict { message, .. } => Some(message),
            ConsumeOutcome::Retry { error, .. } | ConsumeOutcome::Dlq { error, .. } => Some(error),
            ConsumeOutcome::Processed { .. } | ConsumeOutcome::Duplicate { .. } => None,
        }
    }
}

/// Flat wire form: `{status, retries, nextRetryAt?, error?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeReport {
    pub status: ConsumeStatus,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ConsumeOutcome> for ConsumeReport {
    fn from(outcome: ConsumeOutcome) -> Self {
        Self {
            status: outcome.status(),
            retries: outcome.retries(),
            next_retry_at: outcome.next_retry_at(),
            error: outcome.error().map(str::to_string),
        }
    }
}

/// Consumer executor bound to a registry and an idempotency store.
///
/// Cheap to clone; safe to call concurrently for different messages.
#[derive(Debug, Clone)]
pub struct QueueConsumer {
    registry: Arc<TopicRegistry>,
    idempotency: Arc<IdempotencyStore>,
}

impl QueueConsumer {
    pub fn new(registry: Arc<TopicRegistry>, idempotency: Arc<IdempotencyStore>) -> Self {
        Self {
            registry,
            idempotency,
        }
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    pub fn idempotency(&self) -> &IdempotencyStore {
        &self.idempotency
    }

    /// Run one delivery through validate → dedup → handler → retry/DLQ.
    pub async fn consume<T, H, Fut, E, S>(
        &self,
        request: ConsumeRequest<'_>,
        handler: H,
        sinks: &S,
    ) -> Result<ConsumeOutcome, ConsumerError>
    where
        T: Contract,
        H: FnOnce(T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
        S: QueueSinks<T> + ?Sized,
    {
        run_queue_consumer(&self.registry, &self.idempotency, request, handler, sinks).await
    }
}

/// Run one delivery through validate → dedup → handler → retry/DLQ.
#[instrument(
    skip_all,
    fields(
        topic = %request.topic_key,
        contract = %T::KEY,
        attempt = request.attempt,
        trace_id = request.trace_id.as_deref().unwrap_or("")
    )
)]
pub async fn run_queue_consumer<T, H, Fut, E, S>(
    registry: &TopicRegistry,
    idempotency: &IdempotencyStore,
    request: ConsumeRequest<'_>,
    handler: H,
    sinks: &S,
) -> Result<ConsumeOutcome, ConsumerError>
where
    T: Contract,
    H: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
    S: QueueSinks<T> + ?Sized,
{
    let ConsumeRequest {
        topic_key,
        payload,
        idempotency_key,
        trace_id,
        attempt,
    } = request;

    let topic = registry.get(topic_key)?;

    let payload = T::from_value(payload).map_err(|e| {
        warn!(error = %e, "payload rejected; not retrying");
        e
    })?;

    let scope = topic.topic_key.as_str();
    match idempotency
        .check_and_store(scope, idempotency_key.as_deref(), &payload)
        .await?
    {
        IdempotencyCheck::Fresh => {}
        IdempotencyCheck::Duplicate => {
            info!(status = "duplicate", "duplicate delivery suppressed");
            return Ok(ConsumeOutcome::Duplicate { retries: attempt });
        }
        IdempotencyCheck::Conflict { message } => {
            error!(status = "idempotency_conflict", %message, "idempotency key reused with a different payload");
            return Ok(ConsumeOutcome::IdempotencyConflict {
                retries: attempt,
                message,
            });
        }
    }

    let error = match handler(payload.clone()).await {
        Ok(()) => {
            info!(status = "processed", "message processed");
            return Ok(ConsumeOutcome::Processed { retries: attempt });
        }
        Err(e) => e.to_string(),
    };

    // The claim must not outlive a failed attempt, or the redelivery would be
    // suppressed as a duplicate. If it cannot be dropped, nothing is requeued
    // and the transport redelivers the original message.
    if let Some(key) = idempotency_key.as_deref() {
        idempotency.release(scope, key).await.map_err(|e| {
            error!(error = %e, "failed to release idempotency claim after handler failure");
            e
        })?;
    }

    let next_attempt = attempt.saturating_add(1);
    let now = Utc::now();
    let envelope = QueueEnvelope::build_at(topic, payload, next_attempt, idempotency_key, now)
        .with_trace_id(trace_id);

    if !topic.policy.allows(next_attempt) {
        sinks
            .publish_to_dlq(envelope.dead_lettered(now, error.clone()))
            .await?;

        error!(
            status = "dlq",
            retries = next_attempt,
            dead_letter_topic = %topic.policy.dead_letter_topic,
            error = %error,
            "retries exhausted; message dead-lettered"
        );
        return Ok(ConsumeOutcome::Dlq {
            retries: next_attempt,
            error,
        });
    }

    let backoff_seconds = topic.policy.backoff_seconds;
    let backoff = ChronoDuration::try_seconds(i64::try_from(backoff_seconds).unwrap_or(i64::MAX))
        .unwrap_or(ChronoDuration::MAX);
    let next_retry_at = now.checked_add_signed(backoff).unwrap_or(DateTime::<Utc>::MAX_UTC);

    sinks
        .requeue(envelope.scheduled_for(next_retry_at), backoff_seconds)
        .await?;

    warn!(
        status = "retry",
        retries = next_attempt,
        max_retries = topic.policy.max_retries,
        next_retry_at = %next_retry_at,
        error = %error,
        "handler failed; message requeued"
    );
    Ok(ConsumeOutcome::Retry {
        retries: next_attempt,
        next_retry_at,
        error,
    })
}
