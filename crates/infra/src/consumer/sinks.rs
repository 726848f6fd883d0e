//! Retry and dead-letter sinks.
//!
//! The executor never talks to a broker. It hands envelopes to a `QueueSinks`
//! implementation supplied by the caller, which owns actual redelivery
//! (e.g. a broker's delayed-delivery feature) and dead-letter publication.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use mercato_events::QueueEnvelope;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("requeue failed: {0}")]
    Requeue(String),

    #[error("dead-letter publish failed: {0}")]
    DeadLetter(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("sink lock poisoned")]
    Poisoned,
}

/// Caller-supplied retry and dead-letter destinations.
#[async_trait]
pub trait QueueSinks<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Schedule redelivery of `envelope` after `delay_seconds`.
    async fn requeue(&self, envelope: QueueEnvelope<T>, delay_seconds: u64) -> Result<(), SinkError>;

    /// Publish a permanently failed envelope to its dead-letter topic.
    async fn publish_to_dlq(&self, envelope: QueueEnvelope<T>) -> Result<(), SinkError>;
}

#[async_trait]
impl<T, S> QueueSinks<T> for Arc<S>
where
    T: Send + Sync + 'static,
    S: QueueSinks<T> + ?Sized,
{
    async fn requeue(&self, envelope: QueueEnvelope<T>, delay_seconds: u64) -> Result<(), SinkError> {
        (**self).requeue(envelope, delay_seconds).await
    }

    async fn publish_to_dlq(&self, envelope: QueueEnvelope<T>) -> Result<(), SinkError> {
        (**self).publish_to_dlq(envelope).await
    }
}

/// Envelope handed to `requeue`, with the requested delay.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Requeued<T> {
    pub envelope: QueueEnvelope<T>,
    pub delay_seconds: u64,
}

/// Sink counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SinkStats {
    pub requeued: usize,
    pub dead_lettered: usize,
}

/// In-memory sinks for tests/dev.
///
/// Records every envelope it receives. `failing` makes every call error, to
/// exercise the executor's infrastructure-failure path.
#[derive(Debug)]
pub struct InMemoryQueueSinks<T> {
    requeued: Mutex<Vec<Requeued<T>>>,
    dead_letters: Mutex<Vec<QueueEnvelope<T>>>,
    failure: Option<String>,
}

impl<T> InMemoryQueueSinks<T> {
    pub fn new() -> Self {
        Self {
            requeued: Mutex::new(Vec::new()),
            dead_letters: Mutex::new(Vec::new()),
            failure: None,
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new()
        }
    }

    pub fn stats(&self) -> Result<SinkStats, SinkError> {
        Ok(SinkStats {
            requeued: self.requeued.lock().map_err(|_| SinkError::Poisoned)?.len(),
            dead_lettered: self.dead_letters.lock().map_err(|_| SinkError::Poisoned)?.len(),
        })
    }

    /// Take every requeued envelope, oldest first.
    pub fn drain_requeued(&self) -> Result<Vec<Requeued<T>>, SinkError> {
        let mut requeued = self.requeued.lock().map_err(|_| SinkError::Poisoned)?;
        Ok(std::mem::take(&mut *requeued))
    }

    /// Take every dead-lettered envelope, oldest first.
    pub fn drain_dead_letters(&self) -> Result<Vec<QueueEnvelope<T>>, SinkError> {
        let mut dls = self.dead_letters.lock().map_err(|_| SinkError::Poisoned)?;
        Ok(std::mem::take(&mut *dls))
    }

    /// Drain dead letters as fresh attempt-0 envelopes, ready to publish again.
    pub fn replay_dead_letters(&self) -> Result<Vec<QueueEnvelope<T>>, SinkError> {
        let now = Utc::now();
        Ok(self
            .drain_dead_letters()?
            .into_iter()
            .map(|envelope| envelope.replayed(now))
            .collect())
    }
}

impl<T: Clone> InMemoryQueueSinks<T> {
    pub fn requeued(&self) -> Result<Vec<Requeued<T>>, SinkError> {
        Ok(self.requeued.lock().map_err(|_| SinkError::Poisoned)?.clone())
    }

    pub fn dead_letters(&self) -> Result<Vec<QueueEnvelope<T>>, SinkError> {
        Ok(self.dead_letters.lock().map_err(|_| SinkError::Poisoned)?.clone())
    }
}

impl<T> Default for InMemoryQueueSinks<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> QueueSinks<T> for InMemoryQueueSinks<T>
where
    T: Send + Sync + 'static,
{
    async fn requeue(&self, envelope: QueueEnvelope<T>, delay_seconds: u64) -> Result<(), SinkError> {
        if let Some(reason) = &self.failure {
            return Err(SinkError::Requeue(reason.clone()));
        }
        let mut requeued = self.requeued.lock().map_err(|_| SinkError::Poisoned)?;
        requeued.push(Requeued {
            envelope,
            delay_seconds,
        });
        Ok(())
    }

    async fn publish_to_dlq(&self, envelope: QueueEnvelope<T>) -> Result<(), SinkError> {
        if let Some(reason) = &self.failure {
            return Err(SinkError::DeadLetter(reason.clone()));
        }
        let mut dls = self.dead_letters.lock().map_err(|_| SinkError::Poisoned)?;
        dls.push(envelope);
        Ok(())
    }
}
