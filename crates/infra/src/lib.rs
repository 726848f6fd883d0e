//! Infrastructure layer: idempotency storage, queue sinks, the consumer
//! executor and its configuration.

pub mod config;
pub mod consumer;
pub mod idempotency;

#[cfg(feature = "redis")]
pub mod redis_conn;

pub use config::ConsumerConfig;
pub use consumer::{
    ConsumeOutcome, ConsumeReport, ConsumeRequest, ConsumeStatus, ConsumerError,
    InMemoryQueueSinks, QueueConsumer, QueueSinks, Requeued, SinkError, SinkStats,
    run_queue_consumer,
};
pub use idempotency::{
    IdempotencyBackend, IdempotencyCheck, IdempotencyError, IdempotencyRecord, IdempotencyStore,
    InMemoryIdempotencyBackend, fingerprint,
};
