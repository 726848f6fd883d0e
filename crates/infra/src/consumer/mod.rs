//! Queue consumer: executor plus the sinks it hands retries and dead letters to.

mod executor;
mod sinks;

#[cfg(feature = "redis")]
mod redis_streams;

pub use executor::{
    ConsumeOutcome, ConsumeReport, ConsumeRequest, ConsumeStatus, ConsumerError, QueueConsumer,
    run_queue_consumer,
};
pub use sinks::{InMemoryQueueSinks, QueueSinks, Requeued, SinkError, SinkStats};

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsSinks;
