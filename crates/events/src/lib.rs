//! Queue topics, payload contracts and envelopes.
//!
//! Everything here is pure: no IO, no async. The consumer executor in
//! `mercato-infra` composes these pieces with an idempotency store and the
//! caller's sinks.

pub mod contract;
pub mod contracts;
pub mod envelope;
pub mod topic;

pub use contract::{Contract, ContractKey, TypedPayload, ValidateError, validate, validate_for_topic};
pub use contracts::{
    BatchStatus, InventoryLedgerDelta, InvoiceRecord, InvoiceStatus, OrderStatus,
    OrderSyncStatus, PaymentSettlement, PickPackBatch, SettlementStatus, WeightPriceRule,
    WeightUnit,
};
pub use envelope::{EnvelopeMetadata, QueueEnvelope, RetryMetadata, build_envelope};
pub use topic::{RegistryError, RetryPolicy, TopicContract, TopicRegistry, topics};
