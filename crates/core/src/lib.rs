//! `mercato-core` — shared building blocks for the queue consumer runtime.
//!
//! This crate contains **pure** primitives (no IO, no async): the contract
//! violation error and the value objects reused across payload contracts.

pub mod error;
pub mod id;
pub mod value_object;

pub use error::{ContractResult, ContractViolation, ensure_non_empty};
pub use id::TraceId;
pub use value_object::{CurrencyCode, InvalidCurrencyCode, SalesChannel};
