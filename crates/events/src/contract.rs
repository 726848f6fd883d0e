//! Payload contracts (schema validation at the consumer boundary).
//!
//! Each contract is a typed struct that rejects unknown fields and decodes
//! closed sets into enums. Decoding alone covers structure; `Contract::check`
//! adds the semantic rules serde cannot express (non-empty identifiers,
//! non-negative amounts, ...).
//!
//! Validation runs before idempotency bookkeeping and before any handler, so a
//! malformed payload never claims an idempotency slot.

use core::fmt;
use core::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use mercato_core::{ContractResult, ContractViolation};

use crate::contracts::{
    InventoryLedgerDelta, InvoiceRecord, OrderSyncStatus, PaymentSettlement, PickPackBatch,
    WeightPriceRule,
};
use crate::topic::{RegistryError, TopicRegistry};

/// Stable identifier of a payload contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKey {
    InventoryLedgerDelta,
    OrderSyncStatus,
    WeightPriceRule,
    PickPackBatch,
    InvoiceRecord,
    PaymentSettlement,
}

impl ContractKey {
    pub const ALL: [ContractKey; 6] = [
        ContractKey::InventoryLedgerDelta,
        ContractKey::OrderSyncStatus,
        ContractKey::WeightPriceRule,
        ContractKey::PickPackBatch,
        ContractKey::InvoiceRecord,
        ContractKey::PaymentSettlement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKey::InventoryLedgerDelta => "inventory_ledger_delta",
            ContractKey::OrderSyncStatus => "order_sync_status",
            ContractKey::WeightPriceRule => "weight_price_rule",
            ContractKey::PickPackBatch => "pick_pack_batch",
            ContractKey::InvoiceRecord => "invoice_record",
            ContractKey::PaymentSettlement => "payment_settlement",
        }
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractKey {
    type Err = ContractViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ContractViolation::unknown_contract(s))
    }
}

/// A typed payload contract.
///
/// Implementors must use `#[serde(deny_unknown_fields)]` so extra fields are a
/// violation rather than silently dropped.
pub trait Contract: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    const KEY: ContractKey;

    /// Semantic checks run after structural decoding.
    fn check(&self) -> ContractResult<()> {
        Ok(())
    }

    /// Decode and check a raw JSON payload.
    fn from_value(raw: JsonValue) -> ContractResult<Self> {
        let payload: Self = serde_json::from_value(raw)
            .map_err(|e| ContractViolation::malformed(Self::KEY.as_str(), e.to_string()))?;
        payload.check()?;
        Ok(payload)
    }
}

/// A validated payload of any known contract.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedPayload {
    InventoryLedgerDelta(InventoryLedgerDelta),
    OrderSyncStatus(OrderSyncStatus),
    WeightPriceRule(WeightPriceRule),
    PickPackBatch(PickPackBatch),
    InvoiceRecord(InvoiceRecord),
    PaymentSettlement(PaymentSettlement),
}

impl TypedPayload {
    pub fn contract_key(&self) -> ContractKey {
        match self {
            TypedPayload::InventoryLedgerDelta(_) => ContractKey::InventoryLedgerDelta,
            TypedPayload::OrderSyncStatus(_) => ContractKey::OrderSyncStatus,
            TypedPayload::WeightPriceRule(_) => ContractKey::WeightPriceRule,
            TypedPayload::PickPackBatch(_) => ContractKey::PickPackBatch,
            TypedPayload::InvoiceRecord(_) => ContractKey::InvoiceRecord,
            TypedPayload::PaymentSettlement(_) => ContractKey::PaymentSettlement,
        }
    }

    /// Re-encode the validated payload as JSON.
    pub fn to_value(&self) -> Result<JsonValue, serde_json::Error> {
        match self {
            TypedPayload::InventoryLedgerDelta(p) => serde_json::to_value(p),
            TypedPayload::OrderSyncStatus(p) => serde_json::to_value(p),
            TypedPayload::WeightPriceRule(p) => serde_json::to_value(p),
            TypedPayload::PickPackBatch(p) => serde_json::to_value(p),
            TypedPayload::InvoiceRecord(p) => serde_json::to_value(p),
            TypedPayload::PaymentSettlement(p) => serde_json::to_value(p),
        }
    }
}

/// Validate a raw payload against the named contract.
pub fn validate(key: ContractKey, raw: JsonValue) -> ContractResult<TypedPayload> {
    let result = match key {
        ContractKey::InventoryLedgerDelta => {
            InventoryLedgerDelta::from_value(raw).map(TypedPayload::InventoryLedgerDelta)
        }
        ContractKey::OrderSyncStatus => {
            OrderSyncStatus::from_value(raw).map(TypedPayload::OrderSyncStatus)
        }
        ContractKey::WeightPriceRule => {
            WeightPriceRule::from_value(raw).map(TypedPayload::WeightPriceRule)
        }
        ContractKey::PickPackBatch => PickPackBatch::from_value(raw).map(TypedPayload::PickPackBatch),
        ContractKey::InvoiceRecord => InvoiceRecord::from_value(raw).map(TypedPayload::InvoiceRecord),
        ContractKey::PaymentSettlement => {
            PaymentSettlement::from_value(raw).map(TypedPayload::PaymentSettlement)
        }
    };

    if let Err(ref e) = result {
        debug!(contract = %key, error = %e, "payload rejected by contract");
    }
    result
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidateError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

/// Validate a raw payload against the default contract of a topic.
pub fn validate_for_topic(
    registry: &TopicRegistry,
    topic_key: &str,
    raw: JsonValue,
) -> Result<TypedPayload, ValidateError> {
    let topic = registry.get(topic_key)?;
    Ok(validate(topic.contract, raw)?)
}
