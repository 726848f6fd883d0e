use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercato_core::{ContractResult, ContractViolation, CurrencyCode, ensure_non_empty};

use crate::contract::{Contract, ContractKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Settled,
    Failed,
}

/// Captured payment to be credited to a seller balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentSettlement {
    pub settlement_id: String,
    pub order_id: String,
    pub seller_id: String,
    /// Amount in smallest currency unit.
    pub amount: i64,
    pub currency: CurrencyCode,
    pub status: SettlementStatus,
    pub settled_at: DateTime<Utc>,
}

impl Contract for PaymentSettlement {
    const KEY: ContractKey = ContractKey::PaymentSettlement;

    fn check(&self) -> ContractResult<()> {
        let c = Self::KEY.as_str();
        ensure_non_empty(c, "settlement_id", &self.settlement_id)?;
        ensure_non_empty(c, "order_id", &self.order_id)?;
        ensure_non_empty(c, "seller_id", &self.seller_id)?;
        if self.amount <= 0 {
            return Err(ContractViolation::invalid_field(c, "amount", "must be positive"));
        }
        Ok(())
    }
}
