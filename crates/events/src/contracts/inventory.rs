use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercato_core::{ContractResult, SalesChannel, ensure_non_empty};

use crate::contract::{Contract, ContractKey};

/// Signed stock movement for one product variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InventoryLedgerDelta {
    pub event_id: String,
    pub occurred_at: DateTime<Utc>,
    pub product_id: String,
    pub variant_id: String,
    /// Units added (positive) or removed (negative).
    pub delta: i64,
    pub reason: String,
    pub channel: SalesChannel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl Contract for InventoryLedgerDelta {
    const KEY: ContractKey = ContractKey::InventoryLedgerDelta;

    fn check(&self) -> ContractResult<()> {
        let c = Self::KEY.as_str();
        ensure_non_empty(c, "event_id", &self.event_id)?;
        ensure_non_empty(c, "product_id", &self.product_id)?;
        ensure_non_empty(c, "variant_id", &self.variant_id)?;
        ensure_non_empty(c, "reason", &self.reason)?;
        if let Some(key) = &self.idempotency_key {
            ensure_non_empty(c, "idempotency_key", key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use mercato_core::ContractViolation;

    use super::*;

    fn payload() -> serde_json::Value {
        json!({
            "event_id": "evt_1",
            "occurred_at": "2024-01-01T00:00:00Z",
            "product_id": "prod_1",
            "variant_id": "var_1",
            "delta": -3,
            "reason": "order shipped",
            "channel": "marketplace"
        })
    }

    #[test]
    fn accepts_negative_deltas_and_optional_key() {
        let delta = InventoryLedgerDelta::from_value(payload()).unwrap();
        assert_eq!(delta.delta, -3);
        assert_eq!(delta.channel, SalesChannel::Marketplace);
        assert!(delta.idempotency_key.is_none());

        let mut with_key = payload();
        with_key["idempotency_key"] = json!("inv-42");
        let delta = InventoryLedgerDelta::from_value(with_key).unwrap();
        assert_eq!(delta.idempotency_key.as_deref(), Some("inv-42"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let mut p = payload();
        p["warehouse"] = json!("wh_1");
        let err = InventoryLedgerDelta::from_value(p).unwrap_err();
        assert!(matches!(err, ContractViolation::Malformed { .. }));
        assert!(err.to_string().contains("warehouse"));
    }

    #[test]
    fn rejects_missing_fields_and_fractional_deltas() {
        let mut p = payload();
        p.as_object_mut().unwrap().remove("variant_id");
        assert!(InventoryLedgerDelta::from_value(p).is_err());

        let mut p = payload();
        p["delta"] = json!(1.5);
        assert!(InventoryLedgerDelta::from_value(p).is_err());
    }

    #[test]
    fn rejects_unknown_channel_and_bad_timestamp() {
        let mut p = payload();
        p["channel"] = json!("whatsapp");
        assert!(InventoryLedgerDelta::from_value(p).is_err());

        let mut p = payload();
        p["occurred_at"] = json!("yesterday");
        assert!(InventoryLedgerDelta::from_value(p).is_err());
    }

    #[test]
    fn rejects_blank_reason() {
        let mut p = payload();
        p["reason"] = json!("");
        let err = InventoryLedgerDelta::from_value(p).unwrap_err();
        assert_eq!(
            err,
            ContractViolation::invalid_field("inventory_ledger_delta", "reason", "must not be empty")
        );
    }
}
