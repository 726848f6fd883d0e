use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercato_core::{ContractResult, SalesChannel, ensure_non_empty};

use crate::contract::{Contract, ContractKey};

/// Order lifecycle status as reported by a sales channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Packed,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

/// Order status change to propagate between channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderSyncStatus {
    pub event_id: String,
    pub order_id: String,
    pub status: OrderStatus,
    pub channel: SalesChannel,
    pub occurred_at: DateTime<Utc>,
    /// Order reference on the external channel, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
}

impl Contract for OrderSyncStatus {
    const KEY: ContractKey = ContractKey::OrderSyncStatus;

    fn check(&self) -> ContractResult<()> {
        let c = Self::KEY.as_str();
        ensure_non_empty(c, "event_id", &self.event_id)?;
        ensure_non_empty(c, "order_id", &self.order_id)?;
        if let Some(r) = &self.external_ref {
            ensure_non_empty(c, "external_ref", r)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_status_events() {
        let status = OrderSyncStatus::from_value(json!({
            "event_id": "evt_9",
            "order_id": "ord_1",
            "status": "shipped",
            "channel": "pos",
            "occurred_at": "2024-03-05T10:00:00-03:00",
            "external_ref": "ML-123"
        }))
        .unwrap();

        assert_eq!(status.status, OrderStatus::Shipped);
        assert_eq!(status.occurred_at.to_rfc3339(), "2024-03-05T13:00:00+00:00");
    }

    #[test]
    fn rejects_statuses_outside_the_closed_set() {
        let err = OrderSyncStatus::from_value(json!({
            "event_id": "evt_9",
            "order_id": "ord_1",
            "status": "lost",
            "channel": "pos",
            "occurred_at": "2024-03-05T10:00:00Z"
        }));
        assert!(err.is_err());
    }
}
