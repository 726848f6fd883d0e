use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercato_core::{ContractResult, ContractViolation, CurrencyCode, ensure_non_empty};

use crate::contract::{Contract, ContractKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Paid,
    Void,
}

/// Invoice issued for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvoiceRecord {
    pub id: String,
    pub order_id: String,
    pub status: InvoiceStatus,
    /// Total in smallest currency unit (e.g., cents).
    pub total: i64,
    pub currency: CurrencyCode,
    pub issued_at: DateTime<Utc>,
}

impl Contract for InvoiceRecord {
    const KEY: ContractKey = ContractKey::InvoiceRecord;

    fn check(&self) -> ContractResult<()> {
        let c = Self::KEY.as_str();
        ensure_non_empty(c, "id", &self.id)?;
        ensure_non_empty(c, "order_id", &self.order_id)?;
        if self.total < 0 {
            return Err(ContractViolation::invalid_field(c, "total", "must not be negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn invoice() -> serde_json::Value {
        json!({
            "id": "inv_1",
            "order_id": "ord_1",
            "status": "issued",
            "total": 129900,
            "currency": "USD",
            "issued_at": "2024-02-10T12:00:00Z"
        })
    }

    #[test]
    fn decodes_invoices() {
        let inv = InvoiceRecord::from_value(invoice()).unwrap();
        assert_eq!(inv.status, InvoiceStatus::Issued);
        assert_eq!(inv.currency.as_str(), "USD");
        assert_eq!(inv.total, 129900);
    }

    #[test]
    fn total_must_be_a_non_negative_integer() {
        let mut p = invoice();
        p["total"] = json!(-5);
        assert_eq!(
            InvoiceRecord::from_value(p).unwrap_err(),
            ContractViolation::invalid_field("invoice_record", "total", "must not be negative")
        );

        let mut p = invoice();
        p["total"] = json!(10.5);
        assert!(InvoiceRecord::from_value(p).is_err());
    }

    #[test]
    fn rejects_unknown_status_and_currency_length() {
        let mut p = invoice();
        p["status"] = json!("overdue");
        assert!(InvoiceRecord::from_value(p).is_err());

        let mut p = invoice();
        p["currency"] = json!("US");
        assert!(InvoiceRecord::from_value(p).is_err());
    }
}
