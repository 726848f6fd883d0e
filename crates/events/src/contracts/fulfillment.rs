use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercato_core::{ContractResult, ContractViolation, ensure_non_empty};

use crate::contract::{Contract, ContractKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Open,
    Picking,
    Packing,
    Closed,
}

/// Group of orders picked and packed together in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PickPackBatch {
    pub batch_id: String,
    pub warehouse_id: String,
    pub order_ids: Vec<String>,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

impl Contract for PickPackBatch {
    const KEY: ContractKey = ContractKey::PickPackBatch;

    fn check(&self) -> ContractResult<()> {
        let c = Self::KEY.as_str();
        ensure_non_empty(c, "batch_id", &self.batch_id)?;
        ensure_non_empty(c, "warehouse_id", &self.warehouse_id)?;

        if self.order_ids.is_empty() {
            return Err(ContractViolation::invalid_field(c, "order_ids", "must contain at least one order"));
        }
        let mut seen = HashSet::with_capacity(self.order_ids.len());
        for id in &self.order_ids {
            ensure_non_empty(c, "order_ids", id)?;
            if !seen.insert(id.as_str()) {
                return Err(ContractViolation::invalid_field(
                    c,
                    "order_ids",
                    format!("contains duplicate order `{id}`"),
                ));
            }
        }
        Ok(())
    }
}
