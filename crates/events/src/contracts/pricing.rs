use serde::{Deserialize, Serialize};

use mercato_core::{ContractResult, ContractViolation, CurrencyCode, ensure_non_empty};

use crate::contract::{Contract, ContractKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightUnit {
    G,
    Kg,
    Lb,
    Oz,
}

/// Price charged per weight unit inside a weight band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightPriceRule {
    pub rule_id: String,
    pub product_id: String,
    pub unit: WeightUnit,
    pub min_weight: f64,
    /// Open-ended band when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_weight: Option<f64>,
    /// Minor currency units (e.g. cents) per `unit`.
    pub price_per_unit: i64,
    pub currency: CurrencyCode,
}

impl WeightPriceRule {
    pub fn covers(&self, weight: f64) -> bool {
        weight >= self.min_weight && self.max_weight.is_none_or(|max| weight < max)
    }
}

impl Contract for WeightPriceRule {
    const KEY: ContractKey = ContractKey::WeightPriceRule;

    fn check(&self) -> ContractResult<()> {
        let c = Self::KEY.as_str();
        ensure_non_empty(c, "rule_id", &self.rule_id)?;
        ensure_non_empty(c, "product_id", &self.product_id)?;

        if !self.min_weight.is_finite() || self.min_weight < 0.0 {
            return Err(ContractViolation::invalid_field(c, "min_weight", "must be a non-negative number"));
        }
        if let Some(max) = self.max_weight {
            if !max.is_finite() || max <= self.min_weight {
                return Err(ContractViolation::invalid_field(
                    c,
                    "max_weight",
                    "must be greater than min_weight",
                ));
            }
        }
        if self.price_per_unit < 0 {
            return Err(ContractViolation::invalid_field(c, "price_per_unit", "must not be negative"));
        }
        Ok(())
    }
}
