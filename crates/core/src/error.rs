//! Contract violation error model.

use thiserror::Error;

/// Result type used by payload contract validation.
pub type ContractResult<T> = Result<T, ContractViolation>;

/// A payload failed its contract.
///
/// Contract violations are producer bugs: a malformed payload never becomes
/// valid by being redelivered, so callers must not retry or dead-letter it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    /// The payload could not be decoded into the contract's shape
    /// (missing field, wrong type, unknown field, value outside a closed set).
    #[error("{contract}: malformed payload: {message}")]
    Malformed {
        contract: &'static str,
        message: String,
    },

    /// The payload decoded but a field broke a semantic rule.
    #[error("{contract}: field `{field}` {reason}")]
    InvalidField {
        contract: &'static str,
        field: &'static str,
        reason: String,
    },

    /// No contract is registered under the requested key.
    #[error("unknown contract: {0}")]
    UnknownContract(String),
}

impl ContractViolation {
    pub fn malformed(contract: &'static str, msg: impl Into<String>) -> Self {
        Self::Malformed {
            contract,
            message: msg.into(),
        }
    }

    pub fn invalid_field(
        contract: &'static str,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            contract,
            field,
            reason: reason.into(),
        }
    }

    pub fn unknown_contract(key: impl Into<String>) -> Self {
        Self::UnknownContract(key.into())
    }

    /// Name of the contract that rejected the payload, if known.
    pub fn contract(&self) -> Option<&'static str> {
        match self {
            Self::Malformed { contract, .. } | Self::InvalidField { contract, .. } => {
                Some(contract)
            }
            Self::UnknownContract(_) => None,
        }
    }
}

/// Reject empty or whitespace-only identifiers.
pub fn ensure_non_empty(
    contract: &'static str,
    field: &'static str,
    value: &str,
) -> ContractResult<()> {
    if value.trim().is_empty() {
        return Err(ContractViolation::invalid_field(
            contract,
            field,
            "must not be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_identifiers_are_rejected() {
        let err = ensure_non_empty("invoice_record", "order_id", "   ").unwrap_err();
        assert_eq!(err.contract(), Some("invoice_record"));
        assert_eq!(
            err.to_string(),
            "invoice_record: field `order_id` must not be empty"
        );

        assert!(ensure_non_empty("invoice_record", "order_id", "ord_1").is_ok());
    }
}
