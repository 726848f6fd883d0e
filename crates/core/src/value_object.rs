//! Value objects shared by payload contracts.
//!
//! Value objects are compared by value and validated at construction, so a
//! decoded contract can never hold an out-of-range currency or channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ISO 4217-style currency code: exactly three uppercase ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid currency code `{0}`: expected three uppercase ASCII letters")]
pub struct InvalidCurrencyCode(pub String);

impl CurrencyCode {
    pub fn parse(code: impl Into<String>) -> Result<Self, InvalidCurrencyCode> {
        let code = code.into();
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(InvalidCurrencyCode(code))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = InvalidCurrencyCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

impl core::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sales channel an inventory or order event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SalesChannel {
    Storefront,
    Marketplace,
    Pos,
    Wholesale,
}

impl SalesChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SalesChannel::Storefront => "storefront",
            SalesChannel::Marketplace => "marketplace",
            SalesChannel::Pos => "pos",
            SalesChannel::Wholesale => "wholesale",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_code_requires_three_uppercase_letters() {
        assert!(CurrencyCode::parse("BRL").is_ok());
        assert!(CurrencyCode::parse("usd").is_err());
        assert!(CurrencyCode::parse("EURO").is_err());
        assert!(CurrencyCode::parse("U$D").is_err());
    }

    #[test]
    fn currency_code_is_validated_on_deserialize() {
        let ok: CurrencyCode = serde_json::from_str("\"USD\"").unwrap();
        assert_eq!(ok.as_str(), "USD");

        let err = serde_json::from_str::<CurrencyCode>("\"usd\"").unwrap_err();
        assert!(err.to_string().contains("invalid currency code"));
    }

    #[test]
    fn sales_channel_is_a_closed_set() {
        let ch: SalesChannel = serde_json::from_str("\"storefront\"").unwrap();
        assert_eq!(ch, SalesChannel::Storefront);
        assert_eq!(ch.as_str(), "storefront");
        assert!(serde_json::from_str::<SalesChannel>("\"telegram\"").is_err());
    }
}
