//! Topic contract registry.
//!
//! A topic key (`inventory_sync`) is the stable internal name of an event
//! class; the wire topic (`inventory.sync.v1`) is what the broker sees. Each
//! entry carries the retry policy applied by the consumer executor.
//!
//! The registry is configuration, not state: it is validated once at
//! construction and shared behind an `Arc` afterwards. There is no way to
//! mutate it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contract::ContractKey;

/// Built-in topic keys.
pub mod topics {
    pub const PAYMENTS_SETTLEMENT: &str = "payments_settlement";
    pub const INVENTORY_SYNC: &str = "inventory_sync";
    pub const INVOICE_ISSUANCE: &str = "invoice_issuance";
}

/// Registry error.
///
/// All variants are configuration errors: they indicate a deployment or
/// programming mistake, never a bad message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error("duplicate topic key: {0}")]
    DuplicateTopicKey(String),

    #[error("duplicate wire topic `{wire_topic}` (topic key {topic_key})")]
    DuplicateWireTopic {
        topic_key: String,
        wire_topic: String,
    },

    #[error("invalid retry policy for {topic_key}: {reason}")]
    InvalidPolicy { topic_key: String, reason: String },
}

/// Fixed-delay retry policy for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of redeliveries permitted before dead-lettering (0 = none).
    pub max_retries: u32,
    /// Delay suggested to the requeue sink before the next attempt.
    pub backoff_seconds: u64,
    /// Wire topic that receives permanently failed messages.
    pub dead_letter_topic: String,
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, backoff_seconds: u64, dead_letter_topic: impl Into<String>) -> Self {
        Self {
            max_retries,
            backoff_seconds,
            dead_letter_topic: dead_letter_topic.into(),
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_seconds)
    }

    /// Whether a message may be redelivered as attempt `next_attempt`.
    pub fn allows(&self, next_attempt: u32) -> bool {
        next_attempt <= self.max_retries
    }
}

/// One event class: internal key, wire topic, purpose, policy, payload contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicContract {
    pub topic_key: String,
    pub wire_topic: String,
    /// Human-readable description (diagnostics only).
    pub purpose: String,
    pub policy: RetryPolicy,
    /// Default payload contract for messages on this topic.
    pub contract: ContractKey,
}

impl TopicContract {
    pub fn new(
        topic_key: impl Into<String>,
        wire_topic: impl Into<String>,
        purpose: impl Into<String>,
        policy: RetryPolicy,
        contract: ContractKey,
    ) -> Self {
        Self {
            topic_key: topic_key.into(),
            wire_topic: wire_topic.into(),
            purpose: purpose.into(),
            policy,
            contract,
        }
    }

    fn check(&self) -> Result<(), RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidPolicy {
            topic_key: self.topic_key.clone(),
            reason: reason.to_string(),
        };

        if self.topic_key.trim().is_empty() {
            return Err(invalid("topic key is empty"));
        }
        if self.wire_topic.trim().is_empty() {
            return Err(invalid("wire topic is empty"));
        }
        if self.policy.dead_letter_topic.trim().is_empty() {
            return Err(invalid("dead-letter topic is empty"));
        }
        if self.policy.dead_letter_topic == self.wire_topic {
            return Err(invalid("dead-letter topic must differ from the wire topic"));
        }
        Ok(())
    }
}

/// Immutable topic key → contract table.
#[derive(Debug, Clone)]
pub struct TopicRegistry {
    by_key: HashMap<String, TopicContract>,
}

impl TopicRegistry {
    /// Build a registry, rejecting duplicate keys/wire topics and empty topic names.
    pub fn new(contracts: impl IntoIterator<Item = TopicContract>) -> Result<Self, RegistryError> {
        let mut by_key: HashMap<String, TopicContract> = HashMap::new();

        for contract in contracts {
            contract.check()?;

            if by_key.contains_key(&contract.topic_key) {
                return Err(RegistryError::DuplicateTopicKey(contract.topic_key));
            }
            if by_key.values().any(|c| c.wire_topic == contract.wire_topic) {
                return Err(RegistryError::DuplicateWireTopic {
                    topic_key: contract.topic_key,
                    wire_topic: contract.wire_topic,
                });
            }

            by_key.insert(contract.topic_key.clone(), contract);
        }

        Ok(Self { by_key })
    }

    /// The marketplace topic table.
    pub fn marketplace() -> Self {
        let by_key = builtin_contracts()
            .into_iter()
            .map(|c| (c.topic_key.clone(), c))
            .collect();
        Self { by_key }
    }

    pub fn get(&self, topic_key: &str) -> Result<&TopicContract, RegistryError> {
        self.by_key
            .get(topic_key)
            .ok_or_else(|| RegistryError::UnknownTopic(topic_key.to_string()))
    }

    pub fn find_by_wire_topic(&self, wire_topic: &str) -> Option<&TopicContract> {
        self.by_key.values().find(|c| c.wire_topic == wire_topic)
    }

    /// Fail fast at startup if a consumer is wired to a key the registry lacks.
    pub fn ensure_known<'a>(&self, topic_keys: impl IntoIterator<Item = &'a str>) -> Result<(), RegistryError> {
        for key in topic_keys {
            self.get(key)?;
        }
        Ok(())
    }

    /// Entries sorted by topic key.
    pub fn iter(&self) -> impl Iterator<Item = &TopicContract> {
        let mut entries: Vec<_> = self.by_key.values().collect();
        entries.sort_by(|a, b| a.topic_key.cmp(&b.topic_key));
        entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::marketplace()
    }
}

fn builtin_contracts() -> Vec<TopicContract> {
    vec![
        TopicContract::new(
            topics::PAYMENTS_SETTLEMENT,
            "payments.settlement.v1",
            "Settle captured payments into seller balances",
            RetryPolicy::fixed(5, 30, "payments.settlement.dlq.v1"),
            ContractKey::PaymentSettlement,
        ),
        TopicContract::new(
            topics::INVENTORY_SYNC,
            "inventory.sync.v1",
            "Apply inventory ledger deltas across sales channels",
            RetryPolicy::fixed(8, 15, "inventory.sync.dlq.v1"),
            ContractKey::InventoryLedgerDelta,
        ),
        TopicContract::new(
            topics::INVOICE_ISSUANCE,
            "invoice.issuance.v1",
            "Issue fiscal invoices for completed orders",
            RetryPolicy::fixed(6, 20, "invoice.issuance.dlq.v1"),
            ContractKey::InvoiceRecord,
        ),
    ]
}
