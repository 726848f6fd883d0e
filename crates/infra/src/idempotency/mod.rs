//! Idempotency store: duplicate suppression keyed by (scope, idempotency key).
//!
//! ## Semantics
//!
//! - No key supplied: every call is fresh (idempotency is opt-in per call site).
//! - First sighting of a key: the payload fingerprint is stored with a TTL.
//! - Same key, same fingerprint: a safe duplicate; callers skip the handler.
//! - Same key, different fingerprint: a conflict. Two distinct payloads share
//!   one key, which is a producer bug and must reach an operator.
//!
//! ## Degraded mode
//!
//! The store normally writes through a shared backend (Redis). When that
//! backend errors, the call is served by a process-local map with identical
//! semantics. The guarantee then weakens to "idempotent within this process":
//! another instance cannot see these records, and they are lost on restart.
//! `is_degraded()` reports whether the fallback has been used.

mod in_memory;
#[cfg(feature = "redis")]
mod redis;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

pub use in_memory::InMemoryIdempotencyBackend;
#[cfg(feature = "redis")]
pub use redis::RedisIdempotencyBackend;

/// Default record lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default key namespace.
pub const DEFAULT_KEY_PREFIX: &str = "mercato:idempotency";

/// Persisted dedup marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Composite `prefix:scope:idempotency_key`.
    pub key: String,
    /// Hex SHA-256 of the canonical payload.
    pub fingerprint: String,
    pub seen_at: DateTime<Utc>,
}

/// Result of a check-and-store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyCheck {
    /// First sighting (or no key supplied).
    Fresh,
    /// Same key and same payload seen before.
    Duplicate,
    /// Same key seen before with a different payload.
    Conflict { message: String },
}

impl IdempotencyCheck {
    /// Key seen before, with the same payload or not.
    pub fn is_repeat(&self) -> bool {
        !matches!(self, IdempotencyCheck::Fresh)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, IdempotencyCheck::Conflict { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("failed to fingerprint payload: {0}")]
    Fingerprint(String),

    #[error("{backend} backend error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error("idempotency map lock poisoned")]
    Poisoned,
}

/// Key/value storage with an atomic set-if-absent.
#[async_trait]
pub trait IdempotencyBackend: Send + Sync {
    /// Store `record` under `record.key` unless the key is already present.
    ///
    /// Returns the existing record when one is present, `None` when `record`
    /// was stored. Must be atomic per key.
    async fn insert_if_absent(
        &self,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyError>;

    /// Delete a record (no-op when absent).
    async fn remove(&self, key: &str) -> Result<(), IdempotencyError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Deterministic fingerprint of a payload.
///
/// The payload is encoded to JSON with object keys sorted at every depth, so
/// field order never changes the fingerprint.
pub fn fingerprint<T: Serialize + ?Sized>(payload: &T) -> Result<String, IdempotencyError> {
    let value = serde_json::to_value(payload)
        .map_err(|e| IdempotencyError::Fingerprint(e.to_string()))?;
    let bytes = serde_json::to_vec(&canonicalize(value))
        .map_err(|e| IdempotencyError::Fingerprint(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn canonicalize(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<_> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            JsonValue::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect(),
            )
        }
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Idempotency store with an optional shared backend and a process-local fallback.
pub struct IdempotencyStore {
    primary: Option<Arc<dyn IdempotencyBackend>>,
    fallback: InMemoryIdempotencyBackend,
    ttl: Duration,
    prefix: String,
    degraded: AtomicBool,
}

impl IdempotencyStore {
    /// Process-local store only (single-instance deployments, tests, dev).
    pub fn in_memory() -> Self {
        Self {
            primary: None,
            fallback: InMemoryIdempotencyBackend::new(),
            ttl: DEFAULT_TTL,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Store backed by a shared backend, falling back to memory on backend errors.
    pub fn with_backend(primary: Arc<dyn IdempotencyBackend>) -> Self {
        Self {
            primary: Some(primary),
            ..Self::in_memory()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether any call has been served by the process-local fallback.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Composite storage key for (scope, idempotency key).
    pub fn record_key(&self, scope: &str, idempotency_key: &str) -> String {
        format!("{}:{}:{}", self.prefix, scope, idempotency_key)
    }

    /// Record the payload fingerprint for `(scope, idempotency_key)` unless seen before.
    pub async fn check_and_store<T: Serialize + ?Sized>(
        &self,
        scope: &str,
        idempotency_key: Option<&str>,
        payload: &T,
    ) -> Result<IdempotencyCheck, IdempotencyError> {
        let Some(idempotency_key) = idempotency_key else {
            return Ok(IdempotencyCheck::Fresh);
        };

        let record = IdempotencyRecord {
            key: self.record_key(scope, idempotency_key),
            fingerprint: fingerprint(payload)?,
            seen_at: Utc::now(),
        };

        let existing = self.insert_if_absent(&record).await?;

        Ok(match existing {
            None => IdempotencyCheck::Fresh,
            Some(prev) if prev.fingerprint == record.fingerprint => {
                debug!(key = %record.key, first_seen = %prev.seen_at, "duplicate delivery");
                IdempotencyCheck::Duplicate
            }
            Some(prev) => IdempotencyCheck::Conflict {
                message: format!(
                    "idempotency key `{idempotency_key}` in scope `{scope}` was first used at {} for a different payload",
                    prev.seen_at.to_rfc3339()
                ),
            },
        })
    }

    /// Drop the record for `(scope, idempotency_key)` so a redelivery is processed.
    ///
    /// The fallback copy is always removed. A primary that cannot delete its
    /// copy is an error: the record would otherwise suppress the redelivery.
    pub async fn release(&self, scope: &str, idempotency_key: &str) -> Result<(), IdempotencyError> {
        let key = self.record_key(scope, idempotency_key);

        // The record may live in either place depending on when the backend failed.
        self.fallback.remove(&key).await?;
        if let Some(primary) = &self.primary {
            if let Err(e) = primary.remove(&key).await {
                warn!(backend = primary.name(), key = %key, error = %e, "failed to release idempotency record");
                self.mark_degraded();
                return Err(e);
            }
        }
        Ok(())
    }

    async fn insert_if_absent(
        &self,
        record: &IdempotencyRecord,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        if let Some(primary) = &self.primary {
            match primary.insert_if_absent(record, self.ttl).await {
                Ok(existing) => return Ok(existing),
                Err(e) => {
                    warn!(
                        backend = primary.name(),
                        key = %record.key,
                        error = %e,
                        "idempotency backend unavailable; using process-local fallback"
                    );
                    self.mark_degraded();
                }
            }
        }

        self.fallback.insert_if_absent(record, self.ttl).await
    }

    fn mark_degraded(&self) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            info!("idempotency store entered degraded mode (process-local guarantees only)");
        }
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl core::fmt::Debug for IdempotencyStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdempotencyStore")
            .field("primary", &self.primary.as_ref().map(|p| p.name()))
            .field("ttl", &self.ttl)
            .field("prefix", &self.prefix)
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Backend that always fails, standing in for an unreachable cache.
    struct DownBackend;

    #[async_trait]
    impl IdempotencyBackend for DownBackend {
        async fn insert_if_absent(
            &self,
            _record: &IdempotencyRecord,
            _ttl: Duration,
        ) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
            Err(IdempotencyError::Backend {
                backend: "down",
                message: "connection refused".to_string(),
            })
        }

        async fn remove(&self, _key: &str) -> Result<(), IdempotencyError> {
            Err(IdempotencyError::Backend {
                backend: "down",
                message: "connection refused".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = json!({"b": 1, "a": {"y": [1, {"q": 1, "p": 2}], "x": null}});
        let b = json!({"a": {"x": null, "y": [1, {"p": 2, "q": 1}]}, "b": 1});
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());

        let c = json!({"a": {"x": null, "y": [{"p": 2, "q": 1}, 1]}, "b": 1});
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&c).unwrap());
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let fp = fingerprint(&json!({})).unwrap();
        assert_eq!(fp.len(), 64);
        // sha256("{}")
        assert_eq!(fp, "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a");
    }

    #[tokio::test]
    async fn no_key_is_always_fresh() {
        let store = IdempotencyStore::in_memory();
        for _ in 0..3 {
            let check = store.check_and_store("inventory_sync", None, &json!({"a": 1})).await.unwrap();
            assert_eq!(check, IdempotencyCheck::Fresh);
        }
    }

    #[tokio::test]
    async fn distinguishes_duplicates_from_conflicts() {
        let store = IdempotencyStore::in_memory();
        let p1 = json!({"sku": "a", "qty": 1});
        let p2 = json!({"sku": "a", "qty": 2});

        let first = store.check_and_store("s", Some("k"), &p1).await.unwrap();
        assert_eq!(first, IdempotencyCheck::Fresh);

        let dup = store.check_and_store("s", Some("k"), &p1).await.unwrap();
        assert_eq!(dup, IdempotencyCheck::Duplicate);
        assert!(dup.is_repeat() && !dup.is_conflict());

        let conflict = store.check_and_store("s", Some("k"), &p2).await.unwrap();
        assert!(conflict.is_repeat() && conflict.is_conflict());
        match conflict {
            IdempotencyCheck::Conflict { message } => assert!(message.contains("`k`")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let store = IdempotencyStore::in_memory();
        let p = json!({"a": 1});
        assert_eq!(store.check_and_store("s1", Some("k"), &p).await.unwrap(), IdempotencyCheck::Fresh);
        assert_eq!(store.check_and_store("s2", Some("k"), &p).await.unwrap(), IdempotencyCheck::Fresh);
    }

    #[tokio::test]
    async fn expired_records_are_forgotten() {
        let store = IdempotencyStore::in_memory().with_ttl(Duration::ZERO);
        let p = json!({"a": 1});
        assert_eq!(store.check_and_store("s", Some("k"), &p).await.unwrap(), IdempotencyCheck::Fresh);
        assert_eq!(store.check_and_store("s", Some("k"), &p).await.unwrap(), IdempotencyCheck::Fresh);
    }

    #[tokio::test]
    async fn release_allows_reprocessing() {
        let store = IdempotencyStore::in_memory();
        let p = json!({"a": 1});
        store.check_and_store("s", Some("k"), &p).await.unwrap();
        store.release("s", "k").await.unwrap();
        assert_eq!(store.check_and_store("s", Some("k"), &p).await.unwrap(), IdempotencyCheck::Fresh);
    }

    #[tokio::test]
    async fn unavailable_backend_degrades_to_process_local_map() {
        let store = IdempotencyStore::with_backend(Arc::new(DownBackend));
        assert!(!store.is_degraded());

        let p = json!({"a": 1});
        assert_eq!(store.check_and_store("s", Some("k"), &p).await.unwrap(), IdempotencyCheck::Fresh);
        assert!(store.is_degraded());

        // Same semantics in degraded mode.
        assert_eq!(store.check_and_store("s", Some("k"), &p).await.unwrap(), IdempotencyCheck::Duplicate);
        assert!(
            store
                .check_and_store("s", Some("k"), &json!({"a": 2}))
                .await
                .unwrap()
                .is_conflict()
        );

        // The backend cannot confirm the release, but the fallback record is gone.
        let err = store.release("s", "k").await.unwrap_err();
        assert!(matches!(err, IdempotencyError::Backend { backend: "down", .. }));
        assert_eq!(store.check_and_store("s", Some("k"), &p).await.unwrap(), IdempotencyCheck::Fresh);
    }

    #[tokio::test]
    async fn healthy_backend_is_used_instead_of_fallback() {
        let backend = Arc::new(InMemoryIdempotencyBackend::new());
        let store = IdempotencyStore::with_backend(backend.clone()).with_prefix("test");

        store.check_and_store("s", Some("k"), &json!({"a": 1})).await.unwrap();
        assert_eq!(backend.len().unwrap(), 1);
        assert!(backend.contains("test:s:k").unwrap());
        assert!(!store.is_degraded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_sightings_admit_exactly_one() {
        let store = Arc::new(IdempotencyStore::in_memory());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.check_and_store("s", Some("same"), &json!({"a": 1})).await.unwrap()
            }));
        }

        let mut fresh = 0;
        for t in tasks {
            if t.await.unwrap() == IdempotencyCheck::Fresh {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
    }
}
