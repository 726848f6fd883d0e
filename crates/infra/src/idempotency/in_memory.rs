//! Process-local idempotency backend.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{IdempotencyBackend, IdempotencyError, IdempotencyRecord};

#[derive(Debug)]
struct Entry {
    record: IdempotencyRecord,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory idempotency map.
///
/// - Atomic per key (one mutex around the map)
/// - Expired entries are evicted lazily on access and by `purge_expired`
/// - Lost on restart; invisible to other processes
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryIdempotencyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) records.
    pub fn len(&self) -> Result<usize, IdempotencyError> {
        let entries = self.entries.lock().map_err(|_| IdempotencyError::Poisoned)?;
        let now = Instant::now();
        Ok(entries.values().filter(|e| !e.is_expired(now)).count())
    }

    pub fn is_empty(&self) -> Result<bool, IdempotencyError> {
        Ok(self.len()? == 0)
    }

    pub fn contains(&self, key: &str) -> Result<bool, IdempotencyError> {
        let entries = self.entries.lock().map_err(|_| IdempotencyError::Poisoned)?;
        Ok(entries.get(key).is_some_and(|e| !e.is_expired(Instant::now())))
    }

    /// Drop every expired record; returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, IdempotencyError> {
        let mut entries = self.entries.lock().map_err(|_| IdempotencyError::Poisoned)?;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, e| !e.is_expired(now));
        Ok(before - entries.len())
    }
}

#[async_trait]
impl IdempotencyBackend for InMemoryIdempotencyBackend {
    async fn insert_if_absent(
        &self,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let mut entries = self.entries.lock().map_err(|_| IdempotencyError::Poisoned)?;
        let now = Instant::now();

        if let Some(existing) = entries.get(&record.key) {
            if !existing.is_expired(now) {
                return Ok(Some(existing.record.clone()));
            }
        }

        // Absurd TTLs are clamped to a year.
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or(now + Duration::from_secs(365 * 24 * 60 * 60));
        entries.insert(
            record.key.clone(),
            Entry {
                record: record.clone(),
                expires_at,
            },
        );
        Ok(None)
    }

    async fn remove(&self, key: &str) -> Result<(), IdempotencyError> {
        let mut entries = self.entries.lock().map_err(|_| IdempotencyError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn record(key: &str, fp: &str) -> IdempotencyRecord {
        IdempotencyRecord {
            key: key.to_string(),
            fingerprint: fp.to_string(),
            seen_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn first_insert_wins() {
        let backend = InMemoryIdempotencyBackend::new();
        let ttl = Duration::from_secs(60);

        assert!(backend.insert_if_absent(&record("k", "fp1"), ttl).await.unwrap().is_none());
        let existing = backend.insert_if_absent(&record("k", "fp2"), ttl).await.unwrap().unwrap();
        assert_eq!(existing.fingerprint, "fp1");
        assert_eq!(backend.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_drops_expired_records_only() {
        let backend = InMemoryIdempotencyBackend::new();
        backend.insert_if_absent(&record("old", "a"), Duration::ZERO).await.unwrap();
        backend.insert_if_absent(&record("new", "b"), Duration::from_secs(60)).await.unwrap();

        assert!(!backend.contains("old").unwrap());
        assert_eq!(backend.purge_expired().unwrap(), 1);
        assert!(backend.contains("new").unwrap());
        assert!(!backend.is_empty().unwrap());
    }
}
