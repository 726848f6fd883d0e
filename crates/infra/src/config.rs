//! Consumer configuration from the environment.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::idempotency::{DEFAULT_KEY_PREFIX, DEFAULT_TTL, IdempotencyStore};

pub const REDIS_URL_VAR: &str = "REDIS_URL";
pub const IDEMPOTENCY_TTL_VAR: &str = "MERCATO_IDEMPOTENCY_TTL_SECS";
pub const IDEMPOTENCY_PREFIX_VAR: &str = "MERCATO_IDEMPOTENCY_PREFIX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    /// Shared idempotency backend; `None` means process-local only.
    pub redis_url: Option<String>,
    pub idempotency_ttl: Duration,
    pub idempotency_prefix: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            idempotency_ttl: DEFAULT_TTL,
            idempotency_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl ConsumerConfig {
    /// Read configuration from process environment variables.
    ///
    /// Invalid values fall back to defaults with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        config.redis_url = lookup(REDIS_URL_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        if let Some(raw) = lookup(IDEMPOTENCY_TTL_VAR) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.idempotency_ttl = Duration::from_secs(secs),
                _ => warn!(
                    var = IDEMPOTENCY_TTL_VAR,
                    value = %raw,
                    default_secs = DEFAULT_TTL.as_secs(),
                    "invalid idempotency TTL; using default"
                ),
            }
        }

        if let Some(raw) = lookup(IDEMPOTENCY_PREFIX_VAR) {
            let prefix = raw.trim().trim_end_matches(':');
            if prefix.is_empty() {
                warn!(
                    var = IDEMPOTENCY_PREFIX_VAR,
                    default = DEFAULT_KEY_PREFIX,
                    "empty idempotency prefix; using default"
                );
            } else {
                config.idempotency_prefix = prefix.to_string();
            }
        }

        config
    }

    /// Build the idempotency store this configuration describes.
    ///
    /// A configured Redis URL that cannot be used (bad URL, or the `redis`
    /// feature compiled out) degrades to the in-memory store with a warning.
    pub fn build_idempotency_store(&self) -> Arc<IdempotencyStore> {
        let store = match &self.redis_url {
            Some(url) => shared_store(url),
            None => {
                info!("no REDIS_URL; idempotency is process-local");
                IdempotencyStore::in_memory()
            }
        };

        Arc::new(
            store
                .with_ttl(self.idempotency_ttl)
                .with_prefix(self.idempotency_prefix.clone()),
        )
    }
}

#[cfg(feature = "redis")]
fn shared_store(url: &str) -> IdempotencyStore {
    use crate::idempotency::RedisIdempotencyBackend;

    match RedisIdempotencyBackend::new(url) {
        Ok(backend) => {
            info!("idempotency backed by redis");
            IdempotencyStore::with_backend(Arc::new(backend))
        }
        Err(e) => {
            warn!(error = %e, "invalid REDIS_URL; idempotency is process-local");
            IdempotencyStore::in_memory()
        }
    }
}

#[cfg(not(feature = "redis"))]
fn shared_store(_url: &str) -> IdempotencyStore {
    warn!("REDIS_URL set but built without the `redis` feature; idempotency is process-local");
    IdempotencyStore::in_memory()
}
