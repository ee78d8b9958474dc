//! Configuration Module
//!
//! Handles loading and validating store configuration from environment variables.

use std::env;

use crate::backend::{validate_namespace, BackendKind};
use crate::cache::{Ttl, Version};
use crate::error::{Result, StoreError};

/// Store configuration parameters.
///
/// Immutable once a store is built from it.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Namespace scoping this store's keys on a shared medium
    pub namespace: String,
    /// Which backend variant the factory builds
    pub backend: BackendKind,
    /// Maximum entry age
    pub ttl: Ttl,
    /// Version stamped on writes and required on reads
    pub version: Option<Version>,
    /// Accelerator capacity, None = no accelerator
    pub cache_limit: Option<usize>,
    /// Background purge interval in seconds
    pub purge_interval: u64,
}

impl StoreConfig {
    /// Creates a new StoreConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `KVCACHE_NAMESPACE` - Store namespace (default: "default")
    /// - `KVCACHE_BACKEND` - `memory` or `shared` (default: memory)
    /// - `KVCACHE_TTL_MS` - TTL in milliseconds, non-positive = forever (default: forever)
    /// - `KVCACHE_VERSION` - Integer or string version tag (default: none)
    /// - `KVCACHE_CACHE_LIMIT` - Accelerator capacity (default: disabled)
    /// - `KVCACHE_PURGE_INTERVAL` - Purge frequency in seconds (default: 60)
    ///
    /// An unrecognized backend, a malformed cache limit or an invalid
    /// namespace is an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            namespace: env::var("KVCACHE_NAMESPACE").unwrap_or(defaults.namespace),
            backend: match env::var("KVCACHE_BACKEND") {
                Ok(kind) => kind.parse()?,
                Err(_) => defaults.backend,
            },
            ttl: env::var("KVCACHE_TTL_MS")
                .ok()
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(Ttl::from_f64)
                .unwrap_or(defaults.ttl),
            version: env::var("KVCACHE_VERSION")
                .ok()
                .filter(|v| !v.is_empty())
                .map(|v| parse_version(&v)),
            cache_limit: match env::var("KVCACHE_CACHE_LIMIT") {
                Ok(raw) => Some(raw.trim().parse().map_err(|_| {
                    StoreError::InvalidConfig(format!("invalid cache limit '{}'", raw))
                })?),
                Err(_) => None,
            },
            purge_interval: env::var("KVCACHE_PURGE_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.purge_interval),
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations no store can be built from.
    pub fn validate(&self) -> Result<()> {
        validate_namespace(&self.namespace)?;
        if self.cache_limit == Some(0) {
            return Err(StoreError::InvalidConfig(
                "cache limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Integers become numeric versions, anything else a string version.
fn parse_version(raw: &str) -> Version {
    match raw.parse::<i64>() {
        Ok(n) => Version::Number(n),
        Err(_) => Version::Text(raw.to_string()),
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            backend: BackendKind::Memory,
            ttl: Ttl::Forever,
            version: None,
            cache_limit: None,
            purge_interval: 60,
        }
    }
}
