//! Cache Entry Module
//!
//! Defines the stored entry wrapper, its version tag, TTL normalization and
//! the clock the store stamps entries with.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

// == Version ==
/// Schema version tag stamped on every entry.
///
/// Numbers and strings never compare equal to each other, so `Number(1)` and
/// `Text("1")` are different versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Version {
    Number(i64),
    Text(String),
}

impl From<i64> for Version {
    fn from(v: i64) -> Self {
        Version::Number(v)
    }
}

impl From<&str> for Version {
    fn from(v: &str) -> Self {
        Version::Text(v.to_string())
    }
}

impl From<String> for Version {
    fn from(v: String) -> Self {
        Version::Text(v)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Number(n) => write!(f, "{}", n),
            Version::Text(s) => f.write_str(s),
        }
    }
}

// == TTL ==
/// Maximum entry age before it is considered expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Entries older than this many milliseconds are expired
    Millis(u64),
    /// Entries never expire
    #[default]
    Forever,
}

impl Ttl {
    /// Normalizes a signed millisecond count. Zero and negatives mean `Forever`.
    pub fn from_millis(ms: i64) -> Self {
        if ms > 0 {
            Ttl::Millis(ms as u64)
        } else {
            Ttl::Forever
        }
    }

    /// Normalizes a floating millisecond count.
    ///
    /// NaN, infinities, zero and negatives all mean `Forever`. Fractions are
    /// truncated, with anything in `(0, 1)` kept as one millisecond.
    pub fn from_f64(ms: f64) -> Self {
        if ms.is_finite() && ms > 0.0 {
            Ttl::Millis((ms as u64).max(1))
        } else {
            Ttl::Forever
        }
    }

    /// Returns true if an entry of the given age (ms) has outlived this TTL.
    ///
    /// Strictly greater: an entry exactly `ttl` old is still valid.
    pub fn is_exceeded_by(&self, age_ms: u64) -> bool {
        match self {
            Ttl::Millis(ttl) => age_ms > *ttl,
            Ttl::Forever => false,
        }
    }
}

// == Entry ==
/// A stored value together with its write time and version tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<T> {
    /// Write timestamp (Unix milliseconds), set by the store
    pub time: u64,
    /// The stored value
    pub value: T,
    /// Version the store was configured with at write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl<T> Entry<T> {
    // == Constructor ==
    /// Creates an entry stamped at `time`.
    pub fn new(value: T, time: u64, version: Option<Version>) -> Self {
        Self {
            time,
            value,
            version,
        }
    }

    // == Is Expired ==
    /// Checks whether the entry is older than `ttl` at `now`.
    ///
    /// A write time in the future counts as age zero.
    pub fn is_expired(&self, ttl: Ttl, now: u64) -> bool {
        ttl.is_exceeded_by(now.saturating_sub(self.time))
    }

    // == Version Check ==
    /// Checks the entry against the configured version.
    ///
    /// With no configured version every entry passes.
    pub fn matches_version(&self, configured: Option<&Version>) -> bool {
        match configured {
            Some(v) => self.version.as_ref() == Some(v),
            None => true,
        }
    }

    /// Returns true if the entry passes both the version and the TTL check.
    pub fn is_live(&self, ttl: Ttl, configured: Option<&Version>, now: u64) -> bool {
        self.matches_version(configured) && !self.is_expired(ttl, now)
    }
}

// == Clock ==
/// Source of the millisecond timestamps used to stamp and age entries.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> u64;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        current_timestamp_ms()
    }
}

/// Hand-driven clock for deterministic expiry.
///
/// Clones share the same time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Moves the clock forward by `ms`.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
