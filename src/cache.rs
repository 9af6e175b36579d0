// src/cache.rs
// ============================================================================
// Module: Kora Retrieval Cache
// Description: Process-wide, TTL + bounded-LRU cache keyed by a canonical
//              JSON fingerprint of (task_type, input, tags).
// Purpose: Let the adaptive controller short-circuit expensive escalation
//          stages with a previously-accepted output.
// Dependencies: serde_jcs, sha2, serde_json, std::sync, crate::error
// ============================================================================

//! ## Overview
//! The cache is the only piece of shared mutable state across concurrent
//! runs (§5); `get`/`put`/eviction are made linearizable with a single
//! mutex, following the same `Arc<Mutex<...>>` shape the rest of this
//! crate's host process would use for any shared in-memory store. A clock
//! is injectable so TTL behavior is deterministic under test.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;

use crate::error::CacheError;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time, in seconds, for TTL bookkeeping.
pub trait Clock: Send + Sync {
    /// Returns the current time in seconds since an arbitrary, monotonic
    /// epoch consistent within a single cache's lifetime.
    fn now_seconds(&self) -> f64;
}

/// Wall-clock implementation of [`Clock`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_seconds(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

// ============================================================================
// SECTION: Fingerprint
// ============================================================================

/// Builds a deterministic cache key from a task's shape and input payload.
///
/// Serializes `{"task_type": ..., "input_payload": ...}` (and `"tags"` when
/// non-empty) as canonical JSON (sorted keys, no whitespace) and returns the
/// lowercase hex SHA-256 digest.
///
/// # Errors
///
/// Returns [`CacheError::Canonicalization`] if the payload cannot be
/// canonicalized.
pub fn fingerprint(
    task_type: &str,
    input_payload: &Value,
    tags: &[String],
) -> Result<String, CacheError> {
    let mut payload = serde_json::Map::new();
    payload.insert("task_type".to_string(), Value::String(task_type.to_string()));
    payload.insert("input_payload".to_string(), input_payload.clone());
    if !tags.is_empty() {
        payload.insert(
            "tags".to_string(),
            Value::Array(tags.iter().cloned().map(Value::String).collect()),
        );
    }

    let canonical = serde_jcs::to_vec(&Value::Object(payload))
        .map_err(|err| CacheError::Canonicalization(err.to_string()))?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Cache
// ============================================================================

struct Entry {
    value: Value,
    expire_at: Option<f64>,
    last_used: u64,
}

struct Inner {
    items: HashMap<String, Entry>,
    max_entries: usize,
    seq: u64,
}

impl Inner {
    fn evict_over_limit(&mut self) {
        while self.items.len() > self.max_entries {
            let Some(oldest_key) = self
                .items
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.items.remove(&oldest_key);
        }
    }
}

/// Process-wide retrieval cache with TTL expiry and bounded LRU eviction.
///
/// Internally synchronized: `get`/`put`/eviction are linearizable across
/// concurrent runs.
pub struct RetrievalCache {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl RetrievalCache {
    /// Creates a cache with the given capacity and clock.
    #[must_use]
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: HashMap::new(),
                max_entries: max_entries.max(1),
                seq: 0,
            }),
            clock,
        }
    }

    /// Creates a cache with the given capacity and the system clock.
    #[must_use]
    pub fn with_system_clock(max_entries: usize) -> Self {
        Self::new(max_entries, Arc::new(SystemClock))
    }

    /// Reconfigures the capacity, evicting immediately if now over limit.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Poisoned`] if the internal mutex was poisoned.
    pub fn configure(&self, max_entries: usize) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().map_err(|_| CacheError::Poisoned)?;
        inner.max_entries = max_entries.max(1);
        inner.evict_over_limit();
        Ok(())
    }

    /// Inserts `value` under `key`. `ttl_seconds = Some(0)` removes any
    /// existing entry instead of inserting. `ttl_seconds = None` inserts
    /// without expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Poisoned`] if the internal mutex was poisoned.
    pub fn put(&self, key: &str, value: Value, ttl_seconds: Option<u64>) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().map_err(|_| CacheError::Poisoned)?;

        if let Some(0) = ttl_seconds {
            inner.items.remove(key);
            return Ok(());
        }

        let expire_at = ttl_seconds.map(|ttl| self.clock.now_seconds() + ttl as f64);
        inner.seq += 1;
        let seq = inner.seq;
        inner.items.insert(
            key.to_string(),
            Entry {
                value,
                expire_at,
                last_used: seq,
            },
        );
        inner.evict_over_limit();
        Ok(())
    }

    /// Looks up `key`, returning `None` on a miss or an expired entry.
    /// Refreshes recency on a hit.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Poisoned`] if the internal mutex was poisoned.
    pub fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut inner = self.inner.lock().map_err(|_| CacheError::Poisoned)?;

        let expired = match inner.items.get(key) {
            None => return Ok(None),
            Some(entry) => entry
                .expire_at
                .is_some_and(|expire_at| self.clock.now_seconds() >= expire_at),
        };
        if expired {
            inner.items.remove(key);
            return Ok(None);
        }

        inner.seq += 1;
        let seq = inner.seq;
        let value = inner.items.get_mut(key).map(|entry| {
            entry.last_used = seq;
            entry.value.clone()
        });
        Ok(value)
    }

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Poisoned`] if the internal mutex was poisoned.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut inner = self.inner.lock().map_err(|_| CacheError::Poisoned)?;
        inner.items.clear();
        Ok(())
    }
}
