// src/config.rs
// ============================================================================
// Module: Kora Runtime Config
// Description: Typed defaults for knobs hosts may want to override.
// Purpose: Give every ambient tunable a Default-backed home without a file
//          format loader, which is out of scope for this crate.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Config *loaders* (file discovery, env merging, format parsing) are out of
//! scope here; this module only gives hosts a typed, serializable bag of
//! defaults to construct or override when embedding the runtime.

use serde::Deserialize;
use serde::Serialize;

/// Environment variable overriding the default adapter invocation timeout,
/// in milliseconds, when a task does not declare `budget.max_time_ms`.
pub const ADAPTER_DEFAULT_TIMEOUT_MS_ENV: &str = "KORA_ADAPTER_DEFAULT_TIMEOUT_MS";

/// Default adapter invocation timeout when no budget and no environment
/// override are present (approximately 30 seconds).
pub const DEFAULT_ADAPTER_TIMEOUT_MS: u64 = 30_000;

/// Minimum adapter invocation timeout floor, regardless of budget.
pub const MIN_ADAPTER_TIMEOUT_MS: u64 = 100;

/// Fixed margin added to `budget.max_time_ms` to derive the adapter's hard
/// wall-clock ceiling.
pub const ADAPTER_TIMEOUT_MARGIN_MS: u64 = 1_000;

/// Process-wide runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Default retrieval cache capacity (bounded LRU).
    pub retrieval_max_entries: usize,
    /// Default retrieval cache TTL, in seconds, applied when a policy does
    /// not set `retrieval_ttl_seconds`.
    pub retrieval_default_ttl_seconds: u64,
    /// Default adaptive routing profile for tasks that do not declare one.
    pub default_routing_profile: crate::task_ir::RoutingProfile,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retrieval_max_entries: 1_000,
            retrieval_default_ttl_seconds: 300,
            default_routing_profile: crate::task_ir::RoutingProfile::Balanced,
        }
    }
}

/// Resolves the adapter invocation timeout for a task budget.
///
/// Uses `budget.max_time_ms + ADAPTER_TIMEOUT_MARGIN_MS`, floored at
/// `MIN_ADAPTER_TIMEOUT_MS`, when `max_time_ms` is positive; otherwise falls
/// back to the `KORA_ADAPTER_DEFAULT_TIMEOUT_MS` environment override, or
/// [`DEFAULT_ADAPTER_TIMEOUT_MS`].
#[must_use]
pub fn resolve_adapter_timeout_ms(max_time_ms: u64) -> u64 {
    if max_time_ms > 0 {
        return (max_time_ms + ADAPTER_TIMEOUT_MARGIN_MS).max(MIN_ADAPTER_TIMEOUT_MS);
    }
    std::env::var(ADAPTER_DEFAULT_TIMEOUT_MS_ENV)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(DEFAULT_ADAPTER_TIMEOUT_MS)
}
