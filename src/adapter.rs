// src/adapter.rs
// ============================================================================
// Module: Kora Adapter Contract and Registry
// Description: Adapter trait, result shape, and name-to-implementation
//              registry with bare/stage-qualified resolution.
// Purpose: Let the adaptive controller dispatch to external reasoning
//          backends without knowing their wire protocol.
// Dependencies: serde_json, crate::task_ir, crate::error
// ============================================================================

//! ## Overview
//! An adapter is a named, possibly-remote inference stage. The runtime does
//! not interpret adapter-internal behavior beyond the fields documented on
//! [`AdapterResult`]. Resolution of *escalation* stage tokens tries the bare
//! token first, then `"<base>:<token>"`, mirroring how a host might register
//! both a provider-agnostic alias and a provider-qualified variant.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::AdapterError;
use crate::task_ir::Budget;

// ============================================================================
// SECTION: Contract
// ============================================================================

/// Token usage reported by an adapter invocation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    /// Input tokens consumed, when the adapter reports token-based usage.
    pub tokens_in: Option<u64>,
    /// Output tokens produced, when the adapter reports token-based usage.
    pub tokens_out: Option<u64>,
    /// Wall-clock milliseconds spent in the invocation.
    pub time_ms: u64,
}

impl Usage {
    /// Cost units for this invocation: `tokens_in + tokens_out` when either
    /// is reported, falling back to `time_ms` otherwise.
    #[must_use]
    pub fn cost_units(&self) -> f64 {
        if self.tokens_in.is_some() || self.tokens_out.is_some() {
            (self.tokens_in.unwrap_or(0) + self.tokens_out.unwrap_or(0)) as f64
        } else {
            self.time_ms as f64
        }
    }
}

/// Result of a single adapter invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResult {
    /// Whether the adapter considers its own output usable.
    pub ok: bool,
    /// Adapter output payload.
    pub output: Value,
    /// Reported token/time usage.
    pub usage: Usage,
    /// Adapter metadata. SHOULD include `adapter`, `model`, and may include
    /// `confidence`, `stop_reason`, `gate_retrieval_hit`, `gate_verifier_ok`.
    pub meta: Map<String, Value>,
    /// Failure detail when `ok` is `false`.
    pub error: Option<String>,
}

/// A named, possibly-remote inference stage.
pub trait Adapter {
    /// Invokes the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the invocation cannot be completed
    /// (the adapter itself reporting `ok: false` is not an error: callers
    /// inspect [`AdapterResult::ok`]).
    fn run(
        &self,
        task_id: &str,
        input: &Map<String, Value>,
        budget: &Budget,
        output_schema: &Value,
    ) -> Result<AdapterResult, AdapterError>;
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Resolves adapter names (bare or stage-qualified) to implementations.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Box<dyn Adapter + Send + Sync>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under `name`. Re-registering a name replaces the
    /// previous implementation.
    pub fn register(&mut self, name: impl Into<String>, adapter: impl Adapter + Send + Sync + 'static) {
        self.adapters.insert(name.into(), Box::new(adapter));
    }

    /// Resolves a bare adapter name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&(dyn Adapter + Send + Sync)> {
        self.adapters.get(name).map(AsRef::as_ref)
    }

    /// Resolves an escalation stage token against a base adapter name.
    ///
    /// Tries `stage_token` as a bare name first, then `"<base>:<stage_token>"`.
    #[must_use]
    pub fn resolve_stage(&self, base: &str, stage_token: &str) -> Option<&(dyn Adapter + Send + Sync)> {
        if let Some(adapter) = self.resolve(stage_token) {
            return Some(adapter);
        }
        self.resolve(&format!("{base}:{stage_token}"))
    }

    /// Resolves an escalation stage token to the registered name it bound to,
    /// using the same bare-then-qualified order as [`Self::resolve_stage`].
    #[must_use]
    pub fn resolve_stage_name(&self, base: &str, stage_token: &str) -> Option<String> {
        if self.adapters.contains_key(stage_token) {
            return Some(stage_token.to_string());
        }
        let qualified = format!("{base}:{stage_token}");
        self.adapters.contains_key(&qualified).then_some(qualified)
    }
}
