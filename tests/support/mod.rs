// tests/support/mod.rs
// ============================================================================
// Module: Test Support
// Description: Mock adapter and small graph-building helpers shared across
//              integration tests.
// ============================================================================
//! ## Overview
//! A configurable [`MockAdapter`] stands in for a real model-inference
//! backend: fixed confidence, usage, and output, so escalation tests can
//! assert exact stop reasons and event counts.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]
#![allow(dead_code, reason = "Shared test helpers are used unevenly across suites.")]

use std::sync::Mutex;

use kora::adapter::Adapter;
use kora::adapter::AdapterResult;
use kora::adapter::Usage;
use kora::cache::Clock;
use kora::error::AdapterError;
use kora::task_ir::Budget;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

/// A [`Clock`] whose time is set explicitly, for deterministic TTL tests.
pub struct ManualClock {
    seconds: Mutex<f64>,
}

impl ManualClock {
    /// Builds a manual clock starting at `seconds`.
    #[must_use]
    pub fn new(seconds: f64) -> Self {
        Self { seconds: Mutex::new(seconds) }
    }

    /// Advances the clock by `delta` seconds.
    pub fn advance(&self, delta: f64) {
        let mut guard = self.seconds.lock().expect("manual clock mutex poisoned");
        *guard += delta;
    }
}

impl Clock for ManualClock {
    fn now_seconds(&self) -> f64 {
        *self.seconds.lock().expect("manual clock mutex poisoned")
    }
}

/// A fixed-response adapter for deterministic escalation tests.
pub struct MockAdapter {
    /// Whether the mock reports success.
    pub ok: bool,
    /// Self-reported confidence, in `[0, 1]`.
    pub confidence: f64,
    /// Input tokens to report, when `Some`.
    pub tokens_in: Option<u64>,
    /// Output tokens to report, when `Some`.
    pub tokens_out: Option<u64>,
    /// Wall-clock milliseconds to report.
    pub time_ms: u64,
    /// Output payload to return on success.
    pub output: Value,
    /// Adapter name stamped into `meta.adapter`.
    pub name: String,
}

impl MockAdapter {
    /// Builds a mock adapter named `name` reporting `confidence` and the
    /// given `output`, with a fixed usage footprint.
    #[must_use]
    pub fn new(name: &str, confidence: f64, output: Value) -> Self {
        Self {
            ok: true,
            confidence,
            tokens_in: Some(10),
            tokens_out: Some(10),
            time_ms: 5,
            output,
            name: name.to_string(),
        }
    }

    /// Returns a copy reporting `ok: false` with `error` set.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.ok = false;
        self
    }
}

impl Adapter for MockAdapter {
    fn run(
        &self,
        _task_id: &str,
        _input: &Map<String, Value>,
        _budget: &Budget,
        _output_schema: &Value,
    ) -> Result<AdapterResult, AdapterError> {
        let mut meta = Map::new();
        meta.insert("adapter".to_string(), json!(self.name));
        meta.insert("confidence".to_string(), json!(self.confidence));

        Ok(AdapterResult {
            ok: self.ok,
            output: self.output.clone(),
            usage: Usage {
                tokens_in: self.tokens_in,
                tokens_out: self.tokens_out,
                time_ms: self.time_ms,
            },
            meta,
            error: if self.ok { None } else { Some("mock adapter failure".to_string()) },
        })
    }
}

/// Builds a minimal graph descriptor with a single `det` task.
#[must_use]
pub fn single_det_task_graph(handler: &str, args: Value) -> Value {
    json!({
        "graph_id": "g-det",
        "version": "0.1",
        "root": "t1",
        "tasks": [{
            "id": "t1",
            "type": "det_task",
            "run": {"kind": "det", "spec": {"handler": handler, "args": args}},
        }],
    })
}
