// src/lib.rs
// ============================================================================
// Module: Kora Library
// Description: Public API surface for the task-graph execution runtime.
// Purpose: Expose the task IR, scheduler, verifier, adapter contract,
//          retrieval cache, adaptive controller, executor, and telemetry.
// Dependencies: crate::{task_ir, scheduler, verifier, adapter, cache,
//               controller, executor, telemetry, error, config}
// ============================================================================

//! ## Overview
//! Kora coordinates a mixed workload of deterministic compute steps and
//! external model-inference steps, organized as a directed acyclic graph of
//! typed tasks. A graph is parsed, normalized, and validated (see
//! [`task_ir`]); the [`scheduler`] linearizes it deterministically; the
//! [`executor`] walks that order, dispatching each task to a deterministic
//! handler or, for `llm` tasks, the [`controller`]'s adaptive escalation
//! loop, gated by the [`verifier`]. [`telemetry`] turns a finished run into
//! a structured summary and a markdown report.
//!
//! ```
//! use kora::adapter::AdapterRegistry;
//! use kora::cache::RetrievalCache;
//! use kora::executor::HandlerRegistry;
//! use kora::executor::run_graph;
//! use kora::task_ir::TaskGraph;
//!
//! let descriptor = serde_json::json!({
//!     "graph_id": "hello",
//!     "version": "0.1",
//!     "root": "say_hello",
//!     "tasks": [{
//!         "id": "say_hello",
//!         "type": "greeting",
//!         "run": {"kind": "det", "spec": {"handler": "echo", "args": {"message": "hi"}}},
//!     }],
//! });
//! let graph: TaskGraph = serde_json::from_value(descriptor).expect("valid descriptor");
//! let handlers = HandlerRegistry::with_builtins();
//! let adapters = AdapterRegistry::new();
//! let cache = RetrievalCache::with_system_clock(1_000);
//! let result = run_graph(&graph, &handlers, &adapters, Some(&cache));
//! assert!(result.ok);
//! ```

pub mod adapter;
pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod task_ir;
pub mod telemetry;
pub mod verifier;

pub use adapter::Adapter;
pub use adapter::AdapterRegistry;
pub use adapter::AdapterResult;
pub use cache::RetrievalCache;
pub use error::ErrorTaxonomy;
pub use error::FailureContract;
pub use error::KoraError;
pub use error::Stage;
pub use executor::Event;
pub use executor::HandlerRegistry;
pub use executor::RunResult;
pub use executor::run_graph;
pub use task_ir::TaskGraph;
pub use telemetry::TelemetrySummary;
pub use telemetry::summarize_run;
