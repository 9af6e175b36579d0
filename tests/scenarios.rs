// tests/scenarios.rs
// ============================================================================
// Module: End-to-End Scenario Tests
// Description: Scenarios S1-S6 from the runtime's testable-properties
//              section: echo, skip-if, retry recovery, terminal schema
//              failure, and adaptive escalation (confident-enough / VoI).
// ============================================================================
//! ## Overview
//! Each scenario pins a specific event count and terminal shape so a
//! regression in the executor's attempt loop or the adaptive controller's
//! stop tests is caught exactly, not just "the run still succeeds".

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

mod support;

use kora::adapter::AdapterRegistry;
use kora::cache::RetrievalCache;
use kora::error::ErrorTaxonomy;
use kora::error::Stage;
use kora::executor::HandlerRegistry;
use kora::executor::run_graph;
use kora::task_ir::TaskGraph;

use serde_json::Value;
use serde_json::json;

fn graph_from(descriptor: Value) -> TaskGraph {
    serde_json::from_value(descriptor).expect("descriptor matches TaskGraph schema")
}

#[test]
fn s1_hello_echo() {
    let descriptor = json!({
        "graph_id": "s1",
        "version": "0.1",
        "root": "say_hello",
        "tasks": [{
            "id": "say_hello",
            "type": "greeting",
            "in": {"message": "hello from kora"},
            "run": {"kind": "det", "spec": {"handler": "echo", "args": {}}},
        }],
    });

    let handlers = HandlerRegistry::with_builtins();
    let adapters = AdapterRegistry::new();
    let result = run_graph(&graph_from(descriptor), &handlers, &adapters, None);

    assert!(result.ok);
    let final_output = result.final_output.expect("final output present on success");
    assert_eq!(final_output.get("message").and_then(Value::as_str), Some("hello from kora"));
    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].stage, Stage::Deterministic);
}

#[test]
fn s2_skip_on_classifier() {
    let descriptor = json!({
        "graph_id": "s2",
        "version": "0.1",
        "root": "task_llm",
        "tasks": [
            {
                "id": "task_pre",
                "type": "classify",
                "in": {"text": "short"},
                "run": {"kind": "det", "spec": {"handler": "classify_simple", "args": {}}},
            },
            {
                "id": "task_llm",
                "type": "summarize",
                "deps": ["task_pre"],
                "run": {
                    "kind": "llm",
                    "spec": {
                        "adapter": "mock",
                        "input": {"skip_if": {"path": "$.is_simple", "equals": true}},
                        "output_schema": {"type": "object"},
                    },
                },
            },
        ],
    });

    let handlers = HandlerRegistry::with_builtins();
    let adapters = AdapterRegistry::new();
    let result = run_graph(&graph_from(descriptor), &handlers, &adapters, None);

    assert!(result.ok);
    let llm_event = result
        .events
        .iter()
        .find(|event| event.task_id == "task_llm")
        .expect("task_llm emitted an event");
    assert_eq!(llm_event.skipped, Some(true));
    assert!(llm_event.usage.is_none());

    let llm_output = result.outputs.get("task_llm").expect("task_llm output recorded");
    assert_eq!(llm_output.get("skipped").and_then(Value::as_bool), Some(true));
}

#[test]
fn s3_retry_recovery() {
    let descriptor = json!({
        "graph_id": "s3",
        "version": "0.1",
        "root": "flaky",
        "tasks": [{
            "id": "flaky",
            "type": "flaky_task",
            "policy": {"on_fail": "retry", "budget": {"max_time_ms": 1000, "max_tokens": 100, "max_retries": 1}},
            "run": {"kind": "det", "spec": {"handler": "flaky_once", "args": {}}},
        }],
    });

    let handlers = HandlerRegistry::with_builtins();
    let adapters = AdapterRegistry::new();
    let result = run_graph(&graph_from(descriptor), &handlers, &adapters, None);

    assert!(result.ok);
    assert_eq!(result.events.len(), 2);
    assert_eq!(result.events[0].attempt, 1);
    assert_eq!(result.events[0].status, kora::executor::EventStatus::Fail);
    assert_eq!(result.events[1].attempt, 2);
    assert_eq!(result.events[1].status, kora::executor::EventStatus::Ok);
}

#[test]
fn s4_schema_failure_is_terminal() {
    let descriptor = json!({
        "graph_id": "s4",
        "version": "0.1",
        "root": "say_hello",
        "tasks": [{
            "id": "say_hello",
            "type": "greeting",
            "in": {"message": "hello"},
            "verify": {"schema": {"type": "object", "required": ["must_exist"]}},
            "run": {"kind": "det", "spec": {"handler": "echo", "args": {}}},
        }],
    });

    let handlers = HandlerRegistry::with_builtins();
    let adapters = AdapterRegistry::new();
    let result = run_graph(&graph_from(descriptor), &handlers, &adapters, None);

    assert!(!result.ok);
    let error = result.error.expect("terminal failure populated");
    assert_eq!(error.error_type, ErrorTaxonomy::OutputSchemaInvalid);
    assert_eq!(error.stage, Stage::Verify);
}

#[test]
fn s5_adaptive_escalation_to_confident_enough() {
    let descriptor = json!({
        "graph_id": "s5",
        "version": "0.1",
        "root": "answer",
        "tasks": [{
            "id": "answer",
            "type": "qa",
            "run": {
                "kind": "llm",
                "spec": {
                    "adapter": "mock_mini",
                    "input": {"question": "what"},
                    "output_schema": {"type": "object"},
                },
            },
            "policy": {
                "adaptive": {
                    "use_voi": false,
                    "min_confidence_to_stop": 0.85,
                    "escalation_order": ["gate", "full"],
                    "max_escalations": 2,
                },
            },
        }],
    });

    let mut adapters = AdapterRegistry::new();
    adapters.register("mock_mini", support::MockAdapter::new("mock_mini", 0.1, json!({"answer": "a"})));
    adapters.register("mock_mini:gate", support::MockAdapter::new("mock_mini:gate", 0.2, json!({"answer": "b"})));
    adapters.register("mock_mini:full", support::MockAdapter::new("mock_mini:full", 0.95, json!({"answer": "c"})));

    let handlers = HandlerRegistry::with_builtins();
    let result = run_graph(&graph_from(descriptor), &handlers, &adapters, None);

    assert!(result.ok);
    let adapter_events: Vec<_> = result.events.iter().filter(|event| event.stage == Stage::Adapter).collect();
    assert_eq!(adapter_events.len(), 3);
    assert_eq!(adapter_events[0].escalation_step, Some(0));
    assert_eq!(adapter_events[1].escalation_step, Some(1));
    assert_eq!(adapter_events[2].escalation_step, Some(2));

    let final_meta = adapter_events[2].meta.as_ref().expect("meta present");
    assert_eq!(final_meta.get("stop_reason").and_then(Value::as_str), Some("confident_enough"));
}

#[test]
fn s6_voi_gate_blocks_escalation() {
    let descriptor = json!({
        "graph_id": "s6",
        "version": "0.1",
        "root": "answer",
        "tasks": [{
            "id": "answer",
            "type": "qa",
            "run": {
                "kind": "llm",
                "spec": {
                    "adapter": "mock_mini",
                    "input": {"question": "what"},
                    "output_schema": {"type": "object"},
                },
            },
            "policy": {
                "adaptive": {
                    "use_voi": true,
                    "min_voi_to_escalate": 0.2,
                    "escalation_order": ["full"],
                    "stage_costs": {"full": 10.0},
                    "max_escalations": 2,
                },
            },
        }],
    });

    let mut adapters = AdapterRegistry::new();
    adapters.register("mock_mini", support::MockAdapter::new("mock_mini", 0.1, json!({"answer": "a"})));
    adapters.register("mock_mini:full", support::MockAdapter::new("mock_mini:full", 0.95, json!({"answer": "c"})));

    let handlers = HandlerRegistry::with_builtins();
    let result = run_graph(&graph_from(descriptor), &handlers, &adapters, None);

    assert!(result.ok);
    let adapter_events: Vec<_> = result.events.iter().filter(|event| event.stage == Stage::Adapter).collect();
    assert_eq!(adapter_events.len(), 1);
    let meta = adapter_events[0].meta.as_ref().expect("meta present");
    assert_eq!(meta.get("stop_reason").and_then(Value::as_str), Some("voi_too_low"));
}

#[test]
fn retrieval_cache_is_accepted_without_use() {
    // Sanity check that a cache can be threaded through a run that never
    // triggers gate retrieval (enable_gate_retrieval defaults to false).
    let cache = RetrievalCache::with_system_clock(10);
    let descriptor = json!({
        "graph_id": "s1-with-cache",
        "version": "0.1",
        "root": "say_hello",
        "tasks": [{
            "id": "say_hello",
            "type": "greeting",
            "in": {"message": "hi"},
            "run": {"kind": "det", "spec": {"handler": "echo", "args": {}}},
        }],
    });
    let handlers = HandlerRegistry::with_builtins();
    let adapters = AdapterRegistry::new();
    let result = run_graph(&graph_from(descriptor), &handlers, &adapters, Some(&cache));
    assert!(result.ok);
}
