// src/executor.rs
// ============================================================================
// Module: Kora Executor
// Description: Per-task attempt loop, retry policy, skip logic, event
//              emission, stage timing accounting, and the deterministic
//              handler registry.
// Purpose: Walk the scheduler's linear order, dispatching each task to a
//          deterministic handler or the adaptive controller, gating
//          acceptance through the verifier.
// Dependencies: std::time, crate::{adapter, cache, controller, error,
//               scheduler, task_ir, verifier}
// ============================================================================

//! ## Overview
//! One event per deterministic-task attempt; one event per adapter
//! invocation for an llm task's escalation loop, plus an extra `VERIFY`
//! event when a controller-accepted output still fails verification. The
//! executor owns stage timing accounting and returns it alongside events,
//! outputs, and either a final output or a structured [`FailureContract`].

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::adapter::AdapterRegistry;
use crate::adapter::Usage;
use crate::cache::RetrievalCache;
use crate::controller::AdaptiveController;
use crate::error::AdapterError;
use crate::error::ControllerError;
use crate::error::ErrorTaxonomy;
use crate::error::FailureContract;
use crate::error::Stage;
use crate::scheduler::topo_sort;
use crate::task_ir::normalize_graph;
use crate::task_ir::validate_graph;
use crate::task_ir::OnFail;
use crate::task_ir::RunSpec;
use crate::task_ir::Task;
use crate::task_ir::TaskGraph;
use crate::verifier::verify_output;

// ============================================================================
// SECTION: Deterministic Handler Registry
// ============================================================================

/// Per-run scratch mapping threaded through deterministic handlers.
///
/// Handlers SHOULD treat this as opaque except for the `outputs` field,
/// which holds every prior task's recorded output keyed by task id.
#[derive(Debug, Default)]
pub struct Scratch {
    /// Prior task outputs, keyed by task id.
    pub outputs: BTreeMap<String, Value>,
    /// Handler-specific state (e.g. `flaky_once`'s per-task attempt counter).
    pub extra: Map<String, Value>,
}

/// A pure, named deterministic handler: `(task, state) -> output`.
pub type Handler = Box<dyn Fn(&Task, &mut Scratch) -> Result<Value, String> + Send + Sync>;

/// Registry of named deterministic handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Handler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry seeded with the built-in handlers named in the
    /// external interface contract: `echo`, `classify_simple`, `flaky_once`,
    /// `parse_request_constraints`, `quality_gate`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("echo", handle_echo);
        registry.register("classify_simple", handle_classify_simple);
        registry.register("flaky_once", handle_flaky_once);
        registry.register("parse_request_constraints", handle_parse_request_constraints);
        registry.register("quality_gate", handle_quality_gate);
        registry
    }

    /// Registers a handler under `name`, replacing any prior registration.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&Task, &mut Scratch) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    /// Resolves a handler by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }
}

fn task_input_str<'a>(task: &'a Task, key: &str) -> Option<&'a str> {
    task.input.get(key).and_then(Value::as_str)
}

fn det_arg_str<'a>(task: &'a Task, key: &str) -> Option<&'a str> {
    match &task.run {
        RunSpec::Det { spec } => spec.args.get(key).and_then(Value::as_str),
        RunSpec::Llm { .. } => None,
    }
}

fn handle_echo(task: &Task, _state: &mut Scratch) -> Result<Value, String> {
    let message = task_input_str(task, "message").or_else(|| det_arg_str(task, "message"));
    Ok(serde_json::json!({
        "status": "ok",
        "task_id": task.id,
        "message": message,
    }))
}

fn handle_classify_simple(task: &Task, _state: &mut Scratch) -> Result<Value, String> {
    let text = task_input_str(task, "text").or_else(|| det_arg_str(task, "text")).unwrap_or("");
    Ok(serde_json::json!({
        "status": "ok",
        "task_id": task.id,
        "is_simple": text.len() < 80,
        "text_len": text.len(),
    }))
}

fn handle_flaky_once(task: &Task, state: &mut Scratch) -> Result<Value, String> {
    let attempts = state
        .extra
        .entry("flaky_once_attempts")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(attempts) = attempts.as_object_mut() else {
        return Err("flaky_once: scratch state corrupted".to_string());
    };
    let count = attempts.get(&task.id).and_then(Value::as_u64).unwrap_or(0) + 1;
    attempts.insert(task.id.clone(), Value::from(count));

    if count == 1 {
        return Err("flaky_once: intentional fail".to_string());
    }

    Ok(serde_json::json!({
        "status": "ok",
        "task_id": task.id,
        "message": "recovered",
    }))
}

const TOPIC_VOCABULARY: &[&str] = &[
    "sales", "marketing", "engineering", "finance", "product", "research", "budget", "roadmap",
    "security", "onboarding",
];

fn handle_parse_request_constraints(task: &Task, _state: &mut Scratch) -> Result<Value, String> {
    let text = task_input_str(task, "text").or_else(|| det_arg_str(task, "text")).unwrap_or("");
    let lower = text.to_lowercase();

    let mut slide_count = 5_u64;
    let words: Vec<&str> = lower.split_whitespace().collect();
    for (index, word) in words.iter().enumerate() {
        if *word == "slide" || *word == "slides" {
            let candidate = index.checked_sub(1).and_then(|previous| words.get(previous));
            if let Some(count) = candidate.and_then(|token| token.parse::<u64>().ok()) {
                slide_count = count;
                break;
            }
        }
    }

    let mut topic_tags = Vec::new();
    for topic in TOPIC_VOCABULARY {
        if lower.contains(topic) {
            topic_tags.push((*topic).to_string());
        }
    }

    Ok(serde_json::json!({
        "status": "ok",
        "task_id": task.id,
        "slide_count": slide_count,
        "topic_tags": topic_tags,
    }))
}

fn handle_quality_gate(task: &Task, state: &mut Scratch) -> Result<Value, String> {
    let dep_id = det_arg_str(task, "dep")
        .map(ToString::to_string)
        .or_else(|| task.deps.first().cloned())
        .ok_or_else(|| "quality_gate: no dependency to inspect".to_string())?;
    let dep_output = state
        .outputs
        .get(&dep_id)
        .ok_or_else(|| format!("quality_gate: dependency '{dep_id}' has no recorded output"))?;

    let slide_count = dep_output.get("slide_count").and_then(Value::as_u64).unwrap_or(0);
    let has_tags = dep_output
        .get("topic_tags")
        .and_then(Value::as_array)
        .is_some_and(|tags| !tags.is_empty());

    let decision = if slide_count >= 1 && has_tags { "skip_full" } else { "run_full" };

    Ok(serde_json::json!({
        "status": "ok",
        "task_id": task.id,
        "decision": decision,
        "slide_count": slide_count,
    }))
}

// ============================================================================
// SECTION: Events and Run Result
// ============================================================================

/// Per-attempt or per-escalation-step outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// The attempt or invocation succeeded.
    Ok,
    /// The attempt or invocation failed.
    Fail,
}

/// A single recorded occurrence within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Task the event is attributed to.
    pub task_id: String,
    /// 1-based attempt number within the task's retry loop.
    pub attempt: u32,
    /// 0-based escalation step, for llm tasks.
    pub escalation_step: Option<u32>,
    /// Outcome of this attempt or invocation.
    pub status: EventStatus,
    /// Pipeline stage the event originated in.
    pub stage: Stage,
    /// Wall-clock milliseconds spent.
    pub time_ms: u64,
    /// Reported adapter usage, when applicable.
    pub usage: Option<Usage>,
    /// Adapter or controller metadata, when applicable.
    pub meta: Option<Map<String, Value>>,
    /// Structured failure, when `status = fail`.
    pub error: Option<FailureContract>,
    /// Set when an llm task was short-circuited by `skip_if`.
    pub skipped: Option<bool>,
}

/// Cumulative wall-clock seconds spent per pipeline stage across a run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageTimings {
    /// Time spent computing the schedule.
    pub scheduler_total_s: f64,
    /// Time spent in deterministic handlers.
    pub det_total_s: f64,
    /// Time spent in adapter invocations (including escalation).
    pub llm_total_s: f64,
    /// Time spent verifying outputs.
    pub verify_total_s: f64,
    /// Total wall-clock time for the run.
    pub overall_total_s: f64,
}

/// Result of executing a task graph end-to-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Whether the run completed without a terminal failure.
    pub ok: bool,
    /// The graph's id.
    pub graph_id: String,
    /// The scheduler's linear task order.
    pub order: Vec<String>,
    /// Every event recorded during the run, in execution order.
    pub events: Vec<Event>,
    /// Outputs recorded per task id.
    pub outputs: BTreeMap<String, Value>,
    /// The root task's output, or `None` on terminal failure.
    #[serde(rename = "final")]
    pub final_output: Option<Value>,
    /// Cumulative per-stage timing.
    pub stage_timings: StageTimings,
    /// The terminal failure, when `ok = false`.
    pub error: Option<FailureContract>,
}

// ============================================================================
// SECTION: Skip-if and Answer Normalization
// ============================================================================

/// Evaluates a `skip_if` predicate (`{path: "$.key", equals: value}`)
/// against every dependency's recorded output.
///
/// `path` is a single top-level key; a `$.` prefix is stripped if present
/// but no further segments are parsed.
fn skip_if_triggered(skip_if: &Value, deps: &[String], outputs: &BTreeMap<String, Value>) -> bool {
    let Some(predicate) = skip_if.as_object() else {
        return false;
    };
    let Some(path) = predicate.get("path").and_then(Value::as_str) else {
        return false;
    };
    let Some(expected) = predicate.get("equals") else {
        return false;
    };
    let key = path.strip_prefix("$.").unwrap_or(path);

    deps.iter().any(|dep| {
        outputs
            .get(dep)
            .and_then(Value::as_object)
            .and_then(|object| object.get(key))
            .is_some_and(|value| value == expected)
    })
}

/// Best-effort normalization: if `output.answer` is a string that parses as
/// a JSON object or array, replaces it with the parsed value in place.
fn normalize_answer(output: &mut Value) {
    let Some(object) = output.as_object_mut() else {
        return;
    };
    let Some(Value::String(raw)) = object.get("answer") else {
        return;
    };
    let Ok(parsed) = serde_json::from_str::<Value>(raw) else {
        return;
    };
    if parsed.is_object() || parsed.is_array() {
        object.insert("answer".to_string(), parsed);
    }
}

// ============================================================================
// SECTION: Failure Construction
// ============================================================================

fn handler_failure(task_id: &str, on_fail: OnFail, attempts_remain: bool, message: String) -> FailureContract {
    FailureContract::new(
        ErrorTaxonomy::DeterministicExecFailed,
        Stage::Deterministic,
        on_fail == OnFail::Retry && attempts_remain,
        false,
        message,
        Some(task_id.to_string()),
    )
}

fn verify_failure(
    task_id: &str,
    stage: Stage,
    on_fail: OnFail,
    attempts_remain: bool,
    message: String,
) -> FailureContract {
    FailureContract::new(
        ErrorTaxonomy::OutputSchemaInvalid,
        stage,
        on_fail == OnFail::Retry && attempts_remain,
        false,
        message,
        Some(task_id.to_string()),
    )
}

fn controller_failure(
    task_id: &str,
    on_fail: OnFail,
    attempts_remain: bool,
    err: &ControllerError,
) -> FailureContract {
    let (error_type, budget_breached) = match err {
        ControllerError::Adapter(AdapterError::TimedOut(_)) => (ErrorTaxonomy::BudgetBreach, true),
        _ => (ErrorTaxonomy::AdapterFailed, false),
    };
    FailureContract::new(
        error_type,
        Stage::Adapter,
        on_fail == OnFail::Retry && attempts_remain,
        budget_breached,
        err.to_string(),
        Some(task_id.to_string()),
    )
}

// ============================================================================
// SECTION: Run Entry Point
// ============================================================================

/// Normalizes, validates, schedules, and executes a task graph.
///
/// This is the crate's primary entry point. IR and scheduler failures are
/// reported the same way as executor-stage failures: `ok = false`, no
/// outputs, and a populated `error`.
#[must_use]
pub fn run_graph(
    graph: &TaskGraph,
    handlers: &HandlerRegistry,
    adapters: &AdapterRegistry,
    cache: Option<&RetrievalCache>,
) -> RunResult {
    let overall_start = Instant::now();
    let normalized = normalize_graph(graph);

    if let Err(err) = validate_graph(&normalized) {
        let error_type = if err.to_string().contains("verify.schema") {
            ErrorTaxonomy::InvalidTask
        } else {
            ErrorTaxonomy::DagInvalid
        };
        return failed_run(
            graph.graph_id.clone(),
            FailureContract::new(error_type, Stage::Ir, false, false, err.to_string(), None),
            overall_start,
        );
    }

    let scheduler_start = Instant::now();
    let order = match topo_sort(&normalized) {
        Ok(order) => order,
        Err(err) => {
            return failed_run(
                graph.graph_id.clone(),
                FailureContract::new(
                    ErrorTaxonomy::DagInvalid,
                    Stage::Scheduler,
                    false,
                    false,
                    err.to_string(),
                    None,
                ),
                overall_start,
            );
        }
    };
    let scheduler_total_s = scheduler_start.elapsed().as_secs_f64();

    let task_map = normalized.task_map();
    let mut outputs: BTreeMap<String, Value> = BTreeMap::new();
    let mut events: Vec<Event> = Vec::new();
    let mut scratch = Scratch::default();
    let mut det_total_s = 0.0_f64;
    let mut llm_total_s = 0.0_f64;
    let mut verify_total_s = 0.0_f64;
    let mut controller = AdaptiveController::new(adapters, cache);

    for task_id in &order {
        let Some(task) = task_map.get(task_id.as_str()).copied() else {
            continue;
        };
        scratch.outputs = outputs.clone();

        let budget = task.policy.budget.unwrap_or_default();
        let max_attempts = 1 + budget.max_retries;

        match &task.run {
            RunSpec::Det { spec } => {
                let mut attempt = 0_u32;
                loop {
                    attempt += 1;
                    let attempts_remain = attempt < max_attempts;
                    let started = Instant::now();

                    let Some(handler) = handlers.resolve(&spec.handler) else {
                        let failure = FailureContract::new(
                            ErrorTaxonomy::DeterministicExecFailed,
                            Stage::Deterministic,
                            false,
                            false,
                            format!("unknown deterministic handler: {}", spec.handler),
                            Some(task.id.clone()),
                        );
                        events.push(fail_event(task, attempt, Stage::Deterministic, 0, None, failure.clone()));
                        return failed_run_partial(
                            graph.graph_id.clone(),
                            order.clone(),
                            events,
                            outputs,
                            failure,
                            overall_start,
                            scheduler_total_s,
                            det_total_s,
                            llm_total_s,
                            verify_total_s,
                        );
                    };

                    let handler_result = handler(task, &mut scratch);
                    let handler_elapsed = started.elapsed();
                    det_total_s += handler_elapsed.as_secs_f64();

                    let mut output = match handler_result {
                        Ok(output) => output,
                        Err(message) => {
                            let time_ms = u64::try_from(handler_elapsed.as_millis()).unwrap_or(u64::MAX);
                            let failure =
                                handler_failure(&task.id, task.policy.on_fail, attempts_remain, message);
                            events.push(fail_event(task, attempt, Stage::Deterministic, time_ms, None, failure.clone()));
                            match retry_or_terminate(
                                task,
                                failure,
                                attempt,
                                max_attempts,
                                graph,
                                &order,
                                &mut events,
                                &outputs,
                                overall_start,
                                scheduler_total_s,
                                det_total_s,
                                llm_total_s,
                                verify_total_s,
                            ) {
                                ControlFlow::Retry => continue,
                                ControlFlow::Terminate(result) => return *result,
                            }
                        }
                    };

                    if let Some(verify) = &task.verify {
                        if verify.schema.is_some() {
                            let verify_started = Instant::now();
                            let verify_result = verify_output(task, &output);
                            verify_total_s += verify_started.elapsed().as_secs_f64();
                            if let Err(err) = verify_result {
                                let total_ms =
                                    u64::try_from((handler_elapsed + verify_started.elapsed()).as_millis())
                                        .unwrap_or(u64::MAX);
                                let failure = verify_failure(
                                    &task.id,
                                    Stage::Verify,
                                    task.policy.on_fail,
                                    attempts_remain,
                                    err.to_string(),
                                );
                                events.push(fail_event(task, attempt, Stage::Verify, total_ms, None, failure.clone()));
                                match retry_or_terminate(
                                    task,
                                    failure,
                                    attempt,
                                    max_attempts,
                                    graph,
                                    &order,
                                    &mut events,
                                    &outputs,
                                    overall_start,
                                    scheduler_total_s,
                                    det_total_s,
                                    llm_total_s,
                                    verify_total_s,
                                ) {
                                    ControlFlow::Retry => continue,
                                    ControlFlow::Terminate(result) => return *result,
                                }
                            }
                        }
                    }

                    let time_ms = u64::try_from(handler_elapsed.as_millis()).unwrap_or(u64::MAX);
                    events.push(Event {
                        task_id: task.id.clone(),
                        attempt,
                        escalation_step: None,
                        status: EventStatus::Ok,
                        stage: Stage::Deterministic,
                        time_ms,
                        usage: None,
                        meta: None,
                        error: None,
                        skipped: None,
                    });
                    normalize_answer(&mut output);
                    outputs.insert(task.id.clone(), output);
                    break;
                }
            }
            RunSpec::Llm { spec } => {
                if let Some(skip_if) = spec.input.get("skip_if") {
                    if skip_if_triggered(skip_if, &task.deps, &outputs) {
                        let stub = serde_json::json!({
                            "status": "ok",
                            "task_id": task.id,
                            "skipped": true,
                            "message": format!("Skipped task '{}' via skip_if", task.id),
                        });
                        events.push(Event {
                            task_id: task.id.clone(),
                            attempt: 1,
                            escalation_step: None,
                            status: EventStatus::Ok,
                            stage: Stage::Adapter,
                            time_ms: 0,
                            usage: None,
                            meta: None,
                            error: None,
                            skipped: Some(true),
                        });
                        outputs.insert(task.id.clone(), stub);
                        continue;
                    }
                }

                let resolved_policy =
                    task.policy.adaptive.clone().unwrap_or_default().resolved();
                let mut attempt = 0_u32;
                loop {
                    attempt += 1;
                    let attempts_remain = attempt < max_attempts;
                    let llm_started = Instant::now();
                    let run_result = controller.run(
                        &task.id,
                        &task.task_type,
                        &task.tags,
                        &spec.adapter,
                        &spec.input,
                        &budget,
                        &spec.output_schema,
                        &resolved_policy,
                    );
                    llm_total_s += llm_started.elapsed().as_secs_f64();

                    let outcome = match run_result {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            let failure = controller_failure(&task.id, task.policy.on_fail, attempts_remain, &err);
                            let time_ms =
                                u64::try_from(llm_started.elapsed().as_millis()).unwrap_or(u64::MAX);
                            events.push(fail_event(task, attempt, Stage::Adapter, time_ms, None, failure.clone()));
                            match retry_or_terminate(
                                task,
                                failure,
                                attempt,
                                max_attempts,
                                graph,
                                &order,
                                &mut events,
                                &outputs,
                                overall_start,
                                scheduler_total_s,
                                det_total_s,
                                llm_total_s,
                                verify_total_s,
                            ) {
                                ControlFlow::Retry => continue,
                                ControlFlow::Terminate(result) => return *result,
                            }
                        }
                    };

                    for invocation in &outcome.invocations {
                        events.push(Event {
                            task_id: task.id.clone(),
                            attempt,
                            escalation_step: Some(invocation.escalation_step),
                            status: EventStatus::Ok,
                            stage: Stage::Adapter,
                            time_ms: invocation.result.usage.time_ms,
                            usage: Some(invocation.result.usage),
                            meta: Some(invocation.result.meta.clone()),
                            error: None,
                            skipped: None,
                        });
                    }

                    let mut output = outcome.final_output;
                    normalize_answer(&mut output);

                    let verify_started = Instant::now();
                    let verify_result = verify_output(task, &output);
                    verify_total_s += verify_started.elapsed().as_secs_f64();

                    if let Err(err) = verify_result {
                        let time_ms = u64::try_from(verify_started.elapsed().as_millis()).unwrap_or(u64::MAX);
                        let failure = verify_failure(
                            &task.id,
                            Stage::Verify,
                            task.policy.on_fail,
                            attempts_remain,
                            err.to_string(),
                        );
                        events.push(fail_event(task, attempt, Stage::Verify, time_ms, None, failure.clone()));
                        match retry_or_terminate(
                            task,
                            failure,
                            attempt,
                            max_attempts,
                            graph,
                            &order,
                            &mut events,
                            &outputs,
                            overall_start,
                            scheduler_total_s,
                            det_total_s,
                            llm_total_s,
                            verify_total_s,
                        ) {
                            ControlFlow::Retry => continue,
                            ControlFlow::Terminate(result) => return *result,
                        }
                    }

                    outputs.insert(task.id.clone(), output);
                    break;
                }
            }
        }
    }

    let final_output = outputs.get(&graph.root).cloned();
    let overall_total_s = overall_start.elapsed().as_secs_f64();
    RunResult {
        ok: true,
        graph_id: graph.graph_id.clone(),
        order,
        events,
        outputs,
        final_output,
        stage_timings: StageTimings {
            scheduler_total_s,
            det_total_s,
            llm_total_s,
            verify_total_s,
            overall_total_s,
        },
        error: None,
    }
}

/// Outcome of the shared retry/terminate decision used by both dispatch
/// paths, so `on_fail` handling is expressed in exactly one place.
enum ControlFlow {
    Retry,
    Terminate(Box<RunResult>),
}

#[allow(clippy::too_many_arguments, reason = "threads the accumulated run state through a single decision point")]
fn retry_or_terminate(
    task: &Task,
    failure: FailureContract,
    attempt: u32,
    max_attempts: u32,
    graph: &TaskGraph,
    order: &[String],
    events: &mut Vec<Event>,
    outputs: &BTreeMap<String, Value>,
    overall_start: Instant,
    scheduler_total_s: f64,
    det_total_s: f64,
    llm_total_s: f64,
    verify_total_s: f64,
) -> ControlFlow {
    if task.policy.on_fail == OnFail::Retry && attempt < max_attempts {
        return ControlFlow::Retry;
    }

    let final_failure =
        if task.policy.on_fail == OnFail::Escalate { failure.into_escalate_required() } else { failure };

    ControlFlow::Terminate(Box::new(RunResult {
        ok: false,
        graph_id: graph.graph_id.clone(),
        order: order.to_vec(),
        events: std::mem::take(events),
        outputs: outputs.clone(),
        final_output: None,
        stage_timings: StageTimings {
            scheduler_total_s,
            det_total_s,
            llm_total_s,
            verify_total_s,
            overall_total_s: overall_start.elapsed().as_secs_f64(),
        },
        error: Some(final_failure),
    }))
}

fn fail_event(
    task: &Task,
    attempt: u32,
    stage: Stage,
    time_ms: u64,
    escalation_step: Option<u32>,
    failure: FailureContract,
) -> Event {
    Event {
        task_id: task.id.clone(),
        attempt,
        escalation_step,
        status: EventStatus::Fail,
        stage,
        time_ms,
        usage: None,
        meta: None,
        error: Some(failure),
        skipped: None,
    }
}

fn failed_run(graph_id: String, failure: FailureContract, overall_start: Instant) -> RunResult {
    RunResult {
        ok: false,
        graph_id,
        order: Vec::new(),
        events: Vec::new(),
        outputs: BTreeMap::new(),
        final_output: None,
        stage_timings: StageTimings {
            overall_total_s: overall_start.elapsed().as_secs_f64(),
            ..StageTimings::default()
        },
        error: Some(failure),
    }
}

#[allow(clippy::too_many_arguments, reason = "carries the accumulated run state into a terminal result")]
fn failed_run_partial(
    graph_id: String,
    order: Vec<String>,
    events: Vec<Event>,
    outputs: BTreeMap<String, Value>,
    failure: FailureContract,
    overall_start: Instant,
    scheduler_total_s: f64,
    det_total_s: f64,
    llm_total_s: f64,
    verify_total_s: f64,
) -> RunResult {
    RunResult {
        ok: false,
        graph_id,
        order,
        events,
        outputs,
        final_output: None,
        stage_timings: StageTimings {
            scheduler_total_s,
            det_total_s,
            llm_total_s,
            verify_total_s,
            overall_total_s: overall_start.elapsed().as_secs_f64(),
        },
        error: Some(failure),
    }
}

