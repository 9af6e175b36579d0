// src/error.rs
// ============================================================================
// Module: Kora Error Taxonomy
// Description: Structured failure contracts and per-module error enums.
// Purpose: Give every fallible boundary a typed error that converts into the
//          run-level FailureContract exactly once.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every module in this crate owns a `thiserror` error enum at the boundary
//! it is responsible for. [`KoraError`] aggregates them via `#[from]` so
//! callers deep in the executor can propagate with `?` all the way to the
//! run boundary, where it is converted into a [`FailureContract`] once.

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Stage and Taxonomy
// ============================================================================

/// Pipeline stage a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    /// Task IR parse/normalize/validate.
    Ir,
    /// Scheduler (cycle detection, topological order).
    Scheduler,
    /// Deterministic handler execution.
    Deterministic,
    /// Adapter invocation (including adaptive escalation).
    Adapter,
    /// Output verification.
    Verify,
    /// Budget enforcement.
    Budget,
    /// Stage could not be determined.
    Unknown,
}

impl Stage {
    /// Returns the wire-format name (matches the `UPPERCASE` serde rename).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ir => "IR",
            Self::Scheduler => "SCHEDULER",
            Self::Deterministic => "DETERMINISTIC",
            Self::Adapter => "ADAPTER",
            Self::Verify => "VERIFY",
            Self::Budget => "BUDGET",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Top-level error taxonomy surfaced in a [`FailureContract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorTaxonomy {
    /// A task failed IR validation.
    InvalidTask,
    /// The graph is not a valid DAG.
    DagInvalid,
    /// A deterministic handler raised an error.
    DeterministicExecFailed,
    /// An adapter invocation failed or timed out.
    AdapterFailed,
    /// Output failed schema or rule verification.
    OutputSchemaInvalid,
    /// A budget ceiling was breached.
    BudgetBreach,
    /// `on_fail = escalate` rewrote the failure for a human/escalation path.
    EscalateRequired,
    /// Uncategorized failure.
    Unknown,
}

impl ErrorTaxonomy {
    /// Returns the wire-format name (matches the `SCREAMING_SNAKE_CASE` serde rename).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidTask => "INVALID_TASK",
            Self::DagInvalid => "DAG_INVALID",
            Self::DeterministicExecFailed => "DETERMINISTIC_EXEC_FAILED",
            Self::AdapterFailed => "ADAPTER_FAILED",
            Self::OutputSchemaInvalid => "OUTPUT_SCHEMA_INVALID",
            Self::BudgetBreach => "BUDGET_BREACH",
            Self::EscalateRequired => "ESCALATE_REQUIRED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Structured failure surfaced at the run boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureContract {
    /// Taxonomy bucket for this failure.
    pub error_type: ErrorTaxonomy,
    /// Stage the failure originated in.
    pub stage: Stage,
    /// Whether the task's `on_fail` policy would retry this failure.
    pub retryable: bool,
    /// Whether a budget ceiling was breached.
    pub budget_breached: bool,
    /// Human-readable detail.
    pub details: String,
    /// Task the failure is attributed to, when known.
    pub task_id: Option<String>,
}

impl FailureContract {
    /// Builds a failure contract from its constituent fields.
    #[must_use]
    pub const fn new(
        error_type: ErrorTaxonomy,
        stage: Stage,
        retryable: bool,
        budget_breached: bool,
        details: String,
        task_id: Option<String>,
    ) -> Self {
        Self {
            error_type,
            stage,
            retryable,
            budget_breached,
            details,
            task_id,
        }
    }

    /// Rewrites the taxonomy to `ESCALATE_REQUIRED`, preserving stage and details.
    #[must_use]
    pub fn into_escalate_required(mut self) -> Self {
        self.error_type = ErrorTaxonomy::EscalateRequired;
        self
    }
}

// ============================================================================
// SECTION: Per-Module Errors
// ============================================================================

/// Errors raised while parsing, normalizing, or validating a task graph.
#[derive(Debug, Error)]
pub enum TaskIrError {
    /// The descriptor is not valid JSON or does not match the graph shape.
    #[error("failed to parse task graph: {0}")]
    Parse(String),
    /// `version` is not the supported pin.
    #[error("unsupported graph version: {0}")]
    UnsupportedVersion(String),
    /// A structural invariant of the graph was violated.
    #[error("invalid task graph: {0}")]
    Invalid(String),
}

/// Errors raised while scheduling a task graph.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A `deps` entry references an unknown task id.
    #[error("task '{0}' depends on unknown task '{1}'")]
    UnknownDependency(String, String),
    /// The graph is not acyclic.
    #[error("graph contains a cycle; cannot compute topological order")]
    Cycle,
}

/// Errors raised while verifying a task output.
#[derive(Debug, Error)]
pub enum VerifierError {
    /// No `verify.schema` is available for the task.
    #[error("task '{0}' missing verify.schema")]
    MissingSchema(String),
    /// The output schema itself could not be compiled.
    #[error("failed to compile output schema: {0}")]
    SchemaCompile(String),
    /// Output failed schema validation.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    /// A `required` rule found missing keys.
    #[error("required rule failed; missing keys: {0:?}")]
    RequiredRule(Vec<String>),
    /// A `range` rule's value was not numeric.
    #[error("range rule failed; '{0}' is not numeric")]
    RangeRuleNotNumeric(String),
    /// A `range` rule's value was outside `[min, max]`.
    #[error("range rule failed; {path}={value} outside [{min}, {max}]")]
    RangeRuleOutOfBounds {
        /// Field path that failed the rule.
        path: String,
        /// Observed value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

/// Errors raised by adapter invocation or registry resolution.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// No adapter is registered under the given name.
    #[error("no adapter registered for name: {0}")]
    NotFound(String),
    /// The adapter reported a failure via `AdapterResult.error`.
    #[error("adapter '{0}' reported failure: {1}")]
    Failed(String, String),
    /// The adapter did not return within its time budget.
    #[error("adapter '{0}' exceeded its time budget")]
    TimedOut(String),
}

/// Errors raised by the retrieval cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache's internal mutex was poisoned by a panicking holder.
    #[error("retrieval cache mutex poisoned")]
    Poisoned,
    /// The fingerprint input could not be canonicalized.
    #[error("failed to canonicalize cache key: {0}")]
    Canonicalization(String),
}

/// Errors raised by the adaptive escalation controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Wraps an adapter-level error encountered during escalation.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    /// Wraps a cache-level error encountered during gate-retrieval.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Errors raised by the executor's per-task attempt loop.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Wraps a scheduler-level error.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// Wraps a verifier-level error.
    #[error(transparent)]
    Verifier(#[from] VerifierError),
    /// Wraps a controller-level error.
    #[error(transparent)]
    Controller(#[from] ControllerError),
    /// A deterministic handler name has no registered implementation.
    #[error("unknown deterministic handler: {0}")]
    UnknownHandler(String),
    /// A deterministic handler raised an error.
    #[error("handler '{handler}' failed for task '{task_id}': {message}")]
    HandlerFailed {
        /// Handler name.
        handler: String,
        /// Task the handler ran for.
        task_id: String,
        /// Failure detail.
        message: String,
    },
    /// A task's `run.kind` did not match the dispatch path it reached.
    #[error("task '{0}' has unexpected run kind for this dispatch path")]
    WrongRunKind(String),
}

/// Aggregate error for the crate's public entry points.
#[derive(Debug, Error)]
pub enum KoraError {
    /// Wraps a task-IR-level error.
    #[error(transparent)]
    TaskIr(#[from] TaskIrError),
    /// Wraps a scheduler-level error.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// Wraps an executor-level error.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}
