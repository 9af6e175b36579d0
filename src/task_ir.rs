// src/task_ir.rs
// ============================================================================
// Module: Kora Task IR
// Description: Typed graph schema, loader, normalizer, and static validator.
// Purpose: Parse a textual graph descriptor into a typed DAG, fill inherited
//          defaults, and reject structurally invalid graphs before scheduling.
// Dependencies: serde, serde_json, crate::error, crate::scheduler
// ============================================================================

//! ## Overview
//! A [`TaskGraph`] is immutable after `normalize` → `validate`. `run` and
//! verify `rule` variants are discriminated unions; unknown tags are
//! rejected at parse time by `serde`'s externally-tagged enum support,
//! never discovered later at execution time.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::error::TaskIrError;
use crate::scheduler::detect_cycle;

/// Graph version this runtime understands.
pub const SUPPORTED_VERSION: &str = "0.1";

// ============================================================================
// SECTION: Budget and Policy
// ============================================================================

/// Execution budget limits for a task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budget {
    /// Maximum wall-clock milliseconds for a single adapter invocation.
    pub max_time_ms: u64,
    /// Maximum combined input/output tokens for a single adapter invocation.
    pub max_tokens: u64,
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_time_ms: 1_500,
            max_tokens: 300,
            max_retries: 1,
        }
    }
}

/// Task failure disposition once an attempt is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnFail {
    /// Terminate the run immediately on the first failed attempt.
    #[default]
    Fail,
    /// Retry the task, if attempts remain; otherwise behaves like `fail`.
    Retry,
    /// Terminate the run and rewrite the error taxonomy to `ESCALATE_REQUIRED`.
    Escalate,
}

/// Adaptive routing profile selecting a table of field defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingProfile {
    /// Minimizes latency: disables VoI gating and self-consistency.
    Latency,
    /// Minimizes cost: moderate VoI floor, light self-consistency.
    Cost,
    /// Maximizes reliability: tighter confidence stop, more self-consistency.
    Reliability,
    /// Balanced defaults (the default profile).
    #[default]
    Balanced,
}

/// Retrieval gate matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Exact fingerprint match only.
    #[default]
    Exact,
}

fn default_escalation_order() -> Vec<String> {
    vec!["mini".to_string(), "gate".to_string(), "full".to_string()]
}

fn default_stage_costs() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("mini".to_string(), 1.0),
        ("gate".to_string(), 3.0),
        ("full".to_string(), 10.0),
    ])
}

const fn default_retrieval_ttl_seconds() -> u64 {
    300
}

const fn default_retrieval_max_entries() -> usize {
    1_000
}

const fn default_self_consistency_min_next_cost() -> f64 {
    200.0
}

const fn default_self_consistency_min_remaining_budget() -> f64 {
    500.0
}

/// Adaptive routing configuration for an llm task, as declared by a user.
///
/// Fields with a per-profile default table entry (see [`RoutingProfile`])
/// are `Option`: `None` means "not explicitly set, inherit from profile".
/// Call [`AdaptiveRoutingPolicy::resolved`] to materialize a fully-populated
/// [`ResolvedAdaptivePolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveRoutingPolicy {
    /// Selects the profile-default table used to fill unset fields below.
    pub routing_profile: RoutingProfile,
    /// Confidence threshold at or above which the controller stops escalating.
    pub min_confidence_to_stop: Option<f64>,
    /// VoI floor below which escalation is not justified.
    pub min_voi_to_escalate: Option<f64>,
    /// Maximum number of escalations (adapter switches) per attempt.
    pub max_escalations: Option<u32>,
    /// Ordered stage tokens consulted left-to-right after the base adapter.
    #[serde(default = "default_escalation_order")]
    pub escalation_order: Vec<String>,
    /// Expected cost of the *next* stage, keyed by stage token.
    #[serde(default = "default_stage_costs")]
    pub stage_costs: BTreeMap<String, f64>,
    /// Enables the value-of-information gate.
    pub use_voi: Option<bool>,
    /// Enables retrieval-cache consultation before high-cost escalation stages.
    pub enable_gate_retrieval: bool,
    /// Retrieval-gate matching strategy.
    pub retrieval_strategy: RetrievalStrategy,
    /// Retrieval cache TTL, in seconds, for entries this policy inserts.
    #[serde(default = "default_retrieval_ttl_seconds")]
    pub retrieval_ttl_seconds: u64,
    /// Retrieval cache capacity ceiling.
    #[serde(default = "default_retrieval_max_entries")]
    pub retrieval_max_entries: usize,
    /// Number of self-consistency samples to draw.
    pub self_consistency_samples: Option<u32>,
    /// Enables self-consistency sampling.
    pub self_consistency_enabled: Option<bool>,
    /// Token ceiling per self-consistency sample.
    pub self_consistency_max_tokens: Option<u32>,
    /// Minimum next-stage cost below which self-consistency is skipped.
    #[serde(default = "default_self_consistency_min_next_cost")]
    pub self_consistency_min_next_cost: f64,
    /// Minimum remaining budget below which self-consistency is skipped.
    #[serde(default = "default_self_consistency_min_remaining_budget")]
    pub self_consistency_min_remaining_budget: f64,
}

impl Default for AdaptiveRoutingPolicy {
    fn default() -> Self {
        Self {
            routing_profile: RoutingProfile::default(),
            min_confidence_to_stop: None,
            min_voi_to_escalate: None,
            max_escalations: None,
            escalation_order: default_escalation_order(),
            stage_costs: default_stage_costs(),
            use_voi: None,
            enable_gate_retrieval: false,
            retrieval_strategy: RetrievalStrategy::default(),
            retrieval_ttl_seconds: default_retrieval_ttl_seconds(),
            retrieval_max_entries: default_retrieval_max_entries(),
            self_consistency_samples: None,
            self_consistency_enabled: None,
            self_consistency_max_tokens: None,
            self_consistency_min_next_cost: default_self_consistency_min_next_cost(),
            self_consistency_min_remaining_budget: default_self_consistency_min_remaining_budget(),
        }
    }
}

/// Fully-resolved adaptive policy, every field filled from either the user
/// or the routing profile's default table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileDefaults {
    /// Profile default for `use_voi`.
    pub use_voi: bool,
    /// Profile default for `min_voi_to_escalate`.
    pub min_voi_to_escalate: f64,
    /// Profile default for `self_consistency_enabled`.
    pub self_consistency_enabled: bool,
    /// Profile default for `self_consistency_samples`.
    pub self_consistency_samples: u32,
    /// Profile default for `self_consistency_max_tokens`.
    pub self_consistency_max_tokens: u32,
    /// Profile default for `max_escalations`.
    pub max_escalations: u32,
    /// Profile default for `min_confidence_to_stop`.
    pub min_confidence_to_stop: f64,
}

const fn profile_defaults(profile: RoutingProfile) -> ProfileDefaults {
    match profile {
        RoutingProfile::Latency => ProfileDefaults {
            use_voi: false,
            min_voi_to_escalate: 0.2,
            self_consistency_enabled: false,
            self_consistency_samples: 2,
            self_consistency_max_tokens: 64,
            max_escalations: 0,
            min_confidence_to_stop: 0.75,
        },
        RoutingProfile::Cost => ProfileDefaults {
            use_voi: true,
            min_voi_to_escalate: 0.2,
            self_consistency_enabled: true,
            self_consistency_samples: 2,
            self_consistency_max_tokens: 64,
            max_escalations: 2,
            min_confidence_to_stop: 0.85,
        },
        RoutingProfile::Reliability => ProfileDefaults {
            use_voi: true,
            min_voi_to_escalate: 0.1,
            self_consistency_enabled: true,
            self_consistency_samples: 3,
            self_consistency_max_tokens: 96,
            max_escalations: 2,
            min_confidence_to_stop: 0.9,
        },
        RoutingProfile::Balanced => ProfileDefaults {
            use_voi: true,
            min_voi_to_escalate: 0.2,
            self_consistency_enabled: true,
            self_consistency_samples: 2,
            self_consistency_max_tokens: 64,
            max_escalations: 2,
            min_confidence_to_stop: 0.85,
        },
    }
}

/// Fully-resolved adaptive policy: every profile-defaulted field has a
/// concrete value, per [`AdaptiveRoutingPolicy::resolved`].
#[derive(Debug, Clone)]
pub struct ResolvedAdaptivePolicy {
    /// See [`AdaptiveRoutingPolicy::min_confidence_to_stop`].
    pub min_confidence_to_stop: f64,
    /// See [`AdaptiveRoutingPolicy::min_voi_to_escalate`].
    pub min_voi_to_escalate: f64,
    /// See [`AdaptiveRoutingPolicy::max_escalations`].
    pub max_escalations: u32,
    /// See [`AdaptiveRoutingPolicy::escalation_order`].
    pub escalation_order: Vec<String>,
    /// See [`AdaptiveRoutingPolicy::stage_costs`].
    pub stage_costs: BTreeMap<String, f64>,
    /// See [`AdaptiveRoutingPolicy::use_voi`].
    pub use_voi: bool,
    /// See [`AdaptiveRoutingPolicy::enable_gate_retrieval`].
    pub enable_gate_retrieval: bool,
    /// See [`AdaptiveRoutingPolicy::retrieval_strategy`].
    pub retrieval_strategy: RetrievalStrategy,
    /// See [`AdaptiveRoutingPolicy::retrieval_ttl_seconds`].
    pub retrieval_ttl_seconds: u64,
    /// See [`AdaptiveRoutingPolicy::retrieval_max_entries`].
    pub retrieval_max_entries: usize,
    /// See [`AdaptiveRoutingPolicy::self_consistency_samples`].
    pub self_consistency_samples: u32,
    /// See [`AdaptiveRoutingPolicy::self_consistency_enabled`].
    pub self_consistency_enabled: bool,
    /// See [`AdaptiveRoutingPolicy::self_consistency_max_tokens`].
    pub self_consistency_max_tokens: u32,
    /// See [`AdaptiveRoutingPolicy::self_consistency_min_next_cost`].
    pub self_consistency_min_next_cost: f64,
    /// See [`AdaptiveRoutingPolicy::self_consistency_min_remaining_budget`].
    pub self_consistency_min_remaining_budget: f64,
}

impl AdaptiveRoutingPolicy {
    /// Fills every unset field from the routing profile's default table.
    #[must_use]
    pub fn resolved(&self) -> ResolvedAdaptivePolicy {
        let defaults = profile_defaults(self.routing_profile);
        ResolvedAdaptivePolicy {
            min_confidence_to_stop: self
                .min_confidence_to_stop
                .unwrap_or(defaults.min_confidence_to_stop),
            min_voi_to_escalate: self
                .min_voi_to_escalate
                .unwrap_or(defaults.min_voi_to_escalate),
            max_escalations: self.max_escalations.unwrap_or(defaults.max_escalations),
            escalation_order: self.escalation_order.clone(),
            stage_costs: self.stage_costs.clone(),
            use_voi: self.use_voi.unwrap_or(defaults.use_voi),
            enable_gate_retrieval: self.enable_gate_retrieval,
            retrieval_strategy: self.retrieval_strategy,
            retrieval_ttl_seconds: self.retrieval_ttl_seconds,
            retrieval_max_entries: self.retrieval_max_entries,
            self_consistency_samples: self
                .self_consistency_samples
                .unwrap_or(defaults.self_consistency_samples),
            self_consistency_enabled: self
                .self_consistency_enabled
                .unwrap_or(defaults.self_consistency_enabled),
            self_consistency_max_tokens: self
                .self_consistency_max_tokens
                .unwrap_or(defaults.self_consistency_max_tokens),
            self_consistency_min_next_cost: self.self_consistency_min_next_cost,
            self_consistency_min_remaining_budget: self.self_consistency_min_remaining_budget,
        }
    }
}

/// Task execution policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Budget override; inherited from `defaults.budget` during normalization when absent.
    pub budget: Option<Budget>,
    /// Disposition once attempts are exhausted.
    pub on_fail: OnFail,
    /// Adaptive routing configuration, relevant for llm tasks.
    pub adaptive: Option<AdaptiveRoutingPolicy>,
}

// ============================================================================
// SECTION: Verify
// ============================================================================

/// A single verification rule, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerifyRule {
    /// Each listed top-level key must be present in the output.
    Required {
        /// Keys that must be present.
        paths: Vec<String>,
    },
    /// A top-level numeric key must fall within `[min, max]`, if present.
    Range {
        /// Key to check.
        path: String,
        /// Lower bound, inclusive.
        min: f64,
        /// Upper bound, inclusive.
        max: f64,
    },
}

/// Verification settings for a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySpec {
    /// JSON-Schema the output must satisfy.
    pub schema: Option<Value>,
    /// Additional rules evaluated in order after schema validation.
    pub rules: Vec<VerifyRule>,
}

// ============================================================================
// SECTION: Run Variants
// ============================================================================

/// Spec for a deterministic handler dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDetSpec {
    /// Name of the registered deterministic handler.
    pub handler: String,
    /// Arguments passed through to the handler.
    pub args: Map<String, Value>,
}

/// Spec for an adapter-backed (llm) dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunLlmSpec {
    /// Name of the base adapter to invoke.
    pub adapter: String,
    /// Input payload passed to the adapter; may include a `skip_if` key.
    pub input: Map<String, Value>,
    /// JSON-Schema the adapter's output must satisfy.
    pub output_schema: Value,
}

/// Run dispatch, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunSpec {
    /// Dispatch to a named deterministic handler.
    Det {
        /// Handler spec.
        spec: RunDetSpec,
    },
    /// Dispatch to a named adapter, under the adaptive controller.
    Llm {
        /// Adapter spec.
        spec: RunLlmSpec,
    },
}

// ============================================================================
// SECTION: Task and Graph
// ============================================================================

/// A single node in the task graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id within the graph.
    pub id: String,
    /// Free-form category string used for cache fingerprinting and routing.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Dependency task ids. Order does not affect correctness.
    #[serde(default)]
    pub deps: Vec<String>,
    /// Free-form input mapping.
    #[serde(rename = "in", default)]
    pub input: Map<String, Value>,
    /// Dispatch variant.
    pub run: RunSpec,
    /// Verification settings.
    pub verify: Option<VerifySpec>,
    /// Execution policy.
    #[serde(default)]
    pub policy: Policy,
    /// Free-form tags, folded into the cache fingerprint when non-empty.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Graph-level inherited defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphDefaults {
    /// Budget inherited by tasks that do not declare their own.
    pub budget: Budget,
}

/// Root task graph descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGraph {
    /// Host-assigned graph identifier.
    pub graph_id: String,
    /// Graph schema version; must equal [`SUPPORTED_VERSION`].
    pub version: String,
    /// Id of the task whose output is the graph's final output.
    pub root: String,
    /// Graph-level inherited defaults.
    #[serde(default)]
    pub defaults: GraphDefaults,
    /// Task nodes. Must be non-empty.
    pub tasks: Vec<Task>,
}

impl TaskGraph {
    /// Parses a graph from a raw JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`TaskIrError::Parse`] on malformed JSON or a shape mismatch,
    /// [`TaskIrError::UnsupportedVersion`] when `version` is not
    /// [`SUPPORTED_VERSION`], and [`TaskIrError::Invalid`] when `tasks` is
    /// empty.
    pub fn from_json(raw: &str) -> Result<Self, TaskIrError> {
        let graph: Self =
            serde_json::from_str(raw).map_err(|err| TaskIrError::Parse(err.to_string()))?;
        if graph.version != SUPPORTED_VERSION {
            return Err(TaskIrError::UnsupportedVersion(graph.version));
        }
        if graph.tasks.is_empty() {
            return Err(TaskIrError::Invalid(
                "tasks must contain at least one task".to_string(),
            ));
        }
        Ok(graph)
    }

    /// Builds an id-to-task map. Later tasks win on duplicate ids; use
    /// [`validate`] to reject duplicates explicitly.
    #[must_use]
    pub fn task_map(&self) -> BTreeMap<&str, &Task> {
        self.tasks.iter().map(|task| (task.id.as_str(), task)).collect()
    }
}

// ============================================================================
// SECTION: Normalize
// ============================================================================

/// Applies inherited defaults and llm verify-schema inheritance, returning a
/// deep copy. Idempotent: `normalize(normalize(g)) == normalize(g)`.
#[must_use]
pub fn normalize_graph(graph: &TaskGraph) -> TaskGraph {
    let mut normalized = graph.clone();
    let default_budget = normalized.defaults.budget;

    for task in &mut normalized.tasks {
        if task.policy.budget.is_none() {
            task.policy.budget = Some(default_budget);
        }

        if let RunSpec::Llm { spec } = &task.run {
            match &mut task.verify {
                None => {
                    task.verify = Some(VerifySpec {
                        schema: Some(spec.output_schema.clone()),
                        rules: Vec::new(),
                    });
                }
                Some(verify) if verify.schema.is_none() => {
                    verify.schema = Some(spec.output_schema.clone());
                }
                Some(_) => {}
            }
        }
    }

    normalized
}

// ============================================================================
// SECTION: Validate
// ============================================================================

/// Validates task references and DAG constraints on an already-normalized
/// graph.
///
/// Checks run, in order: duplicate task ids; `root` existence; every `deps`
/// reference resolves; every llm task has `verify.schema` after
/// normalization; the graph is acyclic.
///
/// # Errors
///
/// Returns [`TaskIrError::Invalid`] describing the first violation found, in
/// the order above.
pub fn validate_graph(graph: &TaskGraph) -> Result<(), TaskIrError> {
    let mut task_map: BTreeMap<&str, &Task> = BTreeMap::new();
    for task in &graph.tasks {
        if task_map.insert(task.id.as_str(), task).is_some() {
            return Err(TaskIrError::Invalid(format!("duplicate task id: {}", task.id)));
        }
    }

    if !task_map.contains_key(graph.root.as_str()) {
        return Err(TaskIrError::Invalid(format!(
            "root task not found: {}",
            graph.root
        )));
    }

    for task in &graph.tasks {
        for dep in &task.deps {
            if !task_map.contains_key(dep.as_str()) {
                return Err(TaskIrError::Invalid(format!(
                    "task '{}' depends on unknown task '{dep}'",
                    task.id
                )));
            }
        }

        if let RunSpec::Llm { .. } = &task.run {
            let has_schema = task
                .verify
                .as_ref()
                .is_some_and(|verify| verify.schema.is_some());
            if !has_schema {
                return Err(TaskIrError::Invalid(format!(
                    "llm task '{}' must include verify.schema (directly or via normalization)",
                    task.id
                )));
            }
        }
    }

    if detect_cycle(graph) {
        return Err(TaskIrError::Invalid(
            "graph contains cycle; task graph must be a DAG".to_string(),
        ));
    }

    Ok(())
}
