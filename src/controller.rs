// src/controller.rs
// ============================================================================
// Module: Kora Adaptive Escalation Controller
// Description: Confidence/VoI/budget gates sequencing adapter escalation.
// Purpose: Escalate through progressively more expensive adapter stages only
//          when a stop test does not already justify halting.
// Dependencies: std::time, crate::adapter, crate::cache, crate::config,
//               crate::task_ir, crate::error
// ============================================================================

//! ## Overview
//! An explicit loop with named stop reasons (§9 design note), not exception
//! control flow: every early exit sets exactly one `stop_reason`. The loop
//! starts at the task's declared base adapter (`escalation_step = 0`) and
//! consults `escalation_order` left-to-right for subsequent steps.

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::adapter::AdapterRegistry;
use crate::adapter::AdapterResult;
use crate::adapter::Usage;
use crate::cache::RetrievalCache;
use crate::cache::fingerprint;
use crate::config::resolve_adapter_timeout_ms;
use crate::error::AdapterError;
use crate::error::ControllerError;
use crate::task_ir::Budget;
use crate::task_ir::ResolvedAdaptivePolicy;

/// One adapter invocation (or cache substitution) within an escalation run.
#[derive(Debug, Clone)]
pub struct AdapterInvocation {
    /// Zero-based escalation step; the base adapter call is step 0.
    pub escalation_step: u32,
    /// Name the invocation was resolved to (bare or stage-qualified).
    pub adapter_name: String,
    /// The invocation's result, with `meta` enriched by the controller.
    pub result: AdapterResult,
    /// Cost units charged against the running budget for this step.
    pub cost_units: f64,
}

/// Outcome of a full escalation run: every invocation made, plus the final
/// accepted output (the last invocation's output).
#[derive(Debug, Clone)]
pub struct ControllerOutcome {
    /// Every invocation made, in order.
    pub invocations: Vec<AdapterInvocation>,
    /// The final output, pending verification by the caller.
    pub final_output: Value,
}

/// Looks up a stage token's expected next-stage cost: explicit `stage_costs`
/// entry first, then the running EMA estimate, defaulting to 1.0.
fn expected_cost(
    stage_costs: &BTreeMap<String, f64>,
    ema_costs: &BTreeMap<String, f64>,
    token: Option<&str>,
) -> f64 {
    match token {
        None => 1.0,
        Some(token) => stage_costs
            .get(token)
            .copied()
            .or_else(|| ema_costs.get(token).copied())
            .unwrap_or(1.0),
    }
}

/// Adaptive escalation controller. Owns the cross-task EMA cost estimates
/// for a single run; the retrieval cache it consults is process-wide.
pub struct AdaptiveController<'a> {
    registry: &'a AdapterRegistry,
    cache: Option<&'a RetrievalCache>,
    ema_costs: BTreeMap<String, f64>,
}

impl<'a> AdaptiveController<'a> {
    /// Builds a controller bound to an adapter registry and an optional
    /// retrieval cache (absent when `enable_gate_retrieval` is never used).
    #[must_use]
    pub fn new(registry: &'a AdapterRegistry, cache: Option<&'a RetrievalCache>) -> Self {
        Self {
            registry,
            cache,
            ema_costs: BTreeMap::new(),
        }
    }

    /// Runs the escalation loop for a single llm task dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] when an adapter is not registered, an
    /// adapter invocation itself fails or times out, or the retrieval
    /// cache's fingerprint cannot be canonicalized.
    #[allow(clippy::too_many_arguments, reason = "mirrors the adapter contract's explicit parameter list")]
    pub fn run(
        &mut self,
        task_id: &str,
        task_type: &str,
        tags: &[String],
        base_adapter: &str,
        input: &Map<String, Value>,
        budget: &Budget,
        output_schema: &Value,
        policy: &ResolvedAdaptivePolicy,
    ) -> Result<ControllerOutcome, ControllerError> {
        let mut invocations = Vec::new();
        let mut spent_units = 0.0_f64;
        let budget_ceiling = if budget.max_tokens > 0 {
            budget.max_tokens as f64
        } else {
            budget.max_time_ms as f64
        };

        let mut current_adapter_name = base_adapter.to_string();
        let mut current_token: Option<String> = None;
        let mut step = 0_u32;

        loop {
            let adapter = self
                .registry
                .resolve(&current_adapter_name)
                .ok_or_else(|| AdapterError::NotFound(current_adapter_name.clone()))?;

            let timeout_ms = resolve_adapter_timeout_ms(budget.max_time_ms);
            let started = Instant::now();
            let mut result = adapter.run(task_id, input, budget, output_schema)?;
            let elapsed_ms: u64 = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            if elapsed_ms > timeout_ms {
                return Err(ControllerError::Adapter(AdapterError::TimedOut(current_adapter_name)));
            }
            if !result.ok {
                return Err(ControllerError::Adapter(AdapterError::Failed(
                    current_adapter_name,
                    result.error.unwrap_or_else(|| "adapter reported failure".to_string()),
                )));
            }

            let confidence = result
                .meta
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(1.0)
                .clamp(0.0, 1.0);
            let uncertainty = 1.0 - confidence;
            let cost_units = result.usage.cost_units();
            spent_units += cost_units;

            if let Some(token) = &current_token {
                let previous = self.ema_costs.get(token).copied().unwrap_or(cost_units);
                self.ema_costs.insert(token.clone(), 0.3 * cost_units + 0.7 * previous);
            }

            let next_token = policy.escalation_order.get(step as usize).cloned();
            let next_cost =
                expected_cost(&policy.stage_costs, &self.ema_costs, next_token.as_deref());

            let mut stop_reason: Option<&'static str> = None;
            if confidence >= policy.min_confidence_to_stop {
                stop_reason = Some("confident_enough");
            } else if policy.use_voi {
                let voi = uncertainty / next_cost.max(f64::EPSILON);
                if voi < policy.min_voi_to_escalate {
                    stop_reason = Some("voi_too_low");
                }
            }

            if stop_reason.is_none() && budget_ceiling - spent_units < next_cost {
                stop_reason = Some("budget_remaining_low");
            }

            let mut escalate_recommended = false;
            if stop_reason.is_none() {
                escalate_recommended = true;
                if step >= policy.max_escalations {
                    stop_reason = Some("max_escalations");
                } else {
                    match &next_token {
                        None => stop_reason = Some("escalation_adapter_missing"),
                        Some(token) => {
                            if self.registry.resolve_stage(base_adapter, token).is_none() {
                                stop_reason = Some("escalation_adapter_missing");
                            }
                        }
                    }
                }
            }

            result.meta.insert("confidence".to_string(), json!(confidence));
            result.meta.insert("uncertainty".to_string(), json!(uncertainty));
            result.meta.insert("cost_units".to_string(), json!(cost_units));
            result.meta.insert("escalate_recommended".to_string(), json!(escalate_recommended));
            if let Some(reason) = stop_reason {
                result.meta.insert("stop_reason".to_string(), json!(reason));
            }

            invocations.push(AdapterInvocation {
                escalation_step: step,
                adapter_name: current_adapter_name.clone(),
                result: result.clone(),
                cost_units,
            });

            if stop_reason.is_some() {
                return Ok(ControllerOutcome {
                    invocations,
                    final_output: result.output,
                });
            }

            // escalate_recommended is true here: next_token is Some and resolves.
            let token = next_token.unwrap_or_default();

            if policy.enable_gate_retrieval {
                if let Some(cache) = self.cache {
                    let payload = Value::Object(input.clone());
                    let key = fingerprint(task_type, &payload, tags)?;
                    if let Some(cached_output) = cache.get(&key)? {
                        let mut meta = Map::new();
                        meta.insert("adapter".to_string(), json!(current_adapter_name));
                        meta.insert("gate_retrieval_hit".to_string(), json!(true));
                        meta.insert("stop_reason".to_string(), json!("gate_retrieval_hit"));
                        let cache_result = AdapterResult {
                            ok: true,
                            output: cached_output,
                            usage: Usage::default(),
                            meta,
                            error: None,
                        };
                        step += 1;
                        invocations.push(AdapterInvocation {
                            escalation_step: step,
                            adapter_name: format!("{base_adapter}:{token}"),
                            result: cache_result.clone(),
                            cost_units: 0.0,
                        });
                        return Ok(ControllerOutcome {
                            invocations,
                            final_output: cache_result.output,
                        });
                    }
                }
            }

            let resolved_name = self
                .registry
                .resolve_stage_name(base_adapter, &token)
                .ok_or_else(|| AdapterError::NotFound(token.clone()))?;
            current_adapter_name = resolved_name;
            current_token = Some(token);
            step += 1;
        }
    }
}
