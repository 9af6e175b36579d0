// src/telemetry.rs
// ============================================================================
// Module: Kora Telemetry
// Description: Event summarization, stage counters, cost projection, and a
//              human-readable markdown report renderer.
// Purpose: Turn a RunResult into the observability surface hosts fold into
//          their own logging/metrics pipeline.
// Dependencies: std::collections, crate::executor, crate::error
// ============================================================================

//! ## Overview
//! Derivation rules are adopted verbatim from the original summarizer: an
//! "llm call" is an `ADAPTER` event with `status=ok` and `skipped != true`.
//! This crate's [`RunResult`] is always fully populated, so summarization
//! always derives from the event stream rather than trusting a possibly
//! partial top-level field.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorTaxonomy;
use crate::error::FailureContract;
use crate::error::Stage;
use crate::executor::EventStatus;
use crate::executor::RunResult;

// ============================================================================
// SECTION: Summary
// ============================================================================

/// Structured telemetry summary derived from a [`RunResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySummary {
    /// Whether the run completed without a terminal failure.
    pub ok: bool,
    /// Sum of every event's `time_ms`.
    pub total_time_ms: u64,
    /// Count of `ADAPTER` events with `status=ok` and not skipped.
    pub total_llm_calls: u64,
    /// Sum of every event's reported `usage.tokens_in`.
    pub tokens_in: u64,
    /// Sum of every event's reported `usage.tokens_out`.
    pub tokens_out: u64,
    /// Count of events with `status=ok`.
    pub events_ok: u64,
    /// Count of events with `status=fail`.
    pub events_fail: u64,
    /// Count of events with `skipped=true`.
    pub events_skipped: u64,
    /// Event count keyed by pipeline stage.
    pub stage_counts: BTreeMap<String, u64>,
    /// Count of failures (top-level or per-event) with `budget_breached=true`.
    pub budget_breaches: u64,
    /// Count of failures (top-level or per-event) with `error_type=ESCALATE_REQUIRED`.
    pub escalation_required: u64,
    /// The run's terminal failure, when `ok = false`.
    pub error: Option<FailureContract>,
}

/// Derives a [`TelemetrySummary`] from a completed run.
#[must_use]
pub fn summarize_run(result: &RunResult) -> TelemetrySummary {
    let mut total_time_ms = 0_u64;
    let mut total_llm_calls = 0_u64;
    let mut tokens_in = 0_u64;
    let mut tokens_out = 0_u64;
    let mut events_ok = 0_u64;
    let mut events_fail = 0_u64;
    let mut events_skipped = 0_u64;
    let mut stage_counts: BTreeMap<String, u64> = BTreeMap::new();
    let mut budget_breaches = 0_u64;
    let mut escalation_required = 0_u64;

    for event in &result.events {
        total_time_ms += event.time_ms;
        *stage_counts.entry(event.stage.as_str().to_string()).or_insert(0) += 1;

        match event.status {
            EventStatus::Ok => events_ok += 1,
            EventStatus::Fail => events_fail += 1,
        }
        if event.skipped == Some(true) {
            events_skipped += 1;
        }
        if event.status == EventStatus::Ok && event.skipped != Some(true) && event.stage == Stage::Adapter {
            total_llm_calls += 1;
        }
        if let Some(usage) = event.usage {
            tokens_in += usage.tokens_in.unwrap_or(0);
            tokens_out += usage.tokens_out.unwrap_or(0);
        }
        if let Some(error) = &event.error {
            if error.budget_breached {
                budget_breaches += 1;
            }
            if error.error_type == ErrorTaxonomy::EscalateRequired {
                escalation_required += 1;
            }
        }
    }

    if let Some(error) = &result.error {
        if error.budget_breached {
            budget_breaches += 1;
        }
        if error.error_type == ErrorTaxonomy::EscalateRequired {
            escalation_required += 1;
        }
    }

    TelemetrySummary {
        ok: result.ok,
        total_time_ms,
        total_llm_calls,
        tokens_in,
        tokens_out,
        events_ok,
        events_fail,
        events_skipped,
        stage_counts,
        budget_breaches,
        escalation_required,
        error: result.error.clone(),
    }
}

/// Renders a human-readable markdown report from a [`TelemetrySummary`].
#[must_use]
pub fn render_markdown(summary: &TelemetrySummary, source_label: &str) -> String {
    let mut lines = vec![
        "# Telemetry Report".to_string(),
        String::new(),
        format!("Input: `{source_label}`"),
        String::new(),
        "## Summary".to_string(),
        String::new(),
        "| ok | total_time_ms | total_llm_calls | tokens_in | tokens_out |".to_string(),
        "|---|---:|---:|---:|---:|".to_string(),
        format!(
            "| {} | {} | {} | {} | {} |",
            summary.ok, summary.total_time_ms, summary.total_llm_calls, summary.tokens_in, summary.tokens_out
        ),
        String::new(),
        "## Events".to_string(),
        String::new(),
        format!("- events_ok: {}", summary.events_ok),
        format!("- events_fail: {}", summary.events_fail),
        format!("- events_skipped: {}", summary.events_skipped),
        String::new(),
        "## Stage Counts".to_string(),
        String::new(),
        "| stage | count |".to_string(),
        "|---|---:|".to_string(),
    ];

    if summary.stage_counts.is_empty() {
        lines.push("| (none) | 0 |".to_string());
    } else {
        for (stage, count) in &summary.stage_counts {
            lines.push(format!("| {stage} | {count} |"));
        }
    }

    lines.push(String::new());
    lines.push("## Policy Signals".to_string());
    lines.push(String::new());
    lines.push(format!("- budget_breaches: {}", summary.budget_breaches));
    lines.push(format!("- escalation_required: {}", summary.escalation_required));

    if !summary.ok {
        if let Some(error) = &summary.error {
            lines.push(String::new());
            lines.push("## Failure".to_string());
            lines.push(String::new());
            lines.push(format!("- error_type: {}", error.error_type.as_str()));
            lines.push(format!("- stage: {}", error.stage.as_str()));
            lines.push(format!("- details: {}", error.details));
            lines.push(format!("- task_id: {}", error.task_id.clone().unwrap_or_default()));
        }
    }

    lines.push(String::new());
    lines.join("\n")
}

// ============================================================================
// SECTION: Cost Model
// ============================================================================

/// Per-1k-token pricing for a model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    /// USD price per 1,000 input tokens.
    pub input_per_1k: f64,
    /// USD price per 1,000 output tokens.
    pub output_per_1k: f64,
}

/// Built-in model price table. Hosts needing other models pass explicit
/// override prices to [`estimate_cost`].
#[must_use]
pub fn model_pricing(model: &str) -> Option<ModelPricing> {
    match model {
        "gpt-4o-mini" => Some(ModelPricing { input_per_1k: 0.000_15, output_per_1k: 0.000_6 }),
        _ => None,
    }
}

/// Estimates USD cost for `tokens_in`/`tokens_out` against `model`'s price
/// table entry, or explicit overrides when provided.
#[must_use]
pub fn estimate_cost(
    model: &str,
    tokens_in: u64,
    tokens_out: u64,
    price_input: Option<f64>,
    price_output: Option<f64>,
) -> f64 {
    let pricing = model_pricing(model);
    let input_per_1k = price_input.or(pricing.map(|p| p.input_per_1k)).unwrap_or(0.0);
    let output_per_1k = price_output.or(pricing.map(|p| p.output_per_1k)).unwrap_or(0.0);

    let cost = (tokens_in as f64 / 1000.0) * input_per_1k + (tokens_out as f64 / 1000.0) * output_per_1k;
    (cost * 1e8).round() / 1e8
}

/// Absolute and percentage cost delta between a direct (unrouted) baseline
/// and a routed run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Savings {
    /// Baseline (unrouted) cost, in USD.
    pub direct_cost_usd: f64,
    /// Routed-run cost, in USD.
    pub kora_cost_usd: f64,
    /// `direct_cost_usd - kora_cost_usd`.
    pub savings_usd: f64,
    /// `savings_usd / direct_cost_usd * 100`, or `0.0` when the baseline is non-positive.
    pub savings_percent: f64,
}

/// Computes [`Savings`] between a direct-cost baseline and a routed-run cost.
#[must_use]
pub fn compute_savings(direct_cost: f64, kora_cost: f64) -> Savings {
    let savings = direct_cost - kora_cost;
    let savings_percent = if direct_cost <= 0.0 { 0.0 } else { (savings / direct_cost) * 100.0 };
    Savings {
        direct_cost_usd: (direct_cost * 1e8).round() / 1e8,
        kora_cost_usd: (kora_cost * 1e8).round() / 1e8,
        savings_usd: (savings * 1e8).round() / 1e8,
        savings_percent: (savings_percent * 1e4).round() / 1e4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StageTimings;

    fn ok_adapter_event(tokens_in: u64, tokens_out: u64) -> crate::executor::Event {
        crate::executor::Event {
            task_id: "t1".to_string(),
            attempt: 1,
            escalation_step: Some(0),
            status: EventStatus::Ok,
            stage: Stage::Adapter,
            time_ms: 42,
            usage: Some(crate::adapter::Usage {
                tokens_in: Some(tokens_in),
                tokens_out: Some(tokens_out),
                time_ms: 42,
            }),
            meta: None,
            error: None,
            skipped: None,
        }
    }

    #[test]
    fn summarize_counts_llm_calls_and_tokens() {
        let result = RunResult {
            ok: true,
            graph_id: "g".to_string(),
            order: vec!["t1".to_string()],
            events: vec![ok_adapter_event(10, 20)],
            outputs: BTreeMap::new(),
            final_output: None,
            stage_timings: StageTimings::default(),
            error: None,
        };
        let summary = summarize_run(&result);
        assert_eq!(summary.total_llm_calls, 1);
        assert_eq!(summary.tokens_in, 10);
        assert_eq!(summary.tokens_out, 20);
        assert_eq!(summary.events_ok, 1);
    }

    #[test]
    fn skipped_adapter_event_does_not_count_as_llm_call() {
        let mut event = ok_adapter_event(0, 0);
        event.skipped = Some(true);
        let result = RunResult {
            ok: true,
            graph_id: "g".to_string(),
            order: vec!["t1".to_string()],
            events: vec![event],
            outputs: BTreeMap::new(),
            final_output: None,
            stage_timings: StageTimings::default(),
            error: None,
        };
        let summary = summarize_run(&result);
        assert_eq!(summary.total_llm_calls, 0);
        assert_eq!(summary.events_skipped, 1);
    }

    #[test]
    fn estimate_cost_uses_builtin_pricing() {
        let cost = estimate_cost("gpt-4o-mini", 1000, 1000, None, None);
        assert!((cost - 0.000_75).abs() < 1e-9);
    }

    #[test]
    fn estimate_cost_honors_overrides() {
        let cost = estimate_cost("unknown-model", 1000, 1000, Some(1.0), Some(2.0));
        assert!((cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn compute_savings_handles_nonpositive_baseline() {
        let savings = compute_savings(0.0, 5.0);
        assert_eq!(savings.savings_percent, 0.0);
        assert!((savings.savings_usd - (-5.0)).abs() < 1e-9);
    }

    #[test]
    fn render_markdown_includes_failure_section_when_not_ok() {
        let summary = TelemetrySummary {
            ok: false,
            total_time_ms: 0,
            total_llm_calls: 0,
            tokens_in: 0,
            tokens_out: 0,
            events_ok: 0,
            events_fail: 1,
            events_skipped: 0,
            stage_counts: BTreeMap::new(),
            budget_breaches: 0,
            escalation_required: 0,
            error: Some(FailureContract::new(
                ErrorTaxonomy::OutputSchemaInvalid,
                Stage::Verify,
                false,
                false,
                "boom".to_string(),
                Some("t1".to_string()),
            )),
        };
        let report = render_markdown(&summary, "test");
        assert!(report.contains("## Failure"));
        assert!(report.contains("boom"));
    }
}
