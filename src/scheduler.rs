// src/scheduler.rs
// ============================================================================
// Module: Kora Scheduler
// Description: Cycle detection and deterministic topological linearization.
// Purpose: Produce a total order consistent with `deps`, breaking ties by
//          ascending task id so runs are reproducible across processes.
// Dependencies: crate::task_ir, crate::error
// ============================================================================

//! ## Overview
//! Kahn's algorithm over the task graph's dependency relation. Both the
//! initial zero-in-degree frontier and each node's outgoing-edge relaxation
//! set are visited in sorted order, so the resulting order is stable
//! regardless of the input's task declaration order.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::VecDeque;

use crate::error::SchedulerError;
use crate::task_ir::TaskGraph;

/// Builds the dependent-edge adjacency and in-degree tables for a graph.
///
/// # Errors
///
/// Returns [`SchedulerError::UnknownDependency`] if any `deps` entry refers
/// to a task id not present in the graph.
fn build_edges(
    graph: &TaskGraph,
) -> Result<(BTreeMap<&str, u32>, BTreeMap<&str, BTreeSet<&str>>), SchedulerError> {
    let mut in_degree: BTreeMap<&str, u32> =
        graph.tasks.iter().map(|task| (task.id.as_str(), 0)).collect();
    let mut dependents: BTreeMap<&str, BTreeSet<&str>> =
        graph.tasks.iter().map(|task| (task.id.as_str(), BTreeSet::new())).collect();

    for task in &graph.tasks {
        for dep in &task.deps {
            let dep = dep.as_str();
            if !in_degree.contains_key(dep) {
                return Err(SchedulerError::UnknownDependency(
                    task.id.clone(),
                    dep.to_string(),
                ));
            }
            if let Some(degree) = in_degree.get_mut(task.id.as_str()) {
                *degree += 1;
            }
            if let Some(dependent_set) = dependents.get_mut(dep) {
                dependent_set.insert(task.id.as_str());
            }
        }
    }

    Ok((in_degree, dependents))
}

/// Returns `true` when the task graph's dependency relation has a cycle.
#[must_use]
pub fn detect_cycle(graph: &TaskGraph) -> bool {
    let Ok((mut in_degree, dependents)) = build_edges(graph) else {
        // An unknown dependency is a distinct validation failure; treat it
        // as "not a cycle" here so callers see the more specific error first.
        return false;
    };

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut visited = 0usize;
    while let Some(current) = queue.pop_front() {
        visited += 1;
        if let Some(next_ids) = dependents.get(current) {
            for &next in next_ids {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }
    }

    visited != in_degree.len()
}

/// Topologically sorts the graph's tasks, breaking ties by ascending id.
///
/// # Errors
///
/// Returns [`SchedulerError::UnknownDependency`] for an unresolvable `deps`
/// entry, or [`SchedulerError::Cycle`] when the graph is not acyclic.
pub fn topo_sort(graph: &TaskGraph) -> Result<Vec<String>, SchedulerError> {
    let (mut in_degree, dependents) = build_edges(graph)?;

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut order: Vec<String> = Vec::with_capacity(in_degree.len());
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());
        if let Some(next_ids) = dependents.get(current) {
            let mut ready: Vec<&str> = Vec::new();
            for &next in next_ids {
                if let Some(degree) = in_degree.get_mut(next) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(next);
                    }
                }
            }
            ready.sort_unstable();
            queue.extend(ready);
        }
    }

    if order.len() != in_degree.len() {
        return Err(SchedulerError::Cycle);
    }

    Ok(order)
}
