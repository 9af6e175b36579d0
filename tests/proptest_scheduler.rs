// tests/proptest_scheduler.rs
// ============================================================================
// Module: Scheduler Property-Based Tests
// Description: Generates random DAGs and checks topological soundness and
//              deterministic tie-breaking across repeated runs.
// ============================================================================
//! ## Overview
//! Edges only ever point from a lower-indexed task to a higher-indexed one,
//! which guarantees the generated graph is acyclic by construction.

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
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use kora::task_ir::RunSpec;
use kora::task_ir::Task;
use kora::task_ir::TaskGraph;
use kora::scheduler::topo_sort;

use proptest::prelude::*;
use serde_json::Map;

fn det_run(handler: &str) -> RunSpec {
    RunSpec::Det {
        spec: kora::task_ir::RunDetSpec { handler: handler.to_string(), args: Map::new() },
    }
}

/// Builds a DAG of `node_count` tasks named `n0..n{node_count-1}`, where each
/// task's dependency set is drawn only from strictly lower-indexed tasks.
fn acyclic_graph_strategy() -> impl Strategy<Value = TaskGraph> {
    (2usize ..= 12).prop_flat_map(|node_count| {
        let dep_masks = prop::collection::vec(any::<u16>(), node_count);
        dep_masks.prop_map(move |masks| {
            let tasks: Vec<Task> = (0 .. node_count)
                .map(|index| {
                    let mut deps = Vec::new();
                    for earlier in 0 .. index {
                        if masks[index] & (1u16 << (earlier % 16)) != 0 {
                            deps.push(format!("n{earlier}"));
                        }
                    }
                    Task {
                        id: format!("n{index}"),
                        task_type: "t".to_string(),
                        deps,
                        input: Map::new(),
                        run: det_run("echo"),
                        verify: None,
                        policy: kora::task_ir::Policy::default(),
                        tags: Vec::new(),
                    }
                })
                .collect();

            TaskGraph {
                graph_id: "prop".to_string(),
                version: "0.1".to_string(),
                root: format!("n{}", node_count - 1),
                defaults: kora::task_ir::GraphDefaults::default(),
                tasks,
            }
        })
    })
}

proptest! {
    #[test]
    fn topo_sort_respects_every_edge(graph in acyclic_graph_strategy()) {
        let order = topo_sort(&graph).expect("constructed graph is acyclic");
        let position: BTreeMap<&str, usize> =
            order.iter().enumerate().map(|(index, id)| (id.as_str(), index)).collect();

        for task in &graph.tasks {
            for dep in &task.deps {
                prop_assert!(position[dep.as_str()] < position[task.id.as_str()]);
            }
        }
    }

    #[test]
    fn topo_sort_is_deterministic_across_repeated_calls(graph in acyclic_graph_strategy()) {
        let first = topo_sort(&graph).expect("acyclic");
        let second = topo_sort(&graph).expect("acyclic");
        prop_assert_eq!(first, second);
    }
}
