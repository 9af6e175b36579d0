// tests/proptest_cache.rs
// ============================================================================
// Module: Retrieval Cache Property-Based Tests
// Description: Generated put/get/advance-clock sequences checked against the
//              cache's TTL and bounded-LRU contracts.
// ============================================================================
//! ## Overview
//! The cache never holds more than its configured capacity, regardless of
//! the operation sequence applied to it.

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

mod support;

use std::sync::Arc;

use kora::cache::RetrievalCache;

use proptest::prelude::*;
use serde_json::json;

#[derive(Debug, Clone)]
enum Op {
    Put { key: u8, ttl: Option<u8> },
    Get { key: u8 },
    Advance { seconds: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8 .. 5, prop::option::of(1u8 .. 5)).prop_map(|(key, ttl)| Op::Put { key, ttl }),
        (0u8 .. 5).prop_map(|key| Op::Get { key }),
        (0u8 .. 3).prop_map(|seconds| Op::Advance { seconds }),
    ]
}

proptest! {
    #[test]
    fn cache_never_exceeds_capacity(ops in prop::collection::vec(op_strategy(), 0 .. 64)) {
        let clock = Arc::new(support::ManualClock::new(0.0));
        let cache = RetrievalCache::new(3, clock.clone());

        for op in ops {
            match op {
                Op::Put { key, ttl } => {
                    let _ = cache.put(&key.to_string(), json!(key), ttl.map(u64::from));
                }
                Op::Get { key } => {
                    let _ = cache.get(&key.to_string());
                }
                Op::Advance { seconds } => clock.advance(f64::from(seconds)),
            }

            let mut live = 0;
            for candidate in 0u8 .. 5 {
                if cache.get(&candidate.to_string()).expect("get does not error").is_some() {
                    live += 1;
                }
            }
            prop_assert!(live <= 3);
        }
    }
}
