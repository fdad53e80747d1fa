//! Property-based tests for the counting pipeline
//!
//! Uses proptest to check the estimator guarantees that hold regardless of
//! hash collisions: estimates never undercount, and adding never lowers an
//! estimate.

use hokud::sketch::{CountMinTable, FrequencyEstimator, TopKAccumulator, TopKHistory, WindowedSketch};
use hokud::{CounterService, CounterSettings};
use proptest::prelude::*;
use std::collections::HashMap;

// =============================================================================
// Test Data Strategies
// =============================================================================

/// Small key alphabet so collisions and repeats are common
fn key() -> impl Strategy<Value = String> {
    "[a-e]{1,3}"
}

fn events() -> impl Strategy<Value = Vec<(String, u32)>> {
    prop::collection::vec((key(), 0u32..1000), 1..200)
}

// =============================================================================
// Count-Min Properties
// =============================================================================

mod count_min_properties {
    use super::*;

    proptest! {
        /// Estimates are upper bounds of the true counts
        #[test]
        fn never_undercounts(events in events(), width_bits in 1u32..8, depth in 1usize..6) {
            let mut table = CountMinTable::new(width_bits, depth);
            let mut truth: HashMap<String, u64> = HashMap::new();
            for (key, weight) in &events {
                table.add(key, *weight);
                *truth.entry(key.clone()).or_default() += *weight as u64;
            }
            for (key, count) in &truth {
                prop_assert!(table.estimate(key) as u64 >= *count);
            }
        }

        /// Adding never lowers any estimate
        #[test]
        fn estimates_are_monotonic(events in events(), probe in key()) {
            let mut table = CountMinTable::new(4, 3);
            let mut last = table.estimate(&probe);
            for (key, weight) in &events {
                table.add(key, *weight);
                let now = table.estimate(&probe);
                prop_assert!(now >= last, "{} dropped to {}", last, now);
                last = now;
            }
        }
    }
}

// =============================================================================
// Windowed Properties
// =============================================================================

mod windowed_properties {
    use super::*;

    proptest! {
        /// Counts of a retained window never decrease while the window is retained
        #[test]
        fn retained_window_counts_are_monotonic(
            buckets in prop::collection::vec(0u64..12, 1..100),
            probe in key(),
        ) {
            let retention = 4;
            let mut sketch = WindowedSketch::new(6, 3, retention);
            let mut last: HashMap<u64, u32> = HashMap::new();

            for (i, bucket) in buckets.iter().enumerate() {
                let key = if i % 2 == 0 { probe.as_str() } else { "other" };
                sketch.add(*bucket, key, 1);

                let newest = sketch.newest_bucket().unwrap();
                let oldest = newest.saturating_sub(retention as u64);
                for b in oldest..=newest {
                    let count = sketch.count(b, &probe);
                    if let Some(prev) = last.get(&b) {
                        prop_assert!(count >= *prev);
                    }
                    last.insert(b, count);
                }
                last.retain(|b, _| *b >= oldest);
            }
        }
    }
}

// =============================================================================
// Top-K Properties
// =============================================================================

mod topk_properties {
    use super::*;

    proptest! {
        /// A finalized list is sorted by accumulated weight and never exceeds k
        #[test]
        fn finalized_lists_are_ranked(events in events(), k in 0usize..8) {
            let mut topk = TopKHistory::new(3);
            let mut weights: HashMap<String, u64> = HashMap::new();
            for (key, weight) in &events {
                topk.insert(key, *weight);
                if *weight > 0 {
                    *weights.entry(key.clone()).or_default() += *weight as u64;
                }
            }
            topk.tick(k);

            let keys = topk.keys(0).unwrap();
            prop_assert_eq!(keys.len(), k.min(weights.len()));
            for pair in keys.windows(2) {
                prop_assert!(weights[&pair[0]] >= weights[&pair[1]]);
            }
            if let Some(last) = keys.last() {
                let cutoff = weights[last];
                let above = weights.values().filter(|w| **w > cutoff).count();
                prop_assert!(above <= keys.len());
            }
        }
    }
}

// =============================================================================
// Service Properties
// =============================================================================

proptest! {
    /// Range queries report one count per window and never undercount
    #[test]
    fn service_range_query_covers_every_window(
        offsets in prop::collection::vec(0i64..360, 1..100),
    ) {
        let settings = CounterSettings {
            estimator_width_bits: 10,
            retention_buckets: 6,
            ..CounterSettings::new(1000, 60)
        };
        let service = CounterService::configure(settings).unwrap();
        let mut truth = [0u32; 6];
        for offset in &offsets {
            service.ingest_event(1000 + offset, "k", 1).unwrap();
            truth[(*offset / 60) as usize] += 1;
        }

        let counts = service.query_counts("k", 1000, 1000 + 5 * 60).unwrap();
        prop_assert_eq!(counts.len(), 6);
        for (count, expected) in counts.iter().zip(truth.iter()) {
            prop_assert!(count >= expected);
        }
    }
}
