//! Per-window top-K history
//!
//! Weights for the open window are tracked exactly. On `tick` the open
//! window's keys are ranked by weight (descending, ties broken by key) and
//! the first `k` become that window's finalized list.
//!
//! History is addressed by absolute bucket index: after eviction the oldest
//! retained bucket is `evicted`, not 0, so an index keeps meaning the same
//! window for as long as it is retained.

use super::TopKAccumulator;
use crate::types::{BucketIndex, Weight};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

/// Bounded history of per-window ranked key lists
#[derive(Debug, Default)]
pub struct TopKHistory {
    retention: usize,
    open: HashMap<String, u64>,
    history: VecDeque<Vec<String>>,
    evicted: u64,
}

impl TopKHistory {
    /// Create an accumulator retaining `retention` finalized windows
    pub fn new(retention: usize) -> Self {
        Self {
            retention,
            open: HashMap::new(),
            history: VecDeque::with_capacity(retention),
            evicted: 0,
        }
    }

    /// Weight accumulated for `key` in the open window
    pub fn open_weight(&self, key: &str) -> u64 {
        self.open.get(key).copied().unwrap_or(0)
    }

    /// Number of distinct keys in the open window
    pub fn open_candidates(&self) -> usize {
        self.open.len()
    }
}

fn rank(a: &(String, u64), b: &(String, u64)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

impl TopKAccumulator for TopKHistory {
    fn insert(&mut self, key: &str, weight: Weight) {
        if weight == 0 {
            return;
        }
        match self.open.get_mut(key) {
            Some(total) => *total += weight as u64,
            None => {
                self.open.insert(key.to_owned(), weight as u64);
            },
        }
    }

    fn tick(&mut self, k: usize) {
        let mut ranked: Vec<(String, u64)> = self.open.drain().collect();
        if k == 0 {
            ranked.clear();
        } else if ranked.len() > k {
            ranked.select_nth_unstable_by(k - 1, rank);
            ranked.truncate(k);
        }
        ranked.sort_unstable_by(rank);

        self.history
            .push_back(ranked.into_iter().map(|(key, _)| key).collect());
        while self.history.len() > self.retention {
            self.history.pop_front();
            self.evicted += 1;
        }
    }

    fn keys(&self, bucket: BucketIndex) -> Option<&[String]> {
        let offset = bucket.checked_sub(self.evicted)?;
        self.history.get(offset as usize).map(Vec::as_slice)
    }

    fn len(&self) -> usize {
        self.history.len()
    }

    fn oldest(&self) -> BucketIndex {
        self.evicted
    }
}
