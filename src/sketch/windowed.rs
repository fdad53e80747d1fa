//! Windowed count-min sketch
//!
//! Keeps one [`CountMinTable`] per window: the newest window observed plus
//! the `retention` windows behind it. Writing to a newer window advances the
//! ring and recycles the tables that fall out of retention. Late writes land
//! in their own window as long as it is within retention of the newest.

use super::{CountMinTable, FrequencyEstimator};
use crate::types::{BucketIndex, Weight};
use std::collections::VecDeque;

/// Per-window count-min sketch with bounded retention
#[derive(Debug)]
pub struct WindowedSketch {
    width_bits: u32,
    depth: usize,
    retention: usize,
    /// Bucket index of `tables.back()`
    newest: Option<BucketIndex>,
    tables: VecDeque<CountMinTable>,
}

impl WindowedSketch {
    /// Create a sketch keeping `retention` windows behind the newest one
    pub fn new(width_bits: u32, depth: usize, retention: usize) -> Self {
        Self {
            width_bits,
            depth,
            retention,
            newest: None,
            tables: VecDeque::with_capacity(retention + 1),
        }
    }

    /// Number of windows currently held (including the newest)
    pub fn windows(&self) -> usize {
        self.tables.len()
    }

    /// Oldest bucket still answerable, if any
    pub fn oldest_bucket(&self) -> Option<BucketIndex> {
        self.newest
            .map(|n| n.saturating_sub(self.tables.len() as BucketIndex - 1))
    }

    fn capacity(&self) -> usize {
        self.retention + 1
    }

    fn fresh_table(&mut self) -> CountMinTable {
        if self.tables.len() >= self.capacity() {
            if let Some(mut table) = self.tables.pop_front() {
                table.clear();
                return table;
            }
        }
        CountMinTable::new(self.width_bits, self.depth)
    }

    fn advance_to(&mut self, bucket: BucketIndex) {
        match self.newest {
            None => {
                // Windows behind the first write are still inside retention
                while self.tables.len() < self.capacity() {
                    let table = self.fresh_table();
                    self.tables.push_back(table);
                }
            },
            Some(newest) if bucket > newest => {
                let gap = bucket - newest;
                if gap > self.retention as BucketIndex {
                    // Nothing retained survives the jump
                    self.tables.iter_mut().for_each(CountMinTable::clear);
                } else {
                    for _ in 0..gap {
                        let table = self.fresh_table();
                        self.tables.push_back(table);
                    }
                }
            },
            Some(_) => return,
        }
        self.newest = Some(bucket);
    }

    fn slot(&self, bucket: BucketIndex) -> Option<usize> {
        let newest = self.newest?;
        if bucket > newest {
            return None;
        }
        let age = (newest - bucket) as usize;
        if age >= self.tables.len() {
            return None;
        }
        Some(self.tables.len() - 1 - age)
    }
}

impl FrequencyEstimator for WindowedSketch {
    fn add(&mut self, bucket: BucketIndex, key: &str, weight: Weight) {
        self.advance_to(bucket);
        if let Some(idx) = self.slot(bucket) {
            self.tables[idx].add(key, weight);
        }
    }

    fn count(&self, bucket: BucketIndex, key: &str) -> Weight {
        self.slot(bucket)
            .map(|idx| self.tables[idx].estimate(key))
            .unwrap_or(0)
    }

    fn newest_bucket(&self) -> Option<BucketIndex> {
        self.newest
    }
}
