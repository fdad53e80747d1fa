//! Count-min table
//!
//! A `depth x 2^width_bits` matrix of saturating `u32` counters. Row columns
//! are derived from two SipHash values with double hashing, so adding a key
//! costs two hash computations regardless of depth.
//!
//! Counters are allocated on the first non-zero write; an untouched table
//! costs no more than its header. Heartbeat-only windows stay cheap.

use crate::types::Weight;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Largest supported `width_bits` (16M columns per row)
pub const MAX_WIDTH_BITS: u32 = 24;

/// A single count-min table
#[derive(Debug, Clone)]
pub struct CountMinTable {
    width_bits: u32,
    depth: usize,
    counters: Vec<Weight>,
}

impl CountMinTable {
    /// Create an empty table with `2^width_bits` columns and `depth` rows
    pub fn new(width_bits: u32, depth: usize) -> Self {
        debug_assert!(width_bits > 0 && width_bits <= MAX_WIDTH_BITS);
        debug_assert!(depth > 0);
        Self {
            width_bits,
            depth,
            counters: Vec::new(),
        }
    }

    /// Number of columns per row
    pub fn width(&self) -> usize {
        1usize << self.width_bits
    }

    /// Number of rows
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether any counter has been written
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Add `weight` to every row cell for `key`
    pub fn add(&mut self, key: &str, weight: Weight) {
        if weight == 0 {
            return;
        }
        if self.counters.is_empty() {
            self.counters = vec![0; self.width() * self.depth];
        }
        let width = self.width();
        let (h1, h2) = hash_pair(key);
        for row in 0..self.depth {
            let idx = row * width + column(h1, h2, row, width);
            self.counters[idx] = self.counters[idx].saturating_add(weight);
        }
    }

    /// Minimum over rows of the cells for `key`
    pub fn estimate(&self, key: &str) -> Weight {
        if self.counters.is_empty() {
            return 0;
        }
        let width = self.width();
        let (h1, h2) = hash_pair(key);
        (0..self.depth)
            .map(|row| self.counters[row * width + column(h1, h2, row, width)])
            .min()
            .unwrap_or(0)
    }

    /// Zero all counters, releasing their storage
    pub fn clear(&mut self) {
        self.counters = Vec::new();
    }
}

fn hash_pair(key: &str) -> (u64, u64) {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let h1 = hasher.finish();
    // Second hash continues from the first state, giving an independent value
    0x9e37_79b9_7f4a_7c15u64.hash(&mut hasher);
    let h2 = hasher.finish() | 1;
    (h1, h2)
}

#[inline]
fn column(h1: u64, h2: u64, row: usize, width: usize) -> usize {
    (h1.wrapping_add((row as u64).wrapping_mul(h2)) as usize) & (width - 1)
}
