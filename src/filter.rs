//! Approximate membership sets used for crawl deduplication.
//!
//! `ScalableBloomFilter` chains fixed-size Bloom segments: when the newest
//! segment reaches its capacity a larger one is appended with a tighter
//! error rate, so the compound false-positive rate stays under the
//! configured bound no matter how many addresses are added.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const GROWTH_FACTOR: usize = 2;
const TIGHTENING_RATIO: f64 = 0.9;

/// Set with `add`/`contains` only. False positives are allowed, false
/// negatives are not, and nothing is ever removed.
pub trait MembershipFilter: Send {
    fn add(&mut self, item: &str);
    fn contains(&self, item: &str) -> bool;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct BloomSegment {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    capacity: usize,
    count: usize,
}

impl BloomSegment {
    fn new(capacity: usize, error_rate: f64) -> Self {
        let capacity = capacity.max(1);
        let ln2 = std::f64::consts::LN_2;
        let num_bits = (-(capacity as f64) * error_rate.ln() / (ln2 * ln2)).ceil().max(64.0) as u64;
        let num_hashes = (-error_rate.log2()).ceil().max(1.0) as u32;
        let words = num_bits.div_ceil(64) as usize;

        Self {
            bits: vec![0; words],
            num_bits,
            num_hashes,
            capacity,
            count: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    fn positions(&self, (h1, h2): (u64, u64)) -> impl Iterator<Item = u64> + '_ {
        (0..self.num_hashes as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % self.num_bits)
    }

    fn insert(&mut self, hashes: (u64, u64)) {
        let positions: Vec<u64> = self.positions(hashes).collect();
        for pos in positions {
            self.bits[(pos / 64) as usize] |= 1u64 << (pos % 64);
        }
        self.count += 1;
    }

    fn check(&self, hashes: (u64, u64)) -> bool {
        self.positions(hashes)
            .all(|pos| self.bits[(pos / 64) as usize] & (1u64 << (pos % 64)) != 0)
    }
}

#[derive(Debug, Clone)]
pub struct ScalableBloomFilter {
    segments: Vec<BloomSegment>,
    initial_capacity: usize,
    error_rate: f64,
    len: usize,
}

impl ScalableBloomFilter {
    pub fn new(initial_capacity: usize, error_rate: f64) -> Self {
        let mut filter = Self {
            segments: Vec::new(),
            initial_capacity: initial_capacity.max(1),
            error_rate,
            len: 0,
        };
        filter.grow();
        filter
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    fn grow(&mut self) {
        let index = self.segments.len() as i32;
        let capacity = self.initial_capacity * GROWTH_FACTOR.pow(index as u32);
        // Geometric split of the error budget: the series sums to `error_rate`.
        let error_rate = self.error_rate * (1.0 - TIGHTENING_RATIO) * TIGHTENING_RATIO.powi(index);
        self.segments.push(BloomSegment::new(capacity, error_rate));
    }

    fn hashes(item: &str) -> (u64, u64) {
        let mut first = DefaultHasher::new();
        item.hash(&mut first);
        let h1 = first.finish();

        let mut second = DefaultHasher::new();
        h1.hash(&mut second);
        item.hash(&mut second);
        // Odd stride so probes cover the whole bit array.
        let h2 = second.finish() | 1;

        (h1, h2)
    }
}

impl MembershipFilter for ScalableBloomFilter {
    fn add(&mut self, item: &str) {
        let hashes = Self::hashes(item);
        if self.segments.iter().any(|s| s.check(hashes)) {
            return;
        }
        if self.segments.last().map(BloomSegment::is_full).unwrap_or(true) {
            self.grow();
        }
        if let Some(segment) = self.segments.last_mut() {
            segment.insert(hashes);
            self.len += 1;
        }
    }

    fn contains(&self, item: &str) -> bool {
        let hashes = Self::hashes(item);
        self.segments.iter().any(|s| s.check(hashes))
    }

    fn len(&self) -> usize {
        self.len
    }
}
