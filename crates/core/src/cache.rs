//! Per-partition node cache.
//!
//! Each node in the current partition owns one fixed-width line of three
//! atomic words:
//!
//! - word 0: `next_rel` (first relationship, or first group when dense)
//! - word 1: flag bits in the low half, interned label set in the high half
//! - word 2: observed degree in the low half, declared degree in the high half
//!
//! Lines are written by node units and then read and updated by relationship
//! units of the same partition. The buffer is dropped before the next
//! partition starts.
//!
//! Interned label sets are charged against a byte budget. Once it is spent,
//! further nodes are marked as uncached and their labels are read back from
//! the store on demand.

use core::ops::Range;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

/// Bytes one node occupies in the cache.
pub const CACHE_LINE_SIZE: u64 = 24;

const WORDS: usize = 3;
const IN_USE: u64 = 1;
const DENSE: u64 = 1 << 1;
const CHECK_MARK: u64 = 1 << 2;
const HAS_DECLARED: u64 = 1 << 3;
const HALF: u32 = 32;
const LOW: u64 = (1 << HALF) - 1;
/// Label set slot of a node whose labels did not fit the budget.
const UNCACHED: u32 = u32::MAX;
/// Bytes charged per interned set on top of its ids.
pub const LABEL_SET_OVERHEAD: u64 = 48;

/// Decoded view of one cache line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedNode {
    pub in_use: bool,
    pub dense: bool,
    pub next_rel: u64,
    /// Set while the node still waits for its first relationship to claim it.
    pub check_mark: bool,
}

/// Interned label sets. Index 0 is the empty set.
#[derive(Debug)]
struct LabelSets {
    sets: Vec<Arc<[u32]>>,
    index: HashMap<Arc<[u32]>, u32>,
    remaining: u64,
}

impl LabelSets {
    fn new(budget: u64) -> Self {
        let empty: Arc<[u32]> = Arc::from(Vec::new());
        let mut index = HashMap::new();
        index.insert(Arc::clone(&empty), 0);
        Self {
            sets: vec![empty],
            index,
            remaining: budget,
        }
    }
}

#[derive(Debug)]
pub struct NodeCache {
    range: Range<u64>,
    words: Vec<AtomicU64>,
    labels: RwLock<LabelSets>,
}

impl NodeCache {
    /// Cache for `range`, interning at most `label_budget` bytes of label sets.
    #[must_use]
    pub fn new(range: Range<u64>, label_budget: u64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let len = (range.end - range.start) as usize * WORDS;
        Self {
            range,
            words: (0..len).map(|_| AtomicU64::new(0)).collect(),
            labels: RwLock::new(LabelSets::new(label_budget)),
        }
    }

    #[must_use]
    pub fn range(&self) -> Range<u64> {
        self.range.clone()
    }

    #[must_use]
    pub const fn contains(&self, id: u64) -> bool {
        id >= self.range.start && id < self.range.end
    }

    #[allow(clippy::cast_possible_truncation)]
    fn word(&self, id: u64, word: usize) -> &AtomicU64 {
        debug_assert!(self.contains(id), "node {id} outside cached partition");
        &self.words[(id - self.range.start) as usize * WORDS + word]
    }

    /// Fills the line of `id`. A sparse in-use node with a relationship gets a
    /// check mark that its first relationship clears.
    pub fn store(&self, id: u64, in_use: bool, dense: bool, next_rel: u64, labels: &[u32]) {
        let mut flags = 0;
        if in_use {
            flags |= IN_USE;
            if dense {
                flags |= DENSE;
            } else if next_rel != crate::store::format::NULL_REFERENCE {
                flags |= CHECK_MARK;
            }
        }
        let set = if labels.is_empty() {
            0
        } else {
            self.intern(labels)
        };
        self.word(id, 0).store(next_rel, Ordering::Relaxed);
        self.word(id, 1)
            .store(flags | (u64::from(set) << HALF), Ordering::Release);
    }

    fn intern(&self, labels: &[u32]) -> u32 {
        if let Some(&set) = self.labels.read().index.get(labels) {
            return set;
        }
        let mut sets = self.labels.write();
        if let Some(&set) = sets.index.get(labels) {
            return set;
        }
        let cost = 4 * labels.len() as u64 + LABEL_SET_OVERHEAD;
        if cost > sets.remaining {
            return UNCACHED;
        }
        sets.remaining -= cost;
        #[allow(clippy::cast_possible_truncation)]
        let set = sets.sets.len() as u32;
        let shared: Arc<[u32]> = Arc::from(labels);
        sets.sets.push(Arc::clone(&shared));
        sets.index.insert(shared, set);
        set
    }

    #[must_use]
    pub fn get(&self, id: u64) -> CachedNode {
        let flags = self.word(id, 1).load(Ordering::Acquire);
        CachedNode {
            in_use: flags & IN_USE != 0,
            dense: flags & DENSE != 0,
            next_rel: self.word(id, 0).load(Ordering::Relaxed),
            check_mark: flags & CHECK_MARK != 0,
        }
    }

    /// Labels of `id`, or `None` when they were left out of the budget.
    #[must_use]
    pub fn labels(&self, id: u64) -> Option<Arc<[u32]>> {
        #[allow(clippy::cast_possible_truncation)]
        let set = (self.word(id, 1).load(Ordering::Acquire) >> HALF) as u32;
        if set == UNCACHED {
            return None;
        }
        self.labels.read().sets.get(set as usize).cloned()
    }

    /// Clears the check mark of `id`, returning whether it was set.
    pub fn clear_check_mark(&self, id: u64) -> bool {
        self.word(id, 1).fetch_and(!CHECK_MARK, Ordering::AcqRel) & CHECK_MARK != 0
    }

    pub fn add_observed_degree(&self, id: u64) {
        self.word(id, 2).fetch_add(1, Ordering::Relaxed);
    }

    /// Records the degree declared by the relationship that heads the chain.
    pub fn set_declared_degree(&self, id: u64, degree: u64) {
        let declared = degree.min(LOW);
        self.word(id, 2)
            .fetch_or(declared << HALF, Ordering::Relaxed);
        self.word(id, 1).fetch_or(HAS_DECLARED, Ordering::Release);
    }

    /// Observed degree and, if a chain head declared one, the declared degree.
    #[must_use]
    pub fn degrees(&self, id: u64) -> (u64, Option<u64>) {
        let has_declared = self.word(id, 1).load(Ordering::Acquire) & HAS_DECLARED != 0;
        let word = self.word(id, 2).load(Ordering::Acquire);
        (word & LOW, has_declared.then_some(word >> HALF))
    }
}

/// Fixed-size set of ids with atomic insertion.
#[derive(Debug)]
pub struct AtomicBitset {
    words: Vec<AtomicU64>,
}

impl AtomicBitset {
    #[must_use]
    pub fn new(len: u64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let words = len.div_ceil(64) as usize;
        Self {
            words: (0..words).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Adds `id`, returning `false` if it was already present. Ids past the
    /// end are never stored and always report as new.
    pub fn insert(&self, id: u64) -> bool {
        #[allow(clippy::cast_possible_truncation)]
        let Some(word) = self.words.get((id / 64) as usize) else {
            return true;
        };
        let bit = 1 << (id % 64);
        word.fetch_or(bit, Ordering::AcqRel) & bit == 0
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn contains(&self, id: u64) -> bool {
        self.words
            .get((id / 64) as usize)
            .is_some_and(|word| word.load(Ordering::Acquire) & (1 << (id % 64)) != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::format::NULL_REFERENCE;

    #[test]
    fn test_line_roundtrip() {
        let cache = NodeCache::new(10..20, u64::MAX);
        cache.store(12, true, false, 7, &[3, 4]);
        cache.store(13, true, false, NULL_REFERENCE, &[3, 4]);
        cache.store(14, true, true, 2, &[]);
        let node = cache.get(12);
        assert!(node.in_use && !node.dense && node.check_mark);
        assert_eq!(node.next_rel, 7);
        assert!(!cache.get(13).check_mark);
        assert!(cache.get(14).dense && !cache.get(14).check_mark);
        assert_eq!(&*cache.labels(12).unwrap(), &[3, 4]);
        assert!(Arc::ptr_eq(&cache.labels(12).unwrap(), &cache.labels(13).unwrap()));
        assert!(cache.labels(14).unwrap().is_empty());
        assert!(!cache.get(15).in_use);
    }

    #[test]
    fn test_check_mark_clears_once() {
        let cache = NodeCache::new(0..1, 0);
        cache.store(0, true, false, 5, &[]);
        assert!(cache.clear_check_mark(0));
        assert!(!cache.clear_check_mark(0));
        assert!(!cache.get(0).check_mark);
    }

    #[test]
    fn test_bitset_reports_repeats() {
        let set = AtomicBitset::new(130);
        assert!(set.insert(129));
        assert!(!set.insert(129));
        assert!(set.contains(129));
        assert!(!set.contains(128));
        assert!(set.insert(500));
        assert!(set.insert(500));
    }

    #[test]
    fn test_degrees() {
        let cache = NodeCache::new(0..2, 0);
        cache.store(1, true, false, 5, &[]);
        assert_eq!(cache.degrees(1), (0, None));
        cache.add_observed_degree(1);
        cache.add_observed_degree(1);
        cache.set_declared_degree(1, 3);
        assert_eq!(cache.degrees(1), (2, Some(3)));
    }

    #[test]
    fn test_label_sets_stop_at_budget() {
        let cache = NodeCache::new(0..4, 2 * 4 + LABEL_SET_OVERHEAD);
        cache.store(0, true, false, NULL_REFERENCE, &[1, 2]);
        cache.store(1, true, false, NULL_REFERENCE, &[1, 2]);
        cache.store(2, true, false, NULL_REFERENCE, &[3]);
        cache.store(3, true, false, NULL_REFERENCE, &[]);
        assert_eq!(&*cache.labels(0).unwrap(), &[1, 2]);
        assert_eq!(&*cache.labels(1).unwrap(), &[1, 2]);
        assert_eq!(cache.labels(2), None);
        assert!(cache.get(2).in_use);
        assert!(cache.labels(3).unwrap().is_empty());
    }
}
