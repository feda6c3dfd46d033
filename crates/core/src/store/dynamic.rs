//! Dynamic record stores and the chain reader.
//!
//! Variable-length values are stored as singly linked chains of dynamic
//! blocks. Chains come from possibly corrupt data, so every traversal is
//! bounded: by a visited set when the longest legal chain is known, and by
//! Brent's cycle detection otherwise.

use core::fmt;
use std::path::Path;

use hashbrown::HashSet;

use super::record::{is_null, DynamicRecord};
use super::record_store::RecordStore;
use crate::error::StoreError;

/// What a dynamic store holds. The code is stored in every block.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicKind {
    String,
    Array,
    NodeLabels,
    LabelName,
    RelationshipTypeName,
    PropertyKeyName,
}

impl DynamicKind {
    pub const ALL: [Self; 6] = [
        Self::String,
        Self::Array,
        Self::NodeLabels,
        Self::LabelName,
        Self::RelationshipTypeName,
        Self::PropertyKeyName,
    ];

    /// Longest legal token name in bytes.
    pub const MAX_NAME_LEN: usize = 4096;

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::String => 1,
            Self::Array => 2,
            Self::NodeLabels => 3,
            Self::LabelName => 4,
            Self::RelationshipTypeName => 5,
            Self::PropertyKeyName => 6,
        }
    }

    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::String => "strings.store",
            Self::Array => "arrays.store",
            Self::NodeLabels => "node_labels.store",
            Self::LabelName => "label_names.store",
            Self::RelationshipTypeName => "relationship_type_names.store",
            Self::PropertyKeyName => "property_key_names.store",
        }
    }
}

/// How a traversal guards against cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainBound {
    /// At most this many blocks form a legal chain; ids are tracked in a set.
    Visited(usize),
    /// No legal bound; use constant-memory cycle detection.
    Unbounded,
}

/// Why a chain could not be read.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainError {
    /// The chain revisits `block`.
    Cycle { block: u64 },
    /// `block` is referenced by the chain but not in use.
    NotInUse { block: u64 },
    /// `block` carries a type code of another store.
    WrongType { block: u64, found: u8 },
    /// `block` declares more payload than it can hold.
    InvalidLength { block: u64, length: u32 },
    /// The chain has more blocks than any legal value of this kind.
    TooLong { limit: usize },
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cycle { block } => write!(f, "chain cycles back to block {block}"),
            Self::NotInUse { block } => write!(f, "chain block {block} is not in use"),
            Self::WrongType { block, found } => {
                write!(f, "chain block {block} has foreign type {found}")
            }
            Self::InvalidLength { block, length } => {
                write!(f, "chain block {block} declares invalid length {length}")
            }
            Self::TooLong { limit } => write!(f, "chain exceeds {limit} blocks"),
        }
    }
}

/// A successfully read chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub payload: Vec<u8>,
    pub blocks: Vec<u64>,
}

#[derive(Debug)]
pub struct DynamicStore {
    records: RecordStore<DynamicRecord>,
    kind: DynamicKind,
    bound: ChainBound,
}

impl DynamicStore {
    /// # Errors
    ///
    /// See [`RecordStore::open`].
    pub fn open(
        dir: &Path,
        kind: DynamicKind,
        max_payload: Option<usize>,
    ) -> Result<Self, StoreError> {
        let records = RecordStore::open(kind.file_name(), &dir.join(kind.file_name()))?;
        Ok(Self::new(records, kind, max_payload))
    }

    /// Wraps an opened store. `max_payload` is the largest legal value in bytes.
    #[must_use]
    pub fn new(
        records: RecordStore<DynamicRecord>,
        kind: DynamicKind,
        max_payload: Option<usize>,
    ) -> Self {
        let capacity = records.record_size() - DynamicRecord::HEADER_SIZE;
        let bound = max_payload.map_or(ChainBound::Unbounded, |max| {
            ChainBound::Visited(max.div_ceil(capacity).max(1))
        });
        Self {
            records,
            kind,
            bound,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> DynamicKind {
        self.kind
    }

    #[must_use]
    pub const fn bound(&self) -> ChainBound {
        self.bound
    }

    #[must_use]
    pub const fn records(&self) -> &RecordStore<DynamicRecord> {
        &self.records
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.records.record_size() - DynamicRecord::HEADER_SIZE
    }

    /// Follows the chain starting at `first` and concatenates its payload.
    ///
    /// # Errors
    ///
    /// Returns the first [`ChainError`] met. Traversal always terminates.
    pub fn read_chain(&self, first: u64) -> Result<Chain, ChainError> {
        match self.bound {
            ChainBound::Visited(limit) => self.read_bounded(first, limit),
            ChainBound::Unbounded => self.read_unbounded(first),
        }
    }

    fn read_bounded(&self, first: u64, limit: usize) -> Result<Chain, ChainError> {
        let mut visited = HashSet::with_capacity(limit.min(64));
        let mut chain = Chain::empty();
        let mut current = first;
        loop {
            if !visited.insert(current) {
                return Err(ChainError::Cycle { block: current });
            }
            if visited.len() > limit {
                return Err(ChainError::TooLong { limit });
            }
            let next = self.append(&mut chain, current)?;
            if is_null(next) {
                return Ok(chain);
            }
            current = next;
        }
    }

    fn read_unbounded(&self, first: u64) -> Result<Chain, ChainError> {
        let mut chain = Chain::empty();
        let mut tortoise = first;
        let mut power = 1usize;
        let mut steps = 0usize;
        let mut current = first;
        loop {
            let next = self.append(&mut chain, current)?;
            if is_null(next) {
                return Ok(chain);
            }
            steps += 1;
            if next == tortoise {
                return Err(ChainError::Cycle { block: next });
            }
            if steps == power {
                tortoise = next;
                power *= 2;
                steps = 0;
            }
            current = next;
        }
    }

    /// Validates one block, appends its payload and returns its `next`.
    fn append(&self, chain: &mut Chain, id: u64) -> Result<u64, ChainError> {
        let block = self.records.read(id);
        if !block.in_use {
            return Err(ChainError::NotInUse { block: id });
        }
        if block.type_code != self.kind.code() {
            return Err(ChainError::WrongType {
                block: id,
                found: block.type_code,
            });
        }
        if block.length as usize > block.capacity() {
            return Err(ChainError::InvalidLength {
                block: id,
                length: block.length,
            });
        }
        chain.payload.extend_from_slice(block.payload());
        chain.blocks.push(id);
        Ok(block.next)
    }
}

impl Chain {
    const fn empty() -> Self {
        Self {
            payload: Vec::new(),
            blocks: Vec::new(),
        }
    }
}

/// Splits `payload` into blocks for `kind`, numbering them from `first_id`.
#[must_use]
pub fn chain_blocks(
    kind: DynamicKind,
    capacity: usize,
    first_id: u64,
    payload: &[u8],
) -> Vec<DynamicRecord> {
    let chunks: Vec<&[u8]> = if payload.is_empty() {
        vec![&[]]
    } else {
        payload.chunks(capacity).collect()
    };
    let last = chunks.len() - 1;
    (first_id..)
        .zip(chunks.into_iter().enumerate())
        .map(|(id, (at, chunk))| {
            let mut data = vec![0u8; capacity];
            data[..chunk.len()].copy_from_slice(chunk);
            #[allow(clippy::cast_possible_truncation)]
            let length = chunk.len() as u32;
            DynamicRecord {
                id,
                in_use: true,
                type_code: kind.code(),
                length,
                next: if at == last { super::format::NULL_REFERENCE } else { id + 1 },
                data,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::format::{encode_store, StoreKind, NULL_REFERENCE};
    use crate::store::record::Record;
    use crate::store::record_store::StoreBytes;

    const CAPACITY: usize = 8;

    fn store(
        kind: DynamicKind,
        blocks: &[DynamicRecord],
        max_payload: Option<usize>,
    ) -> DynamicStore {
        let high_id = blocks.iter().map(|b| b.id + 1).max().unwrap_or(0);
        let bytes = encode_store(
            StoreKind::Dynamic,
            DynamicRecord::HEADER_SIZE + CAPACITY,
            high_id,
            blocks,
            |b, slot| {
                b.encode(slot);
                b.id
            },
        );
        let records = RecordStore::from_bytes(kind.file_name(), StoreBytes::Owned(bytes)).unwrap();
        DynamicStore::new(records, kind, max_payload)
    }

    #[test]
    fn test_reads_multi_block_chain() {
        let blocks = chain_blocks(DynamicKind::String, CAPACITY, 3, b"hello dynamic world");
        assert_eq!(blocks.len(), 3);
        let store = store(DynamicKind::String, &blocks, None);
        let chain = store.read_chain(3).unwrap();
        assert_eq!(chain.payload, b"hello dynamic world");
        assert_eq!(chain.blocks, vec![3, 4, 5]);
    }

    #[test]
    fn test_cycle_terminates_unbounded() {
        let mut blocks = chain_blocks(DynamicKind::Array, CAPACITY, 0, &[1; 40]);
        let last = blocks.len() - 1;
        blocks[last].next = 2;
        let store = store(DynamicKind::Array, &blocks, None);
        assert_eq!(store.bound(), ChainBound::Unbounded);
        assert!(matches!(store.read_chain(0), Err(ChainError::Cycle { .. })));
    }

    #[test]
    fn test_cycle_terminates_bounded() {
        let mut blocks = chain_blocks(DynamicKind::LabelName, CAPACITY, 0, b"abcdefghijk");
        blocks[1].next = 0;
        let store = store(DynamicKind::LabelName, &blocks, Some(64));
        assert_eq!(store.read_chain(0), Err(ChainError::Cycle { block: 0 }));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut blocks = chain_blocks(DynamicKind::String, CAPACITY, 0, b"abcdefgh");
        blocks[0].next = 0;
        let unbounded = store(DynamicKind::String, &blocks, None);
        assert_eq!(unbounded.read_chain(0), Err(ChainError::Cycle { block: 0 }));
    }

    #[test]
    fn test_overlong_chain_is_cut_off() {
        let blocks = chain_blocks(DynamicKind::PropertyKeyName, CAPACITY, 0, &[b'a'; 40]);
        let store = store(DynamicKind::PropertyKeyName, &blocks, Some(16));
        assert_eq!(store.read_chain(0), Err(ChainError::TooLong { limit: 2 }));
    }

    #[test]
    fn test_broken_blocks() {
        let mut blocks = chain_blocks(DynamicKind::String, CAPACITY, 0, &[b'x'; 20]);
        blocks[1].in_use = false;
        let s = store(DynamicKind::String, &blocks, None);
        assert_eq!(s.read_chain(0), Err(ChainError::NotInUse { block: 1 }));

        let mut blocks = chain_blocks(DynamicKind::String, CAPACITY, 0, &[b'x'; 20]);
        blocks[2].type_code = DynamicKind::Array.code();
        let s = store(DynamicKind::String, &blocks, None);
        assert_eq!(
            s.read_chain(0),
            Err(ChainError::WrongType { block: 2, found: 2 })
        );

        let mut blocks = chain_blocks(DynamicKind::String, CAPACITY, 0, &[b'x'; 4]);
        blocks[0].length = 9;
        let s = store(DynamicKind::String, &blocks, None);
        assert_eq!(
            s.read_chain(0),
            Err(ChainError::InvalidLength { block: 0, length: 9 })
        );
    }

    #[test]
    fn test_dangling_pointer_past_high_id() {
        let mut blocks = chain_blocks(DynamicKind::String, CAPACITY, 0, b"ab");
        blocks[0].next = 99;
        let s = store(DynamicKind::String, &blocks, None);
        assert_eq!(s.read_chain(0), Err(ChainError::NotInUse { block: 99 }));
    }

    #[test]
    fn test_short_non_terminal_block_is_still_read() {
        let mut blocks = chain_blocks(DynamicKind::String, CAPACITY, 0, &[b'x'; 12]);
        blocks[0].length = 5;
        let s = store(DynamicKind::String, &blocks, None);
        let chain = s.read_chain(0).unwrap();
        assert_eq!(chain.blocks, vec![0, 1]);
        assert_eq!(chain.payload.len(), 9);
        assert_eq!(blocks[1].next, NULL_REFERENCE);
    }
}
