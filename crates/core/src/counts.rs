//! Aggregate counts: the persisted store and the tallies observed while
//! scanning.

use core::fmt;
use std::io;
use std::path::Path;

use hashbrown::HashMap;

use crate::error::StoreError;
use crate::report::{Kind, RecordType, Reporter};
use crate::store::format::{get_i64, get_u16, get_u64, put_i64, put_u16, put_u64};

const MAGIC: [u8; 4] = *b"SCNT";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 16;
const ENTRY_SIZE: usize = 33;
const WILDCARD: i64 = -1;

/// One aggregate. `None` stands for "any".
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CountsKey {
    Node {
        label: Option<u32>,
    },
    Relationship {
        start: Option<u32>,
        rel_type: Option<u32>,
        end: Option<u32>,
    },
}

impl fmt::Display for CountsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = |t: &Option<u32>| t.map_or_else(|| "*".to_owned(), |t| t.to_string());
        match self {
            Self::Node { label } => write!(f, "node count (:{})", token(label)),
            Self::Relationship {
                start,
                rel_type,
                end,
            } => write!(
                f,
                "relationship count (:{})-[:{}]->(:{})",
                token(start),
                token(rel_type),
                token(end)
            ),
        }
    }
}

/// Reads the persisted counts store.
///
/// # Errors
///
/// Returns [`StoreError::CountsStoreMissing`] when the file is absent or has
/// another magic or version, and a format error for malformed entries.
pub fn read_counts_store(path: &Path) -> Result<HashMap<CountsKey, i64>, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::CountsStoreMissing)
        }
        Err(source) => {
            return Err(StoreError::Io {
                store: crate::store::COUNTS_STORE.to_owned(),
                source,
            })
        }
    };
    decode_counts(&bytes)
}

/// # Errors
///
/// See [`read_counts_store`].
pub fn decode_counts(bytes: &[u8]) -> Result<HashMap<CountsKey, i64>, StoreError> {
    if bytes.len() < HEADER_SIZE || bytes[0..4] != MAGIC || get_u16(bytes, 4) != VERSION {
        return Err(StoreError::CountsStoreMissing);
    }
    let entries = get_u64(bytes, 8);
    let expected = (HEADER_SIZE as u64).saturating_add(entries.saturating_mul(ENTRY_SIZE as u64));
    if (bytes.len() as u64) < expected {
        return Err(StoreError::Truncated {
            store: crate::store::COUNTS_STORE.to_owned(),
            expected,
            actual: bytes.len() as u64,
        });
    }
    let mut counts = HashMap::new();
    for entry in bytes[HEADER_SIZE..].chunks_exact(ENTRY_SIZE).take(entries as usize) {
        let token = |at: usize| -> Result<Option<u32>, StoreError> {
            match get_i64(entry, at) {
                WILDCARD => Ok(None),
                v => u32::try_from(v).map(Some).map_err(|_| StoreError::Format {
                    store: crate::store::COUNTS_STORE.to_owned(),
                    reason: format!("token id {v} out of range"),
                }),
            }
        };
        let key = match entry[0] {
            0 => CountsKey::Node { label: token(1)? },
            1 => CountsKey::Relationship {
                start: token(1)?,
                rel_type: token(9)?,
                end: token(17)?,
            },
            other => {
                return Err(StoreError::Format {
                    store: crate::store::COUNTS_STORE.to_owned(),
                    reason: format!("unknown counts entry kind {other}"),
                })
            }
        };
        *counts.entry(key).or_insert(0) += get_i64(entry, 25);
    }
    Ok(counts)
}

/// Serialises counts in the persisted format, ordered by key.
#[must_use]
pub fn encode_counts(counts: &HashMap<CountsKey, i64>) -> Vec<u8> {
    let mut keys: Vec<_> = counts.keys().copied().collect();
    keys.sort_unstable();
    let mut out = vec![0u8; HEADER_SIZE + keys.len() * ENTRY_SIZE];
    out[0..4].copy_from_slice(&MAGIC);
    put_u16(&mut out, 4, VERSION);
    put_u64(&mut out, 8, keys.len() as u64);
    let token = |t: Option<u32>| t.map_or(WILDCARD, i64::from);
    for (key, entry) in keys.iter().zip(out[HEADER_SIZE..].chunks_exact_mut(ENTRY_SIZE)) {
        let (kind, start, rel_type, end) = match *key {
            CountsKey::Node { label } => (0, label, None, None),
            CountsKey::Relationship {
                start,
                rel_type,
                end,
            } => (1, start, rel_type, end),
        };
        entry[0] = kind;
        put_i64(entry, 1, token(start));
        put_i64(entry, 9, token(rel_type));
        put_i64(entry, 17, token(end));
        put_i64(entry, 25, counts[key]);
    }
    out
}

/// Tallies built from live entities. One per unit of work, merged later.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ObservedCounts {
    counts: HashMap<CountsKey, i64>,
}

impl ObservedCounts {
    pub fn increment(&mut self, key: CountsKey) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    /// A live node with `labels`, counted once per distinct label.
    pub fn node(&mut self, labels: &[u32]) {
        self.increment(CountsKey::Node { label: None });
        for (at, &label) in labels.iter().enumerate() {
            if !labels[..at].contains(&label) {
                self.increment(CountsKey::Node { label: Some(label) });
            }
        }
    }

    /// The wildcard part of a relationship, counted once per relationship.
    pub fn relationship(&mut self, rel_type: u32) {
        for ty in [None, Some(rel_type)] {
            self.increment(CountsKey::Relationship {
                start: None,
                rel_type: ty,
                end: None,
            });
        }
    }

    /// The labelled part contributed by the start node of a relationship.
    pub fn relationship_start(&mut self, labels: &[u32], rel_type: u32) {
        for (at, &label) in labels.iter().enumerate() {
            if labels[..at].contains(&label) {
                continue;
            }
            for ty in [None, Some(rel_type)] {
                self.increment(CountsKey::Relationship {
                    start: Some(label),
                    rel_type: ty,
                    end: None,
                });
            }
        }
    }

    /// The labelled part contributed by the end node of a relationship.
    pub fn relationship_end(&mut self, labels: &[u32], rel_type: u32) {
        for (at, &label) in labels.iter().enumerate() {
            if labels[..at].contains(&label) {
                continue;
            }
            for ty in [None, Some(rel_type)] {
                self.increment(CountsKey::Relationship {
                    start: None,
                    rel_type: ty,
                    end: Some(label),
                });
            }
        }
    }

    pub fn merge(&mut self, other: Self) {
        for (key, n) in other.counts {
            *self.counts.entry(key).or_insert(0) += n;
        }
    }

    #[must_use]
    pub fn get(&self, key: &CountsKey) -> i64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn into_inner(self) -> HashMap<CountsKey, i64> {
        self.counts
    }
}

/// Compares persisted counts with observed ones. Each differing key is
/// reported once.
pub fn check_counts(
    stored: &HashMap<CountsKey, i64>,
    observed: &ObservedCounts,
    reporter: &Reporter,
) {
    let mut differing: Vec<_> = observed
        .counts
        .iter()
        .filter_map(|(key, &n)| {
            let persisted = stored.get(key).copied().unwrap_or(0);
            (persisted != n).then_some(Kind::CountsMismatch {
                key: *key,
                stored: persisted,
                observed: n,
            })
        })
        .collect();
    differing.extend(stored.iter().filter_map(|(key, &n)| {
        (n != 0 && !observed.counts.contains_key(key))
            .then_some(Kind::CountsUnexpectedEntry { key: *key, stored: n })
    }));
    tracing::debug!(keys = observed.counts.len(), differing = differing.len(), "compared counts");
    for kind in differing {
        reporter.report(RecordType::Counts, None, kind);
    }
}
