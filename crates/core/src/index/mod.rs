//! Index access and the index cross-checks.
//!
//! Indexes live outside the record stores. The checker reaches them through
//! [`IndexProvider`], so other index implementations can be plugged in; the
//! bundled [`FileIndexProvider`] reads the `index-<rule id>.idx` and
//! `index-<rule id>.tokens` files of a store directory.

pub mod strategy;
pub mod token;

use core::cmp::Ordering;
use core::fmt;
use std::io;
use std::path::{Path, PathBuf};

use hashbrown::HashMap;

use self::token::TokenIndex;
use crate::error::IndexError;
use crate::schema::IndexRule;
use crate::store::format::{get_u16, get_u64, put_u16, put_u64};
use crate::store::value::Value;

const MAGIC: [u8; 4] = *b"SCIX";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 16;

/// One entity and the values it is indexed under.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub entity: u64,
    pub values: Vec<Value>,
}

/// Read view of one value index.
pub trait IndexReader {
    /// Entities indexed under exactly `values`.
    fn lookup(&self, values: &[Value]) -> Vec<u64>;

    /// Entities whose first value lies in `from..=to`.
    fn range(&self, from: &Value, to: &Value) -> Vec<u64>;

    /// Every entry, in file order.
    fn entries(&self) -> Box<dyn Iterator<Item = IndexEntry> + '_>;

    fn contains(&self, entity: u64, values: &[Value]) -> bool {
        self.lookup(values).contains(&entity)
    }
}

/// An opened value index.
pub trait IndexAccessor: Send + Sync + fmt::Debug {
    fn entry_count(&self) -> u64;

    fn new_reader(&self) -> Box<dyn IndexReader + '_>;
}

/// Opens the indexes described by schema rules.
pub trait IndexProvider: Send + Sync {
    /// # Errors
    ///
    /// Fails when the index of `rule` is absent or unreadable.
    fn lookup(&self, rule: &IndexRule) -> Result<Box<dyn IndexAccessor>, IndexError>;

    /// # Errors
    ///
    /// Fails when the token index of `rule` is absent or unreadable.
    fn token_index(&self, rule: &IndexRule) -> Result<TokenIndex, IndexError>;
}

/// Reads index files next to the stores.
#[derive(Debug, Clone)]
pub struct FileIndexProvider {
    dir: PathBuf,
}

impl FileIndexProvider {
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    #[must_use]
    pub fn value_index_path(dir: &Path, rule: u64) -> PathBuf {
        dir.join(format!("index-{rule}.idx"))
    }

    #[must_use]
    pub fn token_index_path(dir: &Path, rule: u64) -> PathBuf {
        dir.join(format!("index-{rule}.tokens"))
    }
}

pub(crate) fn read_index_file(rule: u64, path: &Path) -> Result<Vec<u8>, IndexError> {
    std::fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            IndexError::Missing {
                rule,
                path: path.to_path_buf(),
            }
        } else {
            IndexError::Io { rule, source }
        }
    })
}

impl IndexProvider for FileIndexProvider {
    fn lookup(&self, rule: &IndexRule) -> Result<Box<dyn IndexAccessor>, IndexError> {
        let path = Self::value_index_path(&self.dir, rule.id);
        let bytes = read_index_file(rule.id, &path)?;
        let entries = decode_value_index(rule.id, &bytes)?;
        tracing::debug!(rule = rule.id, entries = entries.len(), "opened value index");
        Ok(Box::new(FileIndex::new(entries)))
    }

    fn token_index(&self, rule: &IndexRule) -> Result<TokenIndex, IndexError> {
        let path = Self::token_index_path(&self.dir, rule.id);
        let bytes = read_index_file(rule.id, &path)?;
        TokenIndex::decode(rule.id, &bytes)
    }
}

/// A value index held in memory.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    entries: Vec<IndexEntry>,
    by_key: HashMap<Vec<u8>, Vec<u64>>,
}

impl FileIndex {
    #[must_use]
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        let mut by_key: HashMap<Vec<u8>, Vec<u64>> = HashMap::new();
        for entry in &entries {
            by_key
                .entry(Value::key_of(&entry.values))
                .or_default()
                .push(entry.entity);
        }
        Self { entries, by_key }
    }
}

impl IndexAccessor for FileIndex {
    fn entry_count(&self) -> u64 {
        self.entries.len() as u64
    }

    fn new_reader(&self) -> Box<dyn IndexReader + '_> {
        Box::new(self)
    }
}

impl IndexReader for &FileIndex {
    fn lookup(&self, values: &[Value]) -> Vec<u64> {
        self.by_key
            .get(&Value::key_of(values))
            .cloned()
            .unwrap_or_default()
    }

    fn range(&self, from: &Value, to: &Value) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|entry| {
                entry.values.first().is_some_and(|first| {
                    matches!(
                        compare(from, first),
                        Some(Ordering::Less | Ordering::Equal)
                    ) && matches!(compare(first, to), Some(Ordering::Less | Ordering::Equal))
                })
            })
            .map(|entry| entry.entity)
            .collect()
    }

    fn entries(&self) -> Box<dyn Iterator<Item = IndexEntry> + '_> {
        Box::new(self.entries.iter().cloned())
    }
}

/// Orders values of the same type; values of different types are unordered.
#[must_use]
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Array(a), Value::Array(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn malformed(rule: u64, reason: &str) -> IndexError {
    IndexError::Format {
        rule,
        reason: reason.to_owned(),
    }
}

/// # Errors
///
/// Returns [`IndexError::Format`] when the file is not a value index or an
/// entry is cut short.
pub fn decode_value_index(rule: u64, bytes: &[u8]) -> Result<Vec<IndexEntry>, IndexError> {
    if bytes.len() < HEADER_SIZE || bytes[0..4] != MAGIC || get_u16(bytes, 4) != VERSION {
        return Err(malformed(rule, "not a value index file"));
    }
    let count = get_u64(bytes, 8);
    let mut entries = Vec::new();
    let mut at = HEADER_SIZE;
    for _ in 0..count {
        let head = bytes
            .get(at..at + 9)
            .ok_or_else(|| malformed(rule, "truncated entry"))?;
        let entity = get_u64(head, 0);
        let mut values = Vec::with_capacity(usize::from(head[8]));
        at += 9;
        for _ in 0..head[8] {
            let (value, used) = Value::decode(&bytes[at..])
                .ok_or_else(|| malformed(rule, "undecodable value"))?;
            values.push(value);
            at += used;
        }
        entries.push(IndexEntry { entity, values });
    }
    Ok(entries)
}

#[must_use]
pub fn encode_value_index(entries: &[IndexEntry]) -> Vec<u8> {
    let mut out = vec![0u8; HEADER_SIZE];
    out[0..4].copy_from_slice(&MAGIC);
    put_u16(&mut out, 4, VERSION);
    put_u64(&mut out, 8, entries.len() as u64);
    for entry in entries {
        out.extend_from_slice(&entry.entity.to_le_bytes());
        #[allow(clippy::cast_possible_truncation)]
        out.push(entry.values.len() as u8);
        for value in &entry.values {
            value.encode(&mut out);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityType, IndexType, DEFAULT_PROVIDER};

    fn entries() -> Vec<IndexEntry> {
        vec![
            IndexEntry {
                entity: 1,
                values: vec![Value::Int(10)],
            },
            IndexEntry {
                entity: 2,
                values: vec![Value::Int(20)],
            },
            IndexEntry {
                entity: 3,
                values: vec![Value::Int(20)],
            },
            IndexEntry {
                entity: 4,
                values: vec![Value::String("x".into())],
            },
        ]
    }

    #[test]
    fn test_point_and_range_lookups() {
        let index = FileIndex::new(entries());
        let reader = index.new_reader();
        assert_eq!(reader.lookup(&[Value::Int(20)]), vec![2, 3]);
        assert!(reader.contains(1, &[Value::Int(10)]));
        assert!(!reader.contains(1, &[Value::Int(20)]));
        assert_eq!(reader.range(&Value::Int(5), &Value::Int(15)), vec![1]);
        assert_eq!(reader.range(&Value::Int(10), &Value::Int(20)), vec![1, 2, 3]);
        assert_eq!(reader.entries().count(), 4);
        assert_eq!(index.entry_count(), 4);
    }

    #[test]
    fn test_index_file() {
        let bytes = encode_value_index(&entries());
        assert_eq!(decode_value_index(7, &bytes).unwrap(), entries());
        assert!(decode_value_index(7, &bytes[..bytes.len() - 1]).is_err());
        assert!(decode_value_index(7, b"SCTX0000").is_err());
    }

    #[test]
    fn test_provider_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileIndexProvider::new(dir.path());
        let rule = IndexRule {
            id: 9,
            name: "idx".into(),
            entity: EntityType::Node,
            tokens: vec![0],
            properties: vec![0],
            index_type: IndexType::Range,
            provider: DEFAULT_PROVIDER.into(),
            owning_constraint: None,
        };
        assert!(matches!(
            provider.lookup(&rule),
            Err(IndexError::Missing { rule: 9, .. })
        ));
        std::fs::write(
            FileIndexProvider::value_index_path(dir.path(), 9),
            encode_value_index(&entries()),
        )
        .unwrap();
        assert_eq!(provider.lookup(&rule).unwrap().entry_count(), 4);
    }
}
