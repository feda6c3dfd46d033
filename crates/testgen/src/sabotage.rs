//! Injects one named fault into a consistent store directory.
//!
//! Every fault is a small, targeted edit of records that a healthy writer
//! would never produce. The edited stores are rewritten in place; untouched
//! files stay as they are.

use core::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error, From};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use storecop_core::checker::schema::analyze_schema;
use storecop_core::checker::token::check_tokens;
use storecop_core::counts::{encode_counts, read_counts_store, CountsKey};
use storecop_core::error::{IndexError, StoreError};
use storecop_core::index::{encode_value_index, FileIndexProvider, IndexEntry, IndexProvider};
use storecop_core::schema::{IndexRule, IndexType, SchemaRule};
use storecop_core::store::dynamic::{chain_blocks, DynamicKind};
use storecop_core::store::format::{encode_store, NULL_REFERENCE};
use storecop_core::store::record::{
    is_null, Direction, DynamicRecord, NodeRecord, PropertyRecord, Record,
    RelationshipGroupRecord, RelationshipRecord, SchemaRecord, Side,
};
use storecop_core::store::record_store::RecordStore;
use storecop_core::store::value::Value;
use storecop_core::store::{Stores, COUNTS_STORE};
use storecop_core::tokens::Tokens;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Fault {
    /// The node total in the counts store is one too high.
    CountsOffByOne,
    /// A second schema record repeats an existing index rule.
    DuplicateIndexRule,
    /// A relationship is moved to two nodes that do not chain it.
    RelationshipToOtherNodes,
    /// Every first pointer of a relationship group names an unused record.
    GroupToUnusedRelationships,
    /// The last block of a multi-block string chain points back at the head.
    DynamicCycle,
    /// One entry is dropped from a value index.
    MissingIndexEntry,
    /// A value index gains an entry with values its entity does not have.
    ExtraIndexEntry,
    /// A node adopts the property chain of another node.
    SharedPropertyChain,
}

impl Fault {
    pub const ALL: [Self; 8] = [
        Self::CountsOffByOne,
        Self::DuplicateIndexRule,
        Self::RelationshipToOtherNodes,
        Self::GroupToUnusedRelationships,
        Self::DynamicCycle,
        Self::MissingIndexEntry,
        Self::ExtraIndexEntry,
        Self::SharedPropertyChain,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CountsOffByOne => "counts-off-by-one",
            Self::DuplicateIndexRule => "duplicate-index-rule",
            Self::RelationshipToOtherNodes => "relationship-to-other-nodes",
            Self::GroupToUnusedRelationships => "group-to-unused-relationships",
            Self::DynamicCycle => "dynamic-cycle",
            Self::MissingIndexEntry => "missing-index-entry",
            Self::ExtraIndexEntry => "extra-index-entry",
            Self::SharedPropertyChain => "shared-property-chain",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|fault| fault.name() == name)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Display, Error, From)]
pub enum SabotageError {
    #[from]
    Store(StoreError),
    #[from]
    Index(IndexError),
    #[display("could not write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[display("{fault} does not apply to this store: {reason}")]
    NotApplicable { fault: Fault, reason: String },
}

/// What a successful sabotage changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sabotaged {
    pub fault: Fault,
    pub description: String,
}

/// A store file held in memory as decoded records.
struct Table<R> {
    file: String,
    record_size: usize,
    records: Vec<R>,
    dirty: bool,
}

impl<R: Record> Table<R> {
    fn load(store: &RecordStore<R>) -> Self {
        Self {
            file: store.name().to_owned(),
            record_size: store.record_size(),
            records: store.scan().collect(),
            dirty: false,
        }
    }

    fn get(&self, id: u64) -> Option<&R> {
        usize::try_from(id).ok().and_then(|at| self.records.get(at))
    }

    fn get_mut(&mut self, id: u64) -> Option<&mut R> {
        self.dirty = true;
        usize::try_from(id).ok().and_then(|at| self.records.get_mut(at))
    }

    fn next_id(&self) -> u64 {
        self.records.len() as u64
    }

    fn push(&mut self, record: R) {
        self.dirty = true;
        self.records.push(record);
    }

    fn save(&self, dir: &Path) -> Result<(), SabotageError> {
        if !self.dirty {
            return Ok(());
        }
        let high_id = self.records.len() as u64;
        let bytes = encode_store(R::KIND, self.record_size, high_id, &self.records, |r, slot| {
            r.encode(slot);
            r.id()
        });
        write_file(dir.join(&self.file), &bytes)
    }
}

fn append_chain(table: &mut Table<DynamicRecord>, kind: DynamicKind, payload: &[u8]) -> u64 {
    let capacity = table.record_size - DynamicRecord::HEADER_SIZE;
    let first = table.next_id();
    for block in chain_blocks(kind, capacity, first, payload) {
        table.push(block);
    }
    first
}

/// The stores a fault may touch, decoded.
struct Image {
    nodes: Table<NodeRecord>,
    relationships: Table<RelationshipRecord>,
    groups: Table<RelationshipGroupRecord>,
    properties: Table<PropertyRecord>,
    schema: Table<SchemaRecord>,
    strings: Table<DynamicRecord>,
    arrays: Table<DynamicRecord>,
}

impl Image {
    fn load(stores: &Stores) -> Self {
        Self {
            nodes: Table::load(&stores.nodes),
            relationships: Table::load(&stores.relationships),
            groups: Table::load(&stores.groups),
            properties: Table::load(&stores.properties),
            schema: Table::load(&stores.schema),
            strings: Table::load(stores.strings.records()),
            arrays: Table::load(stores.arrays.records()),
        }
    }

    fn save(&self, dir: &Path) -> Result<(), SabotageError> {
        self.nodes.save(dir)?;
        self.relationships.save(dir)?;
        self.groups.save(dir)?;
        self.properties.save(dir)?;
        self.schema.save(dir)?;
        self.strings.save(dir)?;
        self.arrays.save(dir)
    }

    /// Appends a fresh property chain holding `values`.
    fn append_properties(&mut self, values: &[(u32, Value)]) -> u64 {
        if values.is_empty() {
            return NULL_REFERENCE;
        }
        let first = self.properties.next_id();
        let (strings, arrays) = (&mut self.strings, &mut self.arrays);
        for (id, group) in (first..).zip(values.chunks(PropertyRecord::BLOCKS)) {
            let mut record = PropertyRecord::new(id);
            if id > first {
                record.prev = id - 1;
            }
            for (slot, (key, value)) in record.blocks.iter_mut().zip(group) {
                *slot = value.to_block(*key, |kind, payload| match kind {
                    DynamicKind::Array => append_chain(arrays, kind, &payload),
                    _ => append_chain(strings, kind, &payload),
                });
            }
            if let Some(last) = self.properties.records.last_mut().filter(|_| id > first) {
                last.next = id;
            }
            self.properties.push(record);
        }
        first
    }
}

fn write_file(path: PathBuf, bytes: &[u8]) -> Result<(), SabotageError> {
    fs::write(&path, bytes).map_err(|source| SabotageError::Io { path, source })
}

/// Applies `fault` to the store in `dir`.
///
/// # Errors
///
/// Returns [`SabotageError::NotApplicable`] when the store has nothing the
/// fault could break, and a store, index or I/O error when files cannot be
/// read or written.
pub fn sabotage(dir: &Path, fault: Fault) -> Result<Sabotaged, SabotageError> {
    let stores = Stores::open(dir)?;
    let tokens = check_tokens(&stores, |_, _, _| {});
    let mut image = Image::load(&stores);
    let not_applicable = |reason: &str| SabotageError::NotApplicable {
        fault,
        reason: reason.to_owned(),
    };
    let description = match fault {
        Fault::CountsOffByOne => counts_off_by_one(dir)?,
        Fault::DuplicateIndexRule => duplicate_index_rule(&stores, &tokens, &mut image)
            .ok_or_else(|| not_applicable("no index rule without an owner"))?,
        Fault::RelationshipToOtherNodes => relationship_to_other_nodes(&mut image)
            .ok_or_else(|| not_applicable("needs a lone relationship and two isolated nodes"))?,
        Fault::GroupToUnusedRelationships => group_to_unused(&mut image)
            .ok_or_else(|| not_applicable("no relationship group in use"))?,
        Fault::DynamicCycle => dynamic_cycle(&mut image)
            .ok_or_else(|| not_applicable("no string chain spans two blocks"))?,
        Fault::MissingIndexEntry | Fault::ExtraIndexEntry => {
            let rules = analyze_schema(&stores, &tokens).rules;
            edit_value_index(dir, &rules, fault == Fault::MissingIndexEntry)?
                .ok_or_else(|| not_applicable("no value index has entries"))?
        }
        Fault::SharedPropertyChain => shared_property_chain(&mut image)
            .ok_or_else(|| not_applicable("needs two nodes with properties"))?,
    };
    drop(stores);
    image.save(dir)?;
    info!(dir = %dir.display(), %fault, %description, "sabotaged store");
    Ok(Sabotaged { fault, description })
}

/// Applies the first fault, in random order, that fits the store.
///
/// # Errors
///
/// Returns the last [`SabotageError`] when no fault applies.
pub fn sabotage_random<R: Rng + ?Sized>(
    dir: &Path,
    rng: &mut R,
) -> Result<Sabotaged, SabotageError> {
    let mut faults = Fault::ALL;
    faults.shuffle(rng);
    let mut last = None;
    for fault in faults {
        match sabotage(dir, fault) {
            Err(error @ SabotageError::NotApplicable { .. }) => last = Some(error),
            other => return other,
        }
    }
    Err(last.unwrap_or_else(|| SabotageError::NotApplicable {
        fault: Fault::CountsOffByOne,
        reason: "no fault applies".to_owned(),
    }))
}

fn counts_off_by_one(dir: &Path) -> Result<String, SabotageError> {
    let path = dir.join(COUNTS_STORE);
    let mut counts = read_counts_store(&path)?;
    *counts.entry(CountsKey::Node { label: None }).or_insert(0) += 1;
    write_file(path, &encode_counts(&counts))?;
    Ok("raised the total node count by one".to_owned())
}

fn duplicate_index_rule(stores: &Stores, tokens: &Tokens, image: &mut Image) -> Option<String> {
    let rules = analyze_schema(stores, tokens).rules;
    let original = rules.iter().find_map(|rule| match rule {
        SchemaRule::Index(index) if index.owning_constraint.is_none() => Some(index),
        _ => None,
    })?;
    let fields: Vec<(u32, Value)> = SchemaRule::Index(original.clone())
        .fields()
        .into_iter()
        .filter_map(|(name, value)| Some((tokens.property_keys.find(name)?, value)))
        .collect();
    let id = image.schema.next_id();
    let next_prop = image.append_properties(&fields);
    image.schema.push(SchemaRecord {
        id,
        in_use: true,
        next_prop,
    });
    Some(format!("schema record {id} repeats index rule {}", original.id))
}

/// Degree-one chain head on `side`: first in chain and declaring one member.
fn alone_on(relationship: &RelationshipRecord, side: Side) -> bool {
    relationship.is_first_in_chain(side)
        && relationship.prev(side) == 1
        && is_null(relationship.next(side))
}

fn relationship_to_other_nodes(image: &mut Image) -> Option<String> {
    let sparse = |node: &NodeRecord| node.in_use && !node.dense;
    let nodes = &image.nodes.records;
    let moved = image.relationships.records.iter().find(|r| {
        let endpoints_sparse = [r.first_node, r.second_node]
            .iter()
            .all(|&n| image.nodes.get(n).is_some_and(sparse));
        r.in_use
            && !r.is_loop()
            && endpoints_sparse
            && alone_on(r, Side::First)
            && alone_on(r, Side::Second)
    })?;
    let mut isolated = nodes
        .iter()
        .filter(|&n| sparse(n) && is_null(n.next_rel))
        .map(|n| n.id);
    let (first, second) = (isolated.next()?, isolated.next()?);
    let id = moved.id;
    let record = image.relationships.get_mut(id)?;
    record.first_node = first;
    record.second_node = second;
    Some(format!("relationship {id} now connects nodes {first} and {second}"))
}

fn group_to_unused(image: &mut Image) -> Option<String> {
    let unused = image.relationships.next_id();
    let id = image.groups.records.iter().find(|g| g.in_use)?.id;
    let group = image.groups.get_mut(id)?;
    for direction in Direction::ALL {
        group.set_first(direction, unused);
    }
    Some(format!("group {id} points at unused relationship {unused}"))
}

fn dynamic_cycle(image: &mut Image) -> Option<String> {
    let blocks = &image.strings.records;
    let referenced: Vec<u64> = blocks
        .iter()
        .filter(|b| b.in_use && !is_null(b.next))
        .map(|b| b.next)
        .collect();
    let head = blocks
        .iter()
        .find(|b| b.in_use && !is_null(b.next) && !referenced.contains(&b.id))?
        .id;
    let mut last = head;
    for _ in 0..blocks.len() {
        match image.strings.get(last) {
            Some(block) if !is_null(block.next) => last = block.next,
            _ => break,
        }
    }
    image.strings.get_mut(last)?.next = head;
    Some(format!("string block {last} points back at chain head {head}"))
}

fn shared_property_chain(image: &mut Image) -> Option<String> {
    let mut owners = image
        .nodes
        .records
        .iter()
        .filter(|n| n.in_use && !is_null(n.next_prop));
    let (donor, adopter) = (owners.next()?, owners.next()?);
    let (chain, id) = (donor.next_prop, adopter.id);
    let donor = donor.id;
    image.nodes.get_mut(id)?.next_prop = chain;
    Some(format!("node {id} shares the property chain of node {donor}"))
}

/// Drops the first entry of, or adds a bogus entry to, the first non-empty
/// value index.
fn edit_value_index(
    dir: &Path,
    rules: &[SchemaRule],
    remove: bool,
) -> Result<Option<String>, SabotageError> {
    let provider = FileIndexProvider::new(dir);
    let indexes = rules.iter().filter_map(|rule| match rule {
        SchemaRule::Index(index) if index.index_type != IndexType::Lookup => Some(index),
        _ => None,
    });
    for rule in indexes {
        let mut entries: Vec<IndexEntry> = {
            let accessor = provider.lookup(rule)?;
            let reader = accessor.new_reader();
            reader.entries().collect()
        };
        let Some(first) = entries.first().cloned() else {
            continue;
        };
        let description = if remove {
            entries.remove(0);
            format!("index {} lost the entry of entity {}", rule.id, first.entity)
        } else {
            entries.push(IndexEntry {
                entity: first.entity,
                values: bogus_values(rule),
            });
            format!("index {} gained a bogus entry for entity {}", rule.id, first.entity)
        };
        let path = FileIndexProvider::value_index_path(dir, rule.id);
        write_file(path, &encode_value_index(&entries))?;
        return Ok(Some(description));
    }
    Ok(None)
}

fn bogus_values(rule: &IndexRule) -> Vec<Value> {
    rule.properties
        .iter()
        .map(|_| Value::String("storecop sabotage".to_owned()))
        .collect()
}
