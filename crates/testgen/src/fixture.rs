//! Writes consistent store directories from a logical graph.
//!
//! A [`Graph`] names its tokens and lists nodes, relationships and indexes by
//! position. [`write_store`] lays them out the way a healthy store would be:
//! sorted label fields, relationship chains whose heads carry the degree,
//! relationship groups for dense nodes, schema rules as property chains, and
//! index and counts files matching the data exactly.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use storecop_core::counts::{encode_counts, ObservedCounts};
use storecop_core::index::strategy::expected_values;
use storecop_core::index::token::TokenIndex;
use storecop_core::index::{encode_value_index, FileIndexProvider, IndexEntry};
use storecop_core::schema::{
    ConstraintRule, ConstraintType, EntityType, IndexRule, IndexType, SchemaRule,
    DEFAULT_PROVIDER, SCHEMA_KEYS,
};
use storecop_core::store::dynamic::{chain_blocks, DynamicKind};
use storecop_core::store::format::{encode_store, NULL_REFERENCE};
use storecop_core::store::labels::{encode_dynamic, pack_inline, LabelField};
use storecop_core::store::record::{
    Direction, DynamicRecord, NodeRecord, PropertyRecord, Record, RelationshipGroupRecord,
    RelationshipRecord, SchemaRecord, Side, TokenRecord,
};
use storecop_core::store::value::Value;
use storecop_core::store::{
    TokenKind, COUNTS_STORE, NODE_STORE, PROPERTY_STORE, RELATIONSHIP_GROUP_STORE,
    RELATIONSHIP_STORE, SCHEMA_STORE,
};
use tracing::{debug, info};
use typed_builder::TypedBuilder;

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct NodeSpec {
    pub labels: Vec<u32>,
    pub properties: Vec<(u32, Value)>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RelationshipSpec {
    pub start: u64,
    pub end: u64,
    pub rel_type: u32,
    pub properties: Vec<(u32, Value)>,
}

/// A value index over `properties` of entities carrying any of `tokens`.
///
/// A unique index is written as a range index owned by a uniqueness
/// constraint.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IndexSpec {
    pub name: String,
    pub entity: EntityType,
    pub tokens: Vec<u32>,
    pub properties: Vec<u32>,
    pub index_type: IndexType,
    pub unique: bool,
}

/// The logical content of a store. Entities are identified by position.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Graph {
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
    /// User keys only; schema keys are appended when the store is written.
    pub property_keys: Vec<String>,
    pub nodes: Vec<NodeSpec>,
    pub relationships: Vec<RelationshipSpec>,
    pub indexes: Vec<IndexSpec>,
}

impl Graph {
    /// Id the property key `name` gets in a written store.
    #[must_use]
    pub fn property_key(&self, name: &str) -> Option<u32> {
        let user = self.property_keys.iter().position(|key| key == name);
        let schema = || {
            SCHEMA_KEYS
                .iter()
                .position(|key| *key == name)
                .map(|at| self.property_keys.len() + at)
        };
        user.or_else(schema).and_then(|id| u32::try_from(id).ok())
    }

    /// Number of relationship chain entries of every node. A loop counts once.
    #[must_use]
    pub fn degrees(&self) -> Vec<usize> {
        let mut degrees = vec![0; self.nodes.len()];
        for relationship in &self.relationships {
            for node in endpoints(relationship) {
                let slot = usize::try_from(node).ok().and_then(|n| degrees.get_mut(n));
                if let Some(degree) = slot {
                    *degree += 1;
                }
            }
        }
        degrees
    }
}

/// Physical choices that do not change what the graph means.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, TypedBuilder)]
pub struct Layout {
    /// Nodes with at least this many chain entries get relationship groups.
    #[builder(default = 8)]
    pub dense_threshold: usize,
    /// Payload bytes per dynamic record.
    #[builder(default = 32)]
    pub block_capacity: usize,
    /// Also write a label lookup and a relationship type lookup index.
    #[builder(default = true)]
    pub token_indexes: bool,
}

impl Default for Layout {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Display, Error)]
pub enum FixtureError {
    #[display("graph cannot be written: {reason}")]
    Invalid { reason: String },
    #[display("could not write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl FixtureError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// Writes `graph` as a complete store directory under `dir`.
///
/// # Errors
///
/// Returns [`FixtureError::Invalid`] when the graph refers to tokens or nodes
/// it does not define, repeats a property key on one entity, or uses a
/// reserved key name, and [`FixtureError::Io`] when a file cannot be written.
pub fn write_store(dir: &Path, graph: &Graph, layout: &Layout) -> Result<(), FixtureError> {
    validate(graph, layout)?;
    fs::create_dir_all(dir).map_err(|source| FixtureError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut writer = Writer::new(graph, layout);
    writer.tokens();
    writer.nodes();
    writer.relationships();
    writer.chains();
    let rules = writer.schema();
    writer.write(dir)?;
    write_counts(dir, graph)?;
    write_indexes(dir, graph, &rules)?;
    info!(
        dir = %dir.display(),
        nodes = graph.nodes.len(),
        relationships = graph.relationships.len(),
        rules = rules.len(),
        "wrote store"
    );
    Ok(())
}

fn validate(graph: &Graph, layout: &Layout) -> Result<(), FixtureError> {
    if layout.block_capacity == 0 {
        return Err(FixtureError::invalid("block capacity must be positive"));
    }
    if let Some(key) = graph.property_keys.iter().find(|k| SCHEMA_KEYS.contains(&k.as_str())) {
        return Err(FixtureError::invalid(format!("property key {key:?} is reserved")));
    }
    let known = |id: u32, names: &[String]| (id as usize) < names.len();
    let check_properties = |owner: &str, properties: &[(u32, Value)]| {
        for (at, (key, _)) in properties.iter().enumerate() {
            if !known(*key, &graph.property_keys) {
                return Err(FixtureError::invalid(format!("{owner} uses unknown key {key}")));
            }
            if properties[..at].iter().any(|(k, _)| k == key) {
                return Err(FixtureError::invalid(format!("{owner} repeats key {key}")));
            }
        }
        Ok(())
    };
    for (id, node) in graph.nodes.iter().enumerate() {
        if let Some(label) = node.labels.iter().find(|&&l| !known(l, &graph.labels)) {
            return Err(FixtureError::invalid(format!("node {id} has unknown label {label}")));
        }
        check_properties(&format!("node {id}"), &node.properties)?;
    }
    let node_count = graph.nodes.len() as u64;
    for (id, relationship) in graph.relationships.iter().enumerate() {
        if relationship.start >= node_count || relationship.end >= node_count {
            return Err(FixtureError::invalid(format!(
                "relationship {id} connects a node that does not exist"
            )));
        }
        if !known(relationship.rel_type, &graph.relationship_types) {
            return Err(FixtureError::invalid(format!(
                "relationship {id} has unknown type {}",
                relationship.rel_type
            )));
        }
        check_properties(&format!("relationship {id}"), &relationship.properties)?;
    }
    for index in &graph.indexes {
        let names = match index.entity {
            EntityType::Node => &graph.labels,
            EntityType::Relationship => &graph.relationship_types,
        };
        let tokens_known = index.tokens.iter().all(|&t| known(t, names));
        let keys_known = index.properties.iter().all(|&k| known(k, &graph.property_keys));
        if index.tokens.is_empty() || index.properties.is_empty() || !tokens_known || !keys_known {
            return Err(FixtureError::invalid(format!("index {:?} has a bad schema", index.name)));
        }
        let range = index.index_type == IndexType::Range;
        if index.index_type == IndexType::Lookup || (index.unique && !range) {
            return Err(FixtureError::invalid(format!(
                "index {:?} has an unsupported type",
                index.name
            )));
        }
    }
    Ok(())
}

/// Nodes whose chain the relationship takes part in; a loop appears once.
fn endpoints(relationship: &RelationshipSpec) -> impl Iterator<Item = u64> {
    let second = (relationship.end != relationship.start).then_some(relationship.end);
    core::iter::once(relationship.start).chain(second)
}

fn sorted_labels(node: &NodeSpec) -> Vec<u32> {
    let mut labels = node.labels.clone();
    labels.sort_unstable();
    labels.dedup();
    labels
}

fn dynamic_slot(kind: DynamicKind) -> usize {
    DynamicKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or_default()
}

/// Record images built in memory before anything touches the disk.
struct Writer<'a> {
    graph: &'a Graph,
    layout: &'a Layout,
    nodes: Vec<NodeRecord>,
    relationships: Vec<RelationshipRecord>,
    groups: Vec<RelationshipGroupRecord>,
    properties: Vec<PropertyRecord>,
    schema: Vec<SchemaRecord>,
    tokens: [Vec<TokenRecord>; 3],
    dynamic: [Vec<DynamicRecord>; 6],
}

impl<'a> Writer<'a> {
    fn new(graph: &'a Graph, layout: &'a Layout) -> Self {
        Self {
            graph,
            layout,
            nodes: Vec::new(),
            relationships: Vec::new(),
            groups: Vec::new(),
            properties: Vec::new(),
            schema: Vec::new(),
            tokens: Default::default(),
            dynamic: Default::default(),
        }
    }

    fn chain(&mut self, kind: DynamicKind, payload: &[u8]) -> u64 {
        let blocks = &mut self.dynamic[dynamic_slot(kind)];
        let first = blocks.len() as u64;
        blocks.extend(chain_blocks(kind, self.layout.block_capacity, first, payload));
        first
    }

    fn property_chain(&mut self, values: &[(u32, Value)]) -> u64 {
        if values.is_empty() {
            return NULL_REFERENCE;
        }
        let first = self.properties.len() as u64;
        for (at, group) in (first..).zip(values.chunks(PropertyRecord::BLOCKS)) {
            let mut record = PropertyRecord::new(at);
            if at > first {
                record.prev = at - 1;
            }
            for (slot, (key, value)) in record.blocks.iter_mut().zip(group) {
                *slot = value.to_block(*key, |kind, payload| self.chain(kind, &payload));
            }
            if let Some(last) = self.properties.last_mut().filter(|_| at > first) {
                last.next = at;
            }
            self.properties.push(record);
        }
        first
    }

    fn tokens(&mut self) {
        let graph = self.graph;
        for (slot, kind) in TokenKind::ALL.into_iter().enumerate() {
            let names: Vec<(&str, bool)> = match kind {
                TokenKind::Label => graph.labels.iter().map(|n| (n.as_str(), false)).collect(),
                TokenKind::RelationshipType => graph
                    .relationship_types
                    .iter()
                    .map(|n| (n.as_str(), false))
                    .collect(),
                TokenKind::PropertyKey => graph
                    .property_keys
                    .iter()
                    .map(|n| (n.as_str(), false))
                    .chain(SCHEMA_KEYS.iter().map(|n| (*n, true)))
                    .collect(),
            };
            for (id, (name, internal)) in (0..).zip(names) {
                let name = self.chain(kind.names(), name.as_bytes());
                self.tokens[slot].push(TokenRecord {
                    id,
                    in_use: true,
                    internal,
                    name,
                });
            }
        }
    }

    fn nodes(&mut self) {
        let graph = self.graph;
        for (id, node) in (0..).zip(&graph.nodes) {
            let labels = sorted_labels(node);
            let mut record = NodeRecord::new(id);
            record.labels = match pack_inline(&labels) {
                Some(field) => field,
                None => {
                    let first = self.chain(DynamicKind::NodeLabels, &encode_dynamic(id, &labels));
                    LabelField::dynamic(first)
                }
            };
            record.next_prop = self.property_chain(&node.properties);
            self.nodes.push(record);
        }
    }

    fn relationships(&mut self) {
        let graph = self.graph;
        for (id, relationship) in (0..).zip(&graph.relationships) {
            let RelationshipSpec {
                start,
                end,
                rel_type,
                ..
            } = *relationship;
            let mut record = RelationshipRecord::new(id, start, end, rel_type);
            record.next_prop = self.property_chain(&relationship.properties);
            self.relationships.push(record);
        }
    }

    /// Links `chain` on the given sides. The head stores the chain length.
    fn link(&mut self, chain: &[(u64, Side)]) -> u64 {
        let Some(&(head, _)) = chain.first() else {
            return NULL_REFERENCE;
        };
        for (at, &(id, side)) in chain.iter().enumerate() {
            let prev = if at == 0 { chain.len() as u64 } else { chain[at - 1].0 };
            let next = chain.get(at + 1).map_or(NULL_REFERENCE, |&(next, _)| next);
            #[allow(clippy::cast_possible_truncation)]
            let record = &mut self.relationships[id as usize];
            record.set_first_in_chain(side, at == 0);
            record.set_prev(side, prev);
            record.set_next(side, next);
        }
        head
    }

    fn chains(&mut self) {
        let mut members: Vec<Vec<(u64, Side)>> = vec![Vec::new(); self.nodes.len()];
        for (id, relationship) in (0..).zip(&self.graph.relationships) {
            #[allow(clippy::cast_possible_truncation)]
            let (start, end) = (relationship.start as usize, relationship.end as usize);
            members[start].push((id, Side::First));
            if end != start {
                members[end].push((id, Side::Second));
            }
        }
        let mut dense = 0usize;
        for (node, chain) in (0..).zip(members) {
            #[allow(clippy::cast_possible_truncation)]
            let at = node as usize;
            if chain.len() < self.layout.dense_threshold {
                self.nodes[at].next_rel = self.link(&chain);
                continue;
            }
            dense += 1;
            self.nodes[at].dense = true;
            self.nodes[at].next_rel = self.link_groups(node, &chain);
        }
        debug!(dense, groups = self.groups.len(), "linked relationship chains");
    }

    /// Writes one group per relationship type of `node`, ordered by type.
    fn link_groups(&mut self, node: u64, chain: &[(u64, Side)]) -> u64 {
        let mut by_type: BTreeMap<u32, [Vec<(u64, Side)>; 3]> = BTreeMap::new();
        for &(id, side) in chain {
            #[allow(clippy::cast_possible_truncation)]
            let record = &self.relationships[id as usize];
            let direction = if record.is_loop() {
                Direction::Loop
            } else if side == Side::First {
                Direction::Outgoing
            } else {
                Direction::Incoming
            };
            let slot = Direction::ALL.iter().position(|d| *d == direction).unwrap_or_default();
            by_type.entry(record.rel_type).or_default()[slot].push((id, side));
        }
        let first = self.groups.len() as u64;
        let count = by_type.len() as u64;
        for (at, (rel_type, chains)) in (first..).zip(by_type) {
            let mut group = RelationshipGroupRecord::new(at, node, rel_type);
            for (direction, chain) in Direction::ALL.into_iter().zip(chains) {
                let head = self.link(&chain);
                group.set_first(direction, head);
            }
            group.next = if at + 1 < first + count { at + 1 } else { NULL_REFERENCE };
            self.groups.push(group);
        }
        if count == 0 {
            NULL_REFERENCE
        } else {
            first
        }
    }

    /// Writes the schema records and returns the rules they hold.
    fn schema(&mut self) -> Vec<SchemaRule> {
        let graph = self.graph;
        let mut rules = Vec::new();
        for index in &graph.indexes {
            let id = rules.len() as u64;
            let owner = index.unique.then_some(id + 1);
            rules.push(SchemaRule::Index(IndexRule {
                id,
                name: index.name.clone(),
                entity: index.entity,
                tokens: index.tokens.clone(),
                properties: index.properties.clone(),
                index_type: index.index_type,
                provider: DEFAULT_PROVIDER.to_owned(),
                owning_constraint: owner,
            }));
            if let Some(constraint) = owner {
                rules.push(SchemaRule::Constraint(ConstraintRule {
                    id: constraint,
                    name: format!("{}_unique", index.name),
                    entity: index.entity,
                    tokens: index.tokens.clone(),
                    properties: index.properties.clone(),
                    constraint_type: ConstraintType::Unique,
                    owned_index: Some(id),
                }));
            }
        }
        if self.layout.token_indexes {
            for (entity, name) in [
                (EntityType::Node, "label_lookup"),
                (EntityType::Relationship, "relationship_type_lookup"),
            ] {
                rules.push(SchemaRule::Index(IndexRule {
                    id: rules.len() as u64,
                    name: name.to_owned(),
                    entity,
                    tokens: Vec::new(),
                    properties: Vec::new(),
                    index_type: IndexType::Lookup,
                    provider: DEFAULT_PROVIDER.to_owned(),
                    owning_constraint: None,
                }));
            }
        }
        for rule in &rules {
            let fields: Vec<(u32, Value)> = rule
                .fields()
                .into_iter()
                .filter_map(|(name, value)| Some((graph.property_key(name)?, value)))
                .collect();
            let next_prop = self.property_chain(&fields);
            self.schema.push(SchemaRecord {
                id: rule.id(),
                in_use: true,
                next_prop,
            });
        }
        rules
    }

    fn write(&self, dir: &Path) -> Result<(), FixtureError> {
        write_records(dir, NODE_STORE, NodeRecord::SIZE, &self.nodes)?;
        write_records(dir, RELATIONSHIP_STORE, RelationshipRecord::SIZE, &self.relationships)?;
        let group_size = RelationshipGroupRecord::SIZE;
        write_records(dir, RELATIONSHIP_GROUP_STORE, group_size, &self.groups)?;
        write_records(dir, PROPERTY_STORE, PropertyRecord::SIZE, &self.properties)?;
        write_records(dir, SCHEMA_STORE, SchemaRecord::SIZE, &self.schema)?;
        for (kind, records) in TokenKind::ALL.into_iter().zip(&self.tokens) {
            write_records(dir, kind.file_name(), TokenRecord::SIZE, records)?;
        }
        let size = DynamicRecord::HEADER_SIZE + self.layout.block_capacity;
        for (kind, records) in DynamicKind::ALL.into_iter().zip(&self.dynamic) {
            write_records(dir, kind.file_name(), size, records)?;
        }
        Ok(())
    }
}

fn write_file(path: PathBuf, bytes: &[u8]) -> Result<(), FixtureError> {
    fs::write(&path, bytes).map_err(|source| FixtureError::Io { path, source })
}

/// Writes `records`, whose ids are their positions, as the store file `name`.
fn write_records<R: Record>(
    dir: &Path,
    name: &str,
    size: usize,
    records: &[R],
) -> Result<(), FixtureError> {
    let bytes = encode_store(R::KIND, size, records.len() as u64, records, |record, slot| {
        record.encode(slot);
        record.id()
    });
    write_file(dir.join(name), &bytes)
}

/// Counts exactly as a check observes them.
#[must_use]
pub fn observed_counts(graph: &Graph) -> ObservedCounts {
    let labels: Vec<Vec<u32>> = graph.nodes.iter().map(sorted_labels).collect();
    let mut counts = ObservedCounts::default();
    for node in &labels {
        counts.node(node);
    }
    for relationship in &graph.relationships {
        counts.relationship(relationship.rel_type);
        #[allow(clippy::cast_possible_truncation)]
        let (start, end) = (relationship.start as usize, relationship.end as usize);
        counts.relationship_start(&labels[start], relationship.rel_type);
        counts.relationship_end(&labels[end], relationship.rel_type);
    }
    counts
}

fn write_counts(dir: &Path, graph: &Graph) -> Result<(), FixtureError> {
    let counts = observed_counts(graph).into_inner();
    write_file(dir.join(COUNTS_STORE), &encode_counts(&counts))
}

fn write_indexes(dir: &Path, graph: &Graph, rules: &[SchemaRule]) -> Result<(), FixtureError> {
    let node_tokens: Vec<Vec<u32>> = graph.nodes.iter().map(sorted_labels).collect();
    let relationship_tokens: Vec<Vec<u32>> =
        graph.relationships.iter().map(|r| vec![r.rel_type]).collect();
    for rule in rules {
        let SchemaRule::Index(rule) = rule else {
            continue;
        };
        let tokens = match rule.entity {
            EntityType::Node => &node_tokens,
            EntityType::Relationship => &relationship_tokens,
        };
        if rule.index_type == IndexType::Lookup {
            let entries: HashMap<u64, Vec<u32>> = (0..)
                .zip(tokens)
                .filter(|(_, tokens)| !tokens.is_empty())
                .map(|(entity, tokens)| (entity, tokens.clone()))
                .collect();
            let path = FileIndexProvider::token_index_path(dir, rule.id);
            write_file(path, &TokenIndex::new(entries).encode())?;
            continue;
        }
        let values: Vec<&[(u32, Value)]> = match rule.entity {
            EntityType::Node => graph.nodes.iter().map(|n| n.properties.as_slice()).collect(),
            EntityType::Relationship => graph
                .relationships
                .iter()
                .map(|r| r.properties.as_slice())
                .collect(),
        };
        let entries: Vec<IndexEntry> = (0..)
            .zip(tokens.iter().zip(values))
            .filter_map(|(entity, (tokens, values))| {
                expected_values(rule, tokens, values).map(|values| IndexEntry { entity, values })
            })
            .collect();
        debug!(rule = rule.id, entries = entries.len(), "writing value index");
        let path = FileIndexProvider::value_index_path(dir, rule.id);
        write_file(path, &encode_value_index(&entries))?;
    }
    Ok(())
}
