//! Entity/index agreement.
//!
//! Each value index is checked with one of two strategies, chosen once when
//! the index is opened:
//!
//! - [`Strategy::EntityFirst`] for small indexes: every entity that should be
//!   indexed is looked up with its exact values. Entries for entities that
//!   should not be in the index at all are not detected.
//! - [`Strategy::IndexFirst`] for large indexes: every entry is compared with
//!   the live entity it names, and entities that should be indexed are
//!   matched against a presence bitset filled from the entries.

use core::ops::Range;

use hashbrown::HashMap;
use rayon::prelude::*;

use super::token::TokenIndex;
use super::{IndexAccessor, IndexEntry, IndexProvider};
use crate::cache::AtomicBitset;
use crate::checker::node::resolve_labels;
use crate::checker::property::resolve_values;
use crate::checker::CheckContext;
use crate::error::IndexError;
use crate::report::{Kind, RecordType};
use crate::schema::{ConstraintType, EntityType, IndexRule, IndexType, SchemaRule};
use crate::store::value::Value;

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    EntityFirst,
    IndexFirst,
}

impl Strategy {
    /// An index is small when `entries / max(high_id, 1)` is below `ratio`.
    #[must_use]
    pub fn select(entries: u64, high_id: u64, ratio: f64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let selectivity = entries as f64 / high_id.max(1) as f64;
        if selectivity < ratio {
            Self::EntityFirst
        } else {
            Self::IndexFirst
        }
    }
}

#[derive(Debug)]
pub struct CheckedIndex {
    pub rule: IndexRule,
    /// Owned by a uniqueness constraint.
    pub unique: bool,
    pub strategy: Strategy,
    accessor: Box<dyn IndexAccessor>,
}

impl CheckedIndex {
    #[must_use]
    pub fn new(
        rule: IndexRule,
        unique: bool,
        strategy: Strategy,
        accessor: Box<dyn IndexAccessor>,
    ) -> Self {
        Self {
            rule,
            unique,
            strategy,
            accessor,
        }
    }

    #[must_use]
    pub fn accessor(&self) -> &dyn IndexAccessor {
        self.accessor.as_ref()
    }
}

/// Which entities of one id range appear in each index-first index.
#[derive(Debug, Default)]
pub struct Presence {
    range: Range<u64>,
    sets: Vec<Option<AtomicBitset>>,
}

impl Presence {
    /// Whether `entity` has an entry in the `at`-th index.
    #[must_use]
    pub fn contains(&self, at: usize, entity: u64) -> bool {
        self.range.contains(&entity)
            && self
                .sets
                .get(at)
                .and_then(Option::as_ref)
                .is_some_and(|set| set.contains(entity - self.range.start))
    }
}

/// The values `entity` should be indexed under, or `None` if it falls
/// outside the schema of `rule`.
#[must_use]
pub fn expected_values(
    rule: &IndexRule,
    tokens: &[u32],
    values: &[(u32, Value)],
) -> Option<Vec<Value>> {
    if !rule.covers(tokens) {
        return None;
    }
    rule.properties
        .iter()
        .map(|key| {
            let value = values.iter().find_map(|(k, v)| (k == key).then_some(v))?;
            if rule.index_type == IndexType::Text && !matches!(value, Value::String(_)) {
                return None;
            }
            Some(value.clone())
        })
        .collect()
}

const fn entity_record_type(entity: EntityType) -> RecordType {
    match entity {
        EntityType::Node => RecordType::Node,
        EntityType::Relationship => RecordType::Relationship,
    }
}

const fn scan_record_type(entity: EntityType) -> RecordType {
    match entity {
        EntityType::Node => RecordType::LabelScanDocument,
        EntityType::Relationship => RecordType::RelationshipTypeScanDocument,
    }
}

/// Every index taking part in a check.
#[derive(Debug, Default)]
pub struct IndexSet {
    nodes: Vec<CheckedIndex>,
    relationships: Vec<CheckedIndex>,
    node_tokens: Option<TokenIndex>,
    relationship_tokens: Option<TokenIndex>,
}

impl IndexSet {
    /// Opens the index of every index rule in `rules`.
    ///
    /// # Errors
    ///
    /// Returns the first [`IndexError`] raised by `provider`.
    pub fn open(
        provider: &dyn IndexProvider,
        rules: &[SchemaRule],
        node_high_id: u64,
        relationship_high_id: u64,
        small_index_ratio: f64,
    ) -> Result<Self, IndexError> {
        let unique = |index: &IndexRule| {
            rules.iter().any(|rule| match rule {
                SchemaRule::Constraint(c) => {
                    c.constraint_type == ConstraintType::Unique
                        && c.owned_index == Some(index.id)
                        && index.owning_constraint == Some(c.id)
                }
                SchemaRule::Index(_) => false,
            })
        };
        let mut set = Self::default();
        for rule in rules {
            let SchemaRule::Index(rule) = rule else {
                continue;
            };
            if rule.index_type == IndexType::Lookup {
                let tokens = provider.token_index(rule)?;
                tracing::info!(rule = rule.id, entries = tokens.len(), "opened token index");
                let slot = match rule.entity {
                    EntityType::Node => &mut set.node_tokens,
                    EntityType::Relationship => &mut set.relationship_tokens,
                };
                slot.get_or_insert(tokens);
                continue;
            }
            let accessor = provider.lookup(rule)?;
            let high_id = match rule.entity {
                EntityType::Node => node_high_id,
                EntityType::Relationship => relationship_high_id,
            };
            let entries = accessor.entry_count();
            let strategy = Strategy::select(entries, high_id, small_index_ratio);
            tracing::info!(rule = rule.id, entries, ?strategy, "opened value index");
            let checked = CheckedIndex::new(rule.clone(), unique(rule), strategy, accessor);
            match rule.entity {
                EntityType::Node => set.nodes.push(checked),
                EntityType::Relationship => set.relationships.push(checked),
            }
        }
        Ok(set)
    }

    #[must_use]
    pub fn indexes(&self, entity: EntityType) -> &[CheckedIndex] {
        match entity {
            EntityType::Node => &self.nodes,
            EntityType::Relationship => &self.relationships,
        }
    }

    #[must_use]
    pub const fn token_index(&self, entity: EntityType) -> Option<&TokenIndex> {
        match entity {
            EntityType::Node => self.node_tokens.as_ref(),
            EntityType::Relationship => self.relationship_tokens.as_ref(),
        }
    }

    /// Presence bits each entity needs while its partition is cached.
    #[must_use]
    pub fn presence_bits(&self, entity: EntityType) -> u64 {
        self.indexes(entity)
            .iter()
            .filter(|index| index.strategy == Strategy::IndexFirst)
            .count() as u64
    }

    /// Marks which entities of `range` have entries in the index-first
    /// indexes of `entity`.
    #[must_use]
    pub fn presence(&self, entity: EntityType, range: Range<u64>) -> Presence {
        let sets = self
            .indexes(entity)
            .par_iter()
            .map(|index| {
                if index.strategy != Strategy::IndexFirst {
                    return None;
                }
                let set = AtomicBitset::new(range.end - range.start);
                for entry in index.accessor.new_reader().entries() {
                    if range.contains(&entry.entity) {
                        set.insert(entry.entity - range.start);
                    }
                }
                Some(set)
            })
            .collect();
        Presence { range, sets }
    }

    /// Checks that a live entity is present in every value index whose
    /// schema it matches.
    pub fn check_entity(
        &self,
        ctx: &CheckContext<'_>,
        entity: EntityType,
        id: u64,
        tokens: &[u32],
        values: &[(u32, Value)],
        presence: &Presence,
    ) {
        for (at, index) in self.indexes(entity).iter().enumerate() {
            let Some(expected) = expected_values(&index.rule, tokens, values) else {
                continue;
            };
            let indexed = match index.strategy {
                Strategy::EntityFirst => index.accessor.new_reader().contains(id, &expected),
                Strategy::IndexFirst => presence.contains(at, id),
            };
            if !indexed {
                ctx.index(
                    entity_record_type(entity),
                    id,
                    Kind::EntityNotIndexed {
                        index: index.rule.id,
                    },
                );
            }
        }
    }

    /// Compares the token index entry of `id` with the entity's tokens.
    pub fn check_tokens(
        &self,
        ctx: &CheckContext<'_>,
        entity: EntityType,
        id: u64,
        in_use: bool,
        tokens: &[u32],
    ) {
        let Some(index) = self.token_index(entity) else {
            return;
        };
        match (in_use, index.get(id)) {
            (false, Some(_)) => {
                ctx.index_structure(scan_record_type(entity), id, Kind::TokenIndexEntityNotInUse);
            }
            (true, None) if !tokens.is_empty() => ctx.index(
                entity_record_type(entity),
                id,
                Kind::EntityNotInTokenIndex {
                    tokens: tokens.to_vec(),
                },
            ),
            (true, Some(indexed)) if indexed != tokens => ctx.index(
                entity_record_type(entity),
                id,
                Kind::TokenIndexMismatch {
                    indexed: indexed.to_vec(),
                    actual: tokens.to_vec(),
                },
            ),
            _ => {}
        }
    }
}

fn entity_in_use(ctx: &CheckContext<'_>, entity: EntityType, id: u64) -> bool {
    match entity {
        EntityType::Node => ctx.stores.nodes.read(id).in_use,
        EntityType::Relationship => ctx.stores.relationships.read(id).in_use,
    }
}

fn resolve_entity(
    ctx: &CheckContext<'_>,
    entity: EntityType,
    id: u64,
) -> (Vec<u32>, Vec<(u32, Value)>) {
    let keys = &ctx.tokens.property_keys;
    match entity {
        EntityType::Node => {
            let node = ctx.stores.nodes.read(id);
            let labels = resolve_labels(ctx.stores, &node);
            (labels, resolve_values(ctx.stores, keys, node.next_prop))
        }
        EntityType::Relationship => {
            let relationship = ctx.stores.relationships.read(id);
            (
                vec![relationship.rel_type],
                resolve_values(ctx.stores, keys, relationship.next_prop),
            )
        }
    }
}

fn check_entry(ctx: &CheckContext<'_>, index: &CheckedIndex, entry: &IndexEntry) {
    let entity = index.rule.entity;
    let (tokens, values) = resolve_entity(ctx, entity, entry.entity);
    let kind = match expected_values(&index.rule, &tokens, &values) {
        None => Kind::EntityWronglyIndexed {
            index: index.rule.id,
        },
        Some(expected) if Value::key_of(&expected) != Value::key_of(&entry.values) => {
            Kind::IndexedValuesMismatch {
                index: index.rule.id,
            }
        }
        Some(_) => return,
    };
    ctx.index(RecordType::Index, entry.entity, kind);
}

fn check_index_entries(ctx: &CheckContext<'_>, index: &CheckedIndex) {
    let entity = index.rule.entity;
    let reader = index.accessor.new_reader();
    let mut groups: HashMap<Vec<u8>, Vec<u64>> = HashMap::new();
    let mut checked = 0u64;
    for entry in reader.entries() {
        if ctx.reporter.should_stop() {
            return;
        }
        checked += 1;
        if !entity_in_use(ctx, entity, entry.entity) {
            ctx.index_structure(
                RecordType::Index,
                entry.entity,
                Kind::IndexedEntityNotInUse {
                    index: index.rule.id,
                },
            );
            continue;
        }
        if index.unique {
            groups
                .entry(Value::key_of(&entry.values))
                .or_default()
                .push(entry.entity);
        }
        if index.strategy == Strategy::IndexFirst {
            check_entry(ctx, index, &entry);
        }
    }
    for mut entities in groups.into_values().filter(|e| e.len() > 1) {
        entities.sort_unstable();
        entities.dedup();
        let first = entities[0];
        for &other in &entities[1..] {
            ctx.index_structure(
                entity_record_type(entity),
                other,
                Kind::DuplicateUniqueValue {
                    index: index.rule.id,
                    other: first,
                },
            );
        }
    }
    tracing::debug!(rule = index.rule.id, entries = checked, "checked index entries");
}

fn check_token_entries(ctx: &CheckContext<'_>, entity: EntityType, index: &TokenIndex) {
    let high_id = match entity {
        EntityType::Node => ctx.stores.nodes.high_id(),
        EntityType::Relationship => ctx.stores.relationships.high_id(),
    };
    let mut stale: Vec<u64> = index.entities().filter(|&id| id >= high_id).collect();
    stale.sort_unstable();
    for id in stale {
        ctx.index_structure(scan_record_type(entity), id, Kind::TokenIndexEntityNotInUse);
    }
}

/// Walks every index from the index side: stale entries, unique values, and
/// for index-first indexes the values held for each live entity.
pub fn index_pass(ctx: &CheckContext<'_>) {
    let indexes = ctx.indexes;
    let all: Vec<&CheckedIndex> = indexes.nodes.iter().chain(&indexes.relationships).collect();
    all.par_iter().for_each(|index| check_index_entries(ctx, index));
    for entity in [EntityType::Node, EntityType::Relationship] {
        if let Some(tokens) = indexes.token_index(entity) {
            check_token_entries(ctx, entity, tokens);
        }
    }
}
