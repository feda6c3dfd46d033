//! Relationship records.
//!
//! Record-local rules (type token, chain symmetry, properties, indexes) run
//! once, with the first partition. Rules about endpoints run in every
//! partition, for the endpoints that partition caches.

use core::ops::Range;

use super::node::resolve_labels;
use super::property::check_owner_chain;
use super::CheckContext;
use crate::cache::NodeCache;
use crate::counts::ObservedCounts;
use crate::index::strategy::Presence;
use crate::report::{Kind, RecordType};
use crate::schema::EntityType;
use crate::store::record::{is_null, RelationshipRecord, Side};

const SIDES: [Side; 2] = [Side::First, Side::Second];

/// Checks the relationships of `unit` against the partition held in `cache`.
pub fn check_relationships(
    ctx: &CheckContext<'_>,
    cache: &NodeCache,
    presence: &Presence,
    unit: Range<u64>,
    first_round: bool,
    counts: &mut ObservedCounts,
) {
    for relationship in ctx.stores.relationships.cursor(unit) {
        if ctx.reporter.should_stop() {
            return;
        }
        if !relationship.in_use {
            if first_round {
                ctx.indexes
                    .check_tokens(ctx, EntityType::Relationship, relationship.id, false, &[]);
            }
            continue;
        }
        if first_round {
            check_record(ctx, &relationship, presence, counts);
        }
        check_endpoints(ctx, cache, &relationship, counts);
    }
}

fn check_record(
    ctx: &CheckContext<'_>,
    relationship: &RelationshipRecord,
    presence: &Presence,
    counts: &mut ObservedCounts,
) {
    let id = relationship.id;
    let rel_type = relationship.rel_type;
    if !ctx.tokens.relationship_types.in_use(rel_type) {
        ctx.graph(
            RecordType::Relationship,
            id,
            Kind::RelationshipTypeNotInUse { rel_type },
        );
    }
    for side in SIDES {
        if side == Side::Second && relationship.is_loop() {
            continue;
        }
        let node = relationship.node(side);
        if !ctx.stores.nodes.contains(node) {
            ctx.graph(
                RecordType::Relationship,
                id,
                Kind::EndpointNotInUse { side, node },
            );
        }
        check_chain_side(ctx, relationship, side);
    }
    let values = check_owner_chain(ctx, RecordType::Relationship, id, relationship.next_prop);
    if ctx.flags.counts {
        counts.relationship(rel_type);
    }
    let tokens = [rel_type];
    ctx.indexes
        .check_entity(ctx, EntityType::Relationship, id, &tokens, &values, presence);
    ctx.indexes
        .check_tokens(ctx, EntityType::Relationship, id, true, &tokens);
}

/// Both neighbours in the chain of `side` must be in use, belong to the
/// same node and point back.
fn check_chain_side(ctx: &CheckContext<'_>, relationship: &RelationshipRecord, side: Side) {
    let relationships = &ctx.stores.relationships;
    let id = relationship.id;
    let node = relationship.node(side);
    let report = |kind| ctx.graph(RecordType::Relationship, id, kind);

    let next = relationship.next(side);
    if !is_null(next) {
        let neighbour = relationships.read(next);
        if !neighbour.in_use {
            report(Kind::NextNotInUse { side, next });
        } else {
            let other = neighbour.sides_of(node).next();
            match other {
                None => report(Kind::NextReferencesOtherNodes { side, next }),
                Some(other) => {
                    if neighbour.is_first_in_chain(other) || neighbour.prev(other) != id {
                        report(Kind::NextDoesNotReferenceBack { side, next });
                    }
                }
            }
        }
    }

    if relationship.is_first_in_chain(side) {
        return;
    }
    let prev = relationship.prev(side);
    if is_null(prev) {
        report(Kind::MissingPrev { side });
        return;
    }
    let neighbour = relationships.read(prev);
    if !neighbour.in_use {
        report(Kind::PrevNotInUse { side, prev });
        return;
    }
    let other = neighbour.sides_of(node).next();
    match other {
        None => report(Kind::PrevReferencesOtherNodes { side, prev }),
        Some(other) => {
            if neighbour.next(other) != id {
                report(Kind::PrevDoesNotReferenceBack { side, prev });
            }
        }
    }
}

fn check_endpoints(
    ctx: &CheckContext<'_>,
    cache: &NodeCache,
    relationship: &RelationshipRecord,
    counts: &mut ObservedCounts,
) {
    let id = relationship.id;
    for side in SIDES {
        let node = relationship.node(side);
        if !cache.contains(node) {
            continue;
        }
        // a loop is chained once, through its first side
        let chained = !(side == Side::Second && relationship.is_loop());
        let cached = cache.get(node);
        if !cached.in_use {
            if chained {
                ctx.graph(
                    RecordType::Relationship,
                    id,
                    Kind::EndpointNotInUse { side, node },
                );
            }
            continue;
        }
        if ctx.flags.counts {
            let labels = cache.labels(node).unwrap_or_else(|| {
                resolve_labels(ctx.stores, &ctx.stores.nodes.read(node)).into()
            });
            match side {
                Side::First => counts.relationship_start(&labels, relationship.rel_type),
                Side::Second => counts.relationship_end(&labels, relationship.rel_type),
            }
        }
        if !chained || cached.dense {
            continue;
        }
        cache.add_observed_degree(node);
        if !relationship.is_first_in_chain(side) {
            continue;
        }
        if is_null(cached.next_rel) {
            ctx.graph(
                RecordType::Relationship,
                id,
                Kind::EndpointHasNoRelationships { side, node },
            );
        } else if cached.next_rel != id {
            ctx.graph(
                RecordType::Relationship,
                id,
                Kind::EndpointDoesNotReferenceBack {
                    side,
                    node,
                    first: cached.next_rel,
                },
            );
        } else {
            cache.clear_check_mark(node);
            cache.set_declared_degree(node, relationship.prev(side));
        }
    }
}
