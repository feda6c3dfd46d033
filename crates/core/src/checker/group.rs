//! Relationship group records of dense nodes.

use core::ops::Range;

use super::CheckContext;
use crate::report::{Kind, RecordType};
use crate::store::record::{is_null, Direction, RelationshipGroupRecord, RelationshipRecord};

/// Checks the groups of `unit`.
pub fn check_groups(ctx: &CheckContext<'_>, unit: Range<u64>) {
    for group in ctx.stores.groups.cursor(unit) {
        if ctx.reporter.should_stop() {
            return;
        }
        if group.in_use {
            check_group(ctx, &group);
        }
    }
}

fn check_group(ctx: &CheckContext<'_>, group: &RelationshipGroupRecord) {
    let report = |kind| ctx.graph(RecordType::RelationshipGroup, group.id, kind);

    if !ctx.tokens.relationship_types.in_use(group.rel_type) {
        report(Kind::GroupTypeNotInUse {
            rel_type: group.rel_type,
        });
    }
    if !ctx.stores.nodes.read(group.owner).in_use {
        report(Kind::GroupOwnerNotInUse { owner: group.owner });
    }

    if !is_null(group.next) {
        let next = ctx.stores.groups.read(group.next);
        if !next.in_use {
            report(Kind::GroupNextNotInUse { next: next.id });
        } else if next.owner != group.owner {
            report(Kind::GroupNextHasOtherOwner {
                next: next.id,
                owner: next.owner,
            });
        } else if next.rel_type <= group.rel_type {
            report(Kind::GroupNotSortedByType { next: next.id });
        }
    }

    for direction in Direction::ALL {
        let first = group.first(direction);
        if is_null(first) {
            continue;
        }
        let relationship = ctx.stores.relationships.read(first);
        let kind = if !relationship.in_use {
            Kind::GroupRelationshipNotInUse {
                direction,
                relationship: first,
            }
        } else if !belongs(&relationship, group.owner, direction) {
            Kind::GroupRelationshipForOtherNode {
                direction,
                relationship: first,
            }
        } else if !relationship.is_first_in_chain(direction.side()) {
            Kind::GroupRelationshipNotFirstInChain {
                direction,
                relationship: first,
            }
        } else if relationship.rel_type != group.rel_type {
            Kind::GroupRelationshipOfOtherType {
                direction,
                relationship: first,
            }
        } else {
            continue;
        };
        report(kind);
    }
}

/// Whether `relationship` sits in the `direction` chain of `owner`.
fn belongs(relationship: &RelationshipRecord, owner: u64, direction: Direction) -> bool {
    match direction {
        Direction::Outgoing => relationship.first_node == owner && !relationship.is_loop(),
        Direction::Incoming => relationship.second_node == owner && !relationship.is_loop(),
        Direction::Loop => relationship.is_loop() && relationship.first_node == owner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::testing::with_context;
    use crate::report::ConsistencySummary;
    use crate::store::record::NodeRecord;
    use crate::store::testing::{tokens, TestStores};

    fn dense(id: u64) -> NodeRecord {
        NodeRecord {
            dense: true,
            next_rel: 0,
            ..NodeRecord::new(id)
        }
    }

    fn run(ts: TestStores) -> ConsistencySummary {
        let stores = ts.build();
        let tokens = tokens(&[], &["KNOWS", "LIKES"], &[]);
        let high = stores.groups.high_id();
        with_context(&stores, &tokens, None, |ctx| check_groups(ctx, 0..high))
    }

    #[test]
    fn test_clean_groups() {
        let mut ts = TestStores::default();
        ts.nodes = vec![dense(0), NodeRecord::new(1)];
        let mut out = RelationshipRecord::new(0, 0, 1, 0);
        out.first_in_first_chain = true;
        out.first_in_second_chain = true;
        let mut looped = RelationshipRecord::new(1, 0, 0, 1);
        looped.first_in_first_chain = true;
        looped.first_in_second_chain = true;
        ts.relationships = vec![out, looped];
        let mut knows = RelationshipGroupRecord::new(0, 0, 0);
        knows.next = 1;
        knows.first_out = 0;
        let mut likes = RelationshipGroupRecord::new(1, 0, 1);
        likes.first_loop = 1;
        ts.groups = vec![knows, likes];
        let summary = run(ts);
        assert!(summary.is_consistent(), "{:?}", summary.descriptions);
    }

    #[test]
    fn test_pointers_to_unused_relationships() {
        let mut ts = TestStores::default();
        ts.nodes = vec![dense(0)];
        let mut group = RelationshipGroupRecord::new(0, 0, 0);
        group.first_out = 4;
        group.first_in = 5;
        group.first_loop = 6;
        ts.groups = vec![group];
        let summary = run(ts);
        assert_eq!(summary.inconsistency_count(RecordType::RelationshipGroup), 3);
    }

    #[test]
    fn test_next_group_order_and_owner() {
        let mut ts = TestStores::default();
        ts.nodes = vec![dense(0), dense(1)];
        let mut a = RelationshipGroupRecord::new(0, 0, 1);
        a.next = 1;
        let mut b = RelationshipGroupRecord::new(1, 0, 0);
        b.next = 2;
        let c = RelationshipGroupRecord::new(2, 1, 1);
        ts.groups = vec![a, b, c];
        let summary = run(ts);
        assert_eq!(summary.inconsistency_count(RecordType::RelationshipGroup), 2);
        assert!(summary.descriptions[0].contains("does not have a greater type"));
        assert!(summary.descriptions[1].contains("is owned by node 1"));
    }

    #[test]
    fn test_loop_in_outgoing_slot() {
        let mut ts = TestStores::default();
        ts.nodes = vec![dense(0)];
        let mut looped = RelationshipRecord::new(0, 0, 0, 0);
        looped.first_in_first_chain = true;
        looped.first_in_second_chain = true;
        ts.relationships = vec![looped];
        let mut group = RelationshipGroupRecord::new(0, 0, 0);
        group.first_out = 0;
        ts.groups = vec![group];
        let summary = run(ts);
        assert_eq!(summary.inconsistency_count(RecordType::RelationshipGroup), 1);
    }

    #[test]
    fn test_owner_and_type_not_in_use() {
        let mut ts = TestStores::default();
        ts.groups = vec![RelationshipGroupRecord::new(0, 3, 7)];
        let summary = run(ts);
        assert_eq!(summary.inconsistency_count(RecordType::RelationshipGroup), 2);
    }
}
