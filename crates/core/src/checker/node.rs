//! Node records: labels, relationship chain heads and group chains.

use core::ops::Range;

use hashbrown::HashSet;

use super::property::check_owner_chain;
use super::CheckContext;
use crate::cache::NodeCache;
use crate::counts::ObservedCounts;
use crate::index::strategy::Presence;
use crate::report::{Kind, RecordType};
use crate::schema::EntityType;
use crate::store::labels::{decode_dynamic, LabelField};
use crate::store::record::{is_null, NodeRecord};
use crate::store::Stores;
use crate::tokens::TokenTable;

/// Reads the label field of `node`, passing every problem to `on_issue`.
///
/// Returns the labels sorted and deduplicated.
pub fn read_labels(
    stores: &Stores,
    node: &NodeRecord,
    mut on_issue: impl FnMut(Kind),
) -> Vec<u32> {
    let mut labels = match LabelField::parse(node.labels) {
        Err(error) => {
            on_issue(Kind::LabelFieldInvalid { error });
            return Vec::new();
        }
        Ok(LabelField::Inline(labels)) => labels,
        Ok(LabelField::Dynamic(first)) => match stores.node_labels.read_chain(first) {
            Err(error) => {
                on_issue(Kind::DynamicLabelChain { error });
                return Vec::new();
            }
            Ok(chain) => match decode_dynamic(&chain.payload) {
                None => {
                    on_issue(Kind::DynamicLabelsMalformed { block: first });
                    return Vec::new();
                }
                Some((owner, labels)) => {
                    if owner != node.id {
                        on_issue(Kind::DynamicLabelsOtherOwner {
                            block: first,
                            owner,
                        });
                    }
                    labels
                }
            },
        },
    };
    if labels.windows(2).any(|pair| pair[0] > pair[1]) {
        on_issue(Kind::LabelsUnsorted);
        labels.sort_unstable();
    }
    let mut reported = None;
    for pair in labels.windows(2) {
        if pair[0] == pair[1] && reported != Some(pair[0]) {
            on_issue(Kind::LabelDuplicate { label: pair[0] });
            reported = Some(pair[0]);
        }
    }
    labels.dedup();
    labels
}

/// Labels of `node` without reporting anything.
#[must_use]
pub fn resolve_labels(stores: &Stores, node: &NodeRecord) -> Vec<u32> {
    read_labels(stores, node, |_| {})
}

fn check_label_tokens(ctx: &CheckContext<'_>, node: u64, labels: &[u32], table: &TokenTable) {
    for &label in labels {
        if !table.in_use(label) {
            ctx.graph(RecordType::Node, node, Kind::LabelNotInUse { label });
        }
    }
}

/// The head group must belong to the node; the chain must end.
fn check_group_chain(ctx: &CheckContext<'_>, node: &NodeRecord) {
    let groups = &ctx.stores.groups;
    let head = groups.read(node.next_rel);
    if !head.in_use {
        ctx.graph(RecordType::Node, node.id, Kind::GroupNotInUse { group: head.id });
        return;
    }
    if head.owner != node.id {
        ctx.graph(
            RecordType::Node,
            node.id,
            Kind::GroupForOtherNode {
                group: head.id,
                owner: head.owner,
            },
        );
        return;
    }
    // one group per relationship type at most
    let limit = ctx.stores.relationship_type_tokens.high_id().saturating_add(1);
    let mut visited = HashSet::new();
    let mut current = head;
    loop {
        visited.insert(current.id);
        if is_null(current.next) || visited.len() as u64 > limit {
            return;
        }
        if visited.contains(&current.next) {
            ctx.graph(
                RecordType::Node,
                node.id,
                Kind::GroupChainCycle {
                    group: current.next,
                },
            );
            return;
        }
        let next = groups.read(current.next);
        if !next.in_use || next.owner != node.id {
            return;
        }
        current = next;
    }
}

/// Checks the nodes of `unit` and fills their cache lines.
pub fn check_nodes(
    ctx: &CheckContext<'_>,
    cache: &NodeCache,
    presence: &Presence,
    unit: Range<u64>,
    counts: &mut ObservedCounts,
) {
    let indexes = ctx.indexes;
    for node in ctx.stores.nodes.cursor(unit) {
        if ctx.reporter.should_stop() {
            return;
        }
        if !node.in_use {
            cache.store(node.id, false, false, node.next_rel, &[]);
            indexes.check_tokens(ctx, EntityType::Node, node.id, false, &[]);
            continue;
        }
        let labels = read_labels(ctx.stores, &node, |kind| {
            ctx.graph(RecordType::Node, node.id, kind);
        });
        cache.store(node.id, true, node.dense, node.next_rel, &labels);
        check_label_tokens(ctx, node.id, &labels, &ctx.tokens.labels);
        if node.dense && !is_null(node.next_rel) {
            check_group_chain(ctx, &node);
        }
        let values = check_owner_chain(ctx, RecordType::Node, node.id, node.next_prop);
        if ctx.flags.counts {
            counts.node(&labels);
        }
        indexes.check_entity(ctx, EntityType::Node, node.id, &labels, &values, presence);
        indexes.check_tokens(ctx, EntityType::Node, node.id, true, &labels);
    }
}

/// Runs after every relationship has visited the partition: a node whose
/// chain head never claimed it points at the wrong relationship, and a
/// claimed chain must hold as many relationships as its head declares.
pub fn check_chain_heads(ctx: &CheckContext<'_>, cache: &NodeCache, unit: Range<u64>) {
    let relationships = &ctx.stores.relationships;
    for id in unit {
        if ctx.reporter.should_stop() {
            return;
        }
        let cached = cache.get(id);
        if !cached.in_use || cached.dense {
            continue;
        }
        if cached.check_mark {
            let head = relationships.read(cached.next_rel);
            let kind = if !head.in_use {
                Kind::RelationshipNotInUse {
                    relationship: head.id,
                }
            } else if let Some(side) = head.sides_of(id).next() {
                if !head.is_first_in_chain(side) {
                    ctx.graph(
                        RecordType::Relationship,
                        head.id,
                        Kind::HeadNotFirstInChain { node: id },
                    );
                }
                continue;
            } else {
                Kind::RelationshipForOtherNode {
                    relationship: head.id,
                }
            };
            ctx.graph(RecordType::Node, id, kind);
        } else if let (observed, Some(declared)) = cache.degrees(id) {
            if observed != declared {
                ctx.graph(
                    RecordType::Node,
                    id,
                    Kind::RelationshipChainDegree { declared, observed },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::testing::with_context;
    use crate::store::dynamic::DynamicKind;
    use crate::store::labels::{encode_dynamic, pack_inline};
    use crate::store::record::{RelationshipGroupRecord, RelationshipRecord, Side};
    use crate::store::testing::{tokens, TestStores};

    fn node(id: u64, labels: u64) -> NodeRecord {
        NodeRecord {
            labels,
            ..NodeRecord::new(id)
        }
    }

    fn scan(ts: TestStores, labels: &[&str]) -> crate::report::ConsistencySummary {
        let stores = ts.build();
        let tokens = tokens(labels, &["KNOWS", "LIKES"], &[]);
        let high = stores.nodes.high_id();
        with_context(&stores, &tokens, None, |ctx| {
            let cache = NodeCache::new(0..high, u64::MAX);
            let mut counts = ObservedCounts::default();
            check_nodes(ctx, &cache, &Presence::default(), 0..high, &mut counts);
        })
    }

    #[test]
    fn test_inline_labels_read_sorted() {
        let mut ts = TestStores::default();
        ts.nodes = vec![node(0, pack_inline(&[2, 0, 2]).unwrap())];
        let stores = ts.build();
        let mut issues = Vec::new();
        let labels = read_labels(&stores, &stores.nodes.read(0), |kind| issues.push(kind));
        assert_eq!(labels, vec![0, 2]);
        assert_eq!(issues, vec![Kind::LabelsUnsorted, Kind::LabelDuplicate { label: 2 }]);
    }

    #[test]
    fn test_malformed_inline_field_is_reported_on_node() {
        let mut ts = TestStores::default();
        let wide = (1u64 << 56) | (u64::from(u32::MAX) + 1);
        ts.nodes = vec![
            node(0, pack_inline(&[0]).unwrap() | (1 << 60)),
            node(1, wide),
        ];
        let summary = scan(ts, &["A"]);
        assert_eq!(summary.inconsistency_count(RecordType::Node), 2);
        assert!(summary.descriptions.iter().any(|d| d.contains("reserved bits")));
        assert!(summary.descriptions.iter().any(|d| d.contains("exceeds 32 bits")));
    }

    #[test]
    fn test_dynamic_labels_belong_to_their_node() {
        let mut ts = TestStores::default();
        let mine = ts.chain(DynamicKind::NodeLabels, &encode_dynamic(0, &[0, 1]));
        let theirs = ts.chain(DynamicKind::NodeLabels, &encode_dynamic(9, &[1]));
        ts.nodes = vec![
            node(0, LabelField::dynamic(mine)),
            node(1, LabelField::dynamic(theirs)),
        ];
        let summary = scan(ts, &["A", "B"]);
        assert_eq!(summary.inconsistency_count(RecordType::Node), 1);
        assert!(summary.descriptions[0].contains("belongs to node 9"));
    }

    #[test]
    fn test_dynamic_label_cycle_terminates() {
        let mut ts = TestStores::default();
        let payload = encode_dynamic(0, &(0..10).collect::<Vec<_>>());
        let first = ts.chain(DynamicKind::NodeLabels, &payload);
        let last = ts.dynamic.len() - 1;
        ts.dynamic[last].1.next = first;
        ts.nodes = vec![node(0, LabelField::dynamic(first))];
        let summary = scan(ts, &[]);
        assert_eq!(summary.inconsistency_count(RecordType::Node), 1);
        assert!(summary.descriptions[0].contains("cycles back"));
    }

    #[test]
    fn test_unused_label_token() {
        let mut ts = TestStores::default();
        ts.nodes = vec![node(0, pack_inline(&[0, 5]).unwrap())];
        let summary = scan(ts, &["A"]);
        assert_eq!(summary.inconsistency_count(RecordType::Node), 1);
    }

    #[test]
    fn test_group_chain_cycle() {
        let mut ts = TestStores::default();
        ts.nodes = vec![NodeRecord {
            dense: true,
            next_rel: 0,
            ..NodeRecord::new(0)
        }];
        let mut a = RelationshipGroupRecord::new(0, 0, 0);
        a.next = 1;
        let mut b = RelationshipGroupRecord::new(1, 0, 1);
        b.next = 0;
        ts.groups = vec![a, b];
        ts.relationship_types = vec!["KNOWS", "LIKES"];
        let summary = scan(ts, &[]);
        assert_eq!(summary.inconsistency_count(RecordType::Node), 1);
    }

    #[test]
    fn test_head_group_of_other_node() {
        let mut ts = TestStores::default();
        ts.nodes = vec![NodeRecord {
            dense: true,
            next_rel: 0,
            ..NodeRecord::new(0)
        }];
        ts.groups = vec![RelationshipGroupRecord::new(0, 3, 0)];
        let summary = scan(ts, &[]);
        assert_eq!(summary.inconsistency_count(RecordType::Node), 1);
    }

    #[test]
    fn test_unclaimed_chain_head() {
        let mut ts = TestStores::default();
        ts.nodes = vec![
            NodeRecord {
                next_rel: 0,
                ..NodeRecord::new(0)
            },
            NodeRecord {
                next_rel: 1,
                ..NodeRecord::new(1)
            },
        ];
        ts.relationships = vec![RelationshipRecord::new(0, 1, 2, 0)];
        let stores = ts.build();
        let tokens = tokens(&[], &["KNOWS"], &[]);
        let summary = with_context(&stores, &tokens, None, |ctx| {
            let cache = NodeCache::new(0..2, u64::MAX);
            let mut counts = ObservedCounts::default();
            check_nodes(ctx, &cache, &Presence::default(), 0..2, &mut counts);
            check_chain_heads(ctx, &cache, 0..2);
        });
        // node 0 points at a relationship between other nodes, node 1 past the end
        assert_eq!(summary.inconsistency_count(RecordType::Node), 2);
        assert!(summary.descriptions.iter().any(|d| d.contains("does not reference this node")));
        assert!(summary.descriptions.iter().any(|d| d.contains("1 is not in use")));
    }

    #[test]
    fn test_head_not_marked_first_is_reported_on_relationship() {
        let mut ts = TestStores::default();
        ts.nodes = vec![
            NodeRecord {
                next_rel: 0,
                ..NodeRecord::new(0)
            },
            NodeRecord {
                next_rel: 0,
                ..NodeRecord::new(1)
            },
        ];
        let mut relationship = RelationshipRecord::new(0, 0, 1, 0);
        relationship.set_first_in_chain(Side::First, true);
        ts.relationships = vec![relationship];
        let stores = ts.build();
        let tokens = tokens(&[], &["KNOWS"], &[]);
        let summary = with_context(&stores, &tokens, None, |ctx| {
            let cache = NodeCache::new(0..2, u64::MAX);
            let mut counts = ObservedCounts::default();
            check_nodes(ctx, &cache, &Presence::default(), 0..2, &mut counts);
            check_chain_heads(ctx, &cache, 0..2);
        });
        assert_eq!(summary.inconsistency_count(RecordType::Node), 0);
        assert_eq!(summary.inconsistency_count(RecordType::Relationship), 1);
        assert!(summary.descriptions[0].contains("chain of node 1"));
    }

    #[test]
    fn test_declared_degree_must_match() {
        let cache = NodeCache::new(0..1, u64::MAX);
        cache.store(0, true, false, 4, &[]);
        assert!(cache.clear_check_mark(0));
        cache.set_declared_degree(0, 2);
        cache.add_observed_degree(0);
        let stores = TestStores::default().build();
        let tokens = tokens(&[], &[], &[]);
        let summary = with_context(&stores, &tokens, None, |ctx| {
            check_chain_heads(ctx, &cache, 0..1);
        });
        assert_eq!(summary.inconsistency_count(RecordType::Node), 1);
    }
}
