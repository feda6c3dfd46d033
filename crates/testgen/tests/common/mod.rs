#![allow(dead_code)]

use std::path::Path;

use storecop_core::schema::{EntityType, IndexType};
use storecop_core::store::value::Value;
use storecop_core::{CheckConfig, ConsistencySummary};
use storecop_testgen::fixture::{
    write_store, Graph, IndexSpec, Layout, NodeSpec, RelationshipSpec,
};
use tempfile::TempDir;

/// Nodes of the demo graph: a hub, its nine neighbours, a lone pair and two
/// isolated nodes.
pub const HUB: u64 = 0;
pub const LONE_PAIR: (u64, u64) = (10, 11);
pub const ISOLATED: [u64; 2] = [12, 13];

fn relationship(start: u64, end: u64) -> RelationshipSpec {
    RelationshipSpec {
        start,
        end,
        rel_type: 0,
        properties: Vec::new(),
    }
}

/// Every node is a `Person` named with a string long enough to need a chain.
///
/// The hub holds nine outgoing relationships and a loop, which makes it dense
/// under the default layout. One range index covers the names.
pub fn demo_graph() -> Graph {
    let nodes = (0..14)
        .map(|id| NodeSpec {
            labels: vec![0],
            properties: vec![
                (0, Value::String(format!("person number {id} of the demo"))),
                (1, Value::Int(id)),
            ],
        })
        .collect();
    let mut relationships: Vec<_> = (1..10).map(|end| relationship(HUB, end)).collect();
    relationships.push(relationship(HUB, HUB));
    relationships.push(relationship(LONE_PAIR.0, LONE_PAIR.1));
    Graph {
        labels: vec!["Person".to_owned()],
        relationship_types: vec!["KNOWS".to_owned()],
        property_keys: vec!["name".to_owned(), "age".to_owned()],
        nodes,
        relationships,
        indexes: vec![IndexSpec {
            name: "person_name".to_owned(),
            entity: EntityType::Node,
            tokens: vec![0],
            properties: vec![0],
            index_type: IndexType::Range,
            unique: false,
        }],
    }
}

pub fn write(graph: &Graph, layout: &Layout) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_store(dir.path(), graph, layout).unwrap();
    dir
}

pub fn config() -> CheckConfig {
    CheckConfig::builder().threads(2).build()
}

pub fn check(dir: &Path, config: &CheckConfig) -> ConsistencySummary {
    storecop_core::check(dir, config).unwrap()
}
