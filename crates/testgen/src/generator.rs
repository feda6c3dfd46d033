use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local};
use rand::distr::{Distribution, Uniform};
use rand::RngExt;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use storecop_core::schema::{EntityType, IndexType};
use storecop_core::store::value::Value;
use typed_builder::TypedBuilder;

use crate::fixture::{
    write_store, FixtureError, Graph, IndexSpec, Layout, NodeSpec, RelationshipSpec,
};

#[derive(Clone, Debug, Default, Deserialize, Serialize, TypedBuilder)]
pub struct GenParams {
    #[builder(default)]
    pub id: u64,
    pub n_node: u64,
    pub n_relationship: u64,
    pub n_label: u32,
    pub n_rel_type: u32,
    /// User property keys; key 0 always holds the entity id.
    pub n_property_key: u32,
}

/// A store written by [`generate_stores`], with how long writing it took.
#[derive(Deserialize, Serialize, Debug)]
pub struct GeneratedStore {
    params: GenParams,
    dir: PathBuf,
    start: DateTime<Local>,
    end: DateTime<Local>,
    graph: Graph,
}

impl GeneratedStore {
    #[must_use]
    pub const fn get_id(&self) -> u64 {
        self.params.id
    }

    #[must_use]
    pub const fn get_params(&self) -> &GenParams {
        &self.params
    }

    #[must_use]
    pub fn get_dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn get_graph(&self) -> &Graph {
        &self.graph
    }

    #[must_use]
    pub fn get_duration(&self) -> Duration {
        self.end - self.start
    }
}

fn random_value(rng: &mut impl RngExt, id: u64) -> Value {
    #[allow(clippy::cast_possible_wrap)]
    let n = id as i64;
    match rng.random_range(0..5u8) {
        0 => Value::Bool(rng.random::<bool>()),
        1 => Value::Int(rng.random_range(-1000..1000)),
        2 => Value::Float(f64::from(rng.random_range(0..1000u32)) / 8.0),
        3 if rng.random::<bool>() => Value::String(format!("s{n}")),
        3 => Value::String(format!("a longer string value for entity {n}")),
        _ => Value::Array((0..rng.random_range(0..6)).map(|i| n * i).collect()),
    }
}

/// Key 0 holds `id`; every other key is present with even odds.
fn random_properties(rng: &mut impl RngExt, n_key: u32, id: u64) -> Vec<(u32, Value)> {
    #[allow(clippy::cast_possible_wrap)]
    let mut properties = vec![(0, Value::Int(id as i64))];
    for key in 1..n_key {
        if rng.random::<bool>() {
            properties.push((key, random_value(rng, id)));
        }
    }
    properties.truncate(n_key as usize);
    properties
}

/// Indexes every generated graph carries, as far as its tokens allow: a
/// unique id index on the first label, a text index on the second label and
/// a relationship index on the first type.
fn indexes(params: &GenParams) -> Vec<IndexSpec> {
    let mut out = Vec::new();
    if params.n_property_key == 0 {
        return out;
    }
    if params.n_label > 0 {
        out.push(IndexSpec {
            name: "node_id".to_owned(),
            entity: EntityType::Node,
            tokens: vec![0],
            properties: vec![0],
            index_type: IndexType::Range,
            unique: true,
        });
    }
    if params.n_label > 1 && params.n_property_key > 1 {
        out.push(IndexSpec {
            name: "node_text".to_owned(),
            entity: EntityType::Node,
            tokens: vec![1],
            properties: vec![1],
            index_type: IndexType::Text,
            unique: false,
        });
    }
    if params.n_rel_type > 0 {
        out.push(IndexSpec {
            name: "relationship_id".to_owned(),
            entity: EntityType::Relationship,
            tokens: vec![0],
            properties: vec![0],
            index_type: IndexType::Range,
            unique: false,
        });
    }
    out
}

/// Generate a random graph of `n_node` nodes and `n_relationship`
/// relationships.
///
/// Each node carries every label with even odds, so graphs with more than
/// seven labels exercise dynamic label chains. Relationships pick both
/// endpoints uniformly, which yields loops and, on small node counts, dense
/// nodes. No relationships are generated without nodes or types.
#[must_use]
pub fn generate_graph(params: &GenParams) -> Graph {
    let mut random_generator = rand::rng();
    let nodes = (0..params.n_node)
        .map(|id| NodeSpec {
            labels: (0..params.n_label)
                .filter(|_| random_generator.random::<bool>())
                .collect(),
            properties: random_properties(&mut random_generator, params.n_property_key, id),
        })
        .collect();

    let mut relationships = Vec::new();
    let endpoints = Uniform::new(0, params.n_node);
    let types = Uniform::new(0, params.n_rel_type);
    if let (Ok(endpoints), Ok(types)) = (endpoints, types) {
        relationships = (0..params.n_relationship)
            .map(|id| RelationshipSpec {
                start: endpoints.sample(&mut random_generator),
                end: endpoints.sample(&mut random_generator),
                rel_type: types.sample(&mut random_generator),
                properties: random_properties(&mut random_generator, params.n_property_key, id),
            })
            .collect();
    }

    Graph {
        labels: (0..params.n_label).map(|i| format!("Label{i}")).collect(),
        relationship_types: (0..params.n_rel_type).map(|i| format!("TYPE_{i}")).collect(),
        property_keys: (0..params.n_property_key).map(|i| format!("key{i}")).collect(),
        nodes,
        relationships,
        indexes: indexes(params),
    }
}

/// Writes `n_store` random stores under `root`, one directory per store id.
///
/// # Errors
///
/// Returns the first [`FixtureError`] met while writing.
pub fn generate_stores(
    root: &Path,
    n_store: u64,
    params: &GenParams,
    layout: &Layout,
) -> Result<Vec<GeneratedStore>, FixtureError> {
    (0..n_store)
        .into_par_iter()
        .map(|id| {
            let params = GenParams {
                id,
                ..params.clone()
            };
            let start = Local::now();
            let graph = generate_graph(&params);
            let dir = root.join(id.to_string());
            write_store(&dir, &graph, layout)?;
            let end = Local::now();
            Ok(GeneratedStore {
                params,
                dir,
                start,
                end,
                graph,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GenParams {
        GenParams::builder()
            .n_node(40)
            .n_relationship(120)
            .n_label(9)
            .n_rel_type(3)
            .n_property_key(4)
            .build()
    }

    #[test]
    fn test_graph_has_requested_shape() {
        let graph = generate_graph(&params());
        assert_eq!(graph.nodes.len(), 40);
        assert_eq!(graph.relationships.len(), 120);
        assert_eq!(graph.labels.len(), 9);
        assert_eq!(graph.indexes.len(), 3);
        assert!(graph
            .relationships
            .iter()
            .all(|r| r.start < 40 && r.end < 40 && r.rel_type < 3));
        assert!(graph
            .nodes
            .iter()
            .zip(0..)
            .all(|(node, id)| node.properties[0] == (0, Value::Int(id))));
    }

    #[test]
    fn test_no_relationships_without_nodes() {
        let params = GenParams::builder()
            .n_node(0)
            .n_relationship(10)
            .n_label(1)
            .n_rel_type(1)
            .n_property_key(1)
            .build();
        assert!(generate_graph(&params).relationships.is_empty());
    }

    #[test]
    fn test_stores_land_in_numbered_dirs() {
        let root = tempfile::tempdir().unwrap();
        let stores = generate_stores(root.path(), 3, &params(), &Layout::default()).unwrap();
        assert_eq!(stores.len(), 3);
        for store in &stores {
            assert_eq!(store.get_dir(), root.path().join(store.get_id().to_string()));
            assert!(store.get_dir().join("nodes.store").exists());
        }
    }
}
