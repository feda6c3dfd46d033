mod common;

use std::fs;

use common::{check, config, demo_graph, write, HUB, ISOLATED};
use rand::SeedableRng;
use storecop_core::cache::CACHE_LINE_SIZE;
use storecop_core::error::{ConfigError, StoreError};
use storecop_core::store::value::Value;
use storecop_core::{CheckConfig, CheckFlags, Error, RecordType};
use storecop_testgen::fixture::Layout;
use storecop_testgen::generator::{generate_stores, GenParams};
use storecop_testgen::sabotage::{sabotage, sabotage_random, Fault};

#[test]
fn test_clean_store_is_consistent() {
    let dir = write(&demo_graph(), &Layout::default());
    let summary = check(dir.path(), &config());
    assert!(summary.is_consistent(), "{summary}");
    assert!(!summary.aborted);
    assert!(summary.descriptions.is_empty());
}

#[test]
fn test_check_is_idempotent() {
    let dir = write(&demo_graph(), &Layout::default());
    sabotage(dir.path(), Fault::RelationshipToOtherNodes).unwrap();
    let first = check(dir.path(), &config());
    let second = check(dir.path(), &config());
    assert_eq!(first, second);
}

#[test]
fn test_partitioning_does_not_change_findings() {
    let dir = write(&demo_graph(), &Layout::default());
    sabotage(dir.path(), Fault::RelationshipToOtherNodes).unwrap();
    let whole = check(dir.path(), &config());
    // Run-wide bitsets take well under 100 bytes here, leaving a few
    // cache lines per partition.
    let small = CheckConfig::builder()
        .threads(2)
        .memory_limit(200)
        .unit_size(2)
        .build();
    assert_eq!(check(dir.path(), &small), whole);
}

#[test]
fn test_run_wide_buffers_count_against_the_limit() {
    let dir = write(&demo_graph(), &Layout::default());
    let config = CheckConfig::builder()
        .threads(1)
        .memory_limit(CACHE_LINE_SIZE)
        .build();
    let err = storecop_core::check(dir.path(), &config).unwrap_err();
    assert!(matches!(
        err.error,
        Error::Configuration(ConfigError::FixedCostsExceedLimit { limit: 24, .. })
    ));
}

#[test]
fn test_sparse_dense_layouts_are_consistent() {
    for threshold in [2, 8, 1000] {
        let layout = Layout::builder()
            .dense_threshold(threshold)
            .block_capacity(8)
            .build();
        let dir = write(&demo_graph(), &layout);
        let summary = check(dir.path(), &config());
        assert!(summary.is_consistent(), "threshold {threshold}: {summary}");
    }
}

#[test]
fn test_relationship_moved_to_other_nodes() {
    let dir = write(&demo_graph(), &Layout::default());
    let sabotaged = sabotage(dir.path(), Fault::RelationshipToOtherNodes).unwrap();
    assert!(sabotaged
        .description
        .ends_with(&format!("nodes {} and {}", ISOLATED[0], ISOLATED[1])));
    let summary = check(dir.path(), &config());
    assert_eq!(summary.inconsistency_count(RecordType::Relationship), 2);
    assert_eq!(summary.inconsistency_count(RecordType::Node), 2);
    assert_eq!(summary.total_inconsistency_count(), 4);
}

#[test]
fn test_group_pointing_at_unused_relationships() {
    let dir = write(&demo_graph(), &Layout::default());
    let sabotaged = sabotage(dir.path(), Fault::GroupToUnusedRelationships).unwrap();
    assert!(sabotaged.description.starts_with("group 0"));
    let summary = check(dir.path(), &config());
    assert_eq!(summary.inconsistency_count(RecordType::RelationshipGroup), 3);
    assert!(!summary.is_consistent());
}

#[test]
fn test_counts_off_by_one() {
    let dir = write(&demo_graph(), &Layout::default());
    sabotage(dir.path(), Fault::CountsOffByOne).unwrap();
    let summary = check(dir.path(), &config());
    assert_eq!(summary.inconsistency_count(RecordType::Counts), 1);
    assert_eq!(summary.total_inconsistency_count(), 1);
}

#[test]
fn test_counts_flag_off_skips_counts() {
    let dir = write(&demo_graph(), &Layout::default());
    sabotage(dir.path(), Fault::CountsOffByOne).unwrap();
    let config = CheckConfig::builder()
        .threads(2)
        .flags(CheckFlags::builder().counts(false).build())
        .build();
    assert!(check(dir.path(), &config).is_consistent());
}

#[test]
fn test_duplicate_index_rule() {
    let dir = write(&demo_graph(), &Layout::default());
    sabotage(dir.path(), Fault::DuplicateIndexRule).unwrap();
    let summary = check(dir.path(), &config());
    assert_eq!(summary.inconsistency_count(RecordType::Schema), 1);
    assert_eq!(summary.total_inconsistency_count(), 1);
}

fn with_ratio(ratio: f64) -> CheckConfig {
    CheckConfig::builder()
        .threads(2)
        .small_index_ratio(ratio)
        .build()
}

#[test]
fn test_missing_index_entry_found_by_both_strategies() {
    let dir = write(&demo_graph(), &Layout::default());
    sabotage(dir.path(), Fault::MissingIndexEntry).unwrap();
    for ratio in [0.0, 1e9] {
        let summary = check(dir.path(), &with_ratio(ratio));
        assert_eq!(summary.inconsistency_count(RecordType::Node), 1, "ratio {ratio}");
        assert_eq!(summary.total_inconsistency_count(), 1, "ratio {ratio}");
    }
}

#[test]
fn test_extra_index_entry_found_when_walking_the_index() {
    let dir = write(&demo_graph(), &Layout::default());
    sabotage(dir.path(), Fault::ExtraIndexEntry).unwrap();
    let index_first = check(dir.path(), &with_ratio(0.0));
    assert_eq!(index_first.inconsistency_count(RecordType::Index), 1);
    assert_eq!(index_first.total_inconsistency_count(), 1);
    assert!(check(dir.path(), &with_ratio(1e9)).is_consistent());
}

#[test]
fn test_nan_index_values_agree_under_both_strategies() {
    let mut graph = demo_graph();
    for node in &mut graph.nodes {
        node.properties[0].1 = Value::Float(f64::NAN);
    }
    let dir = write(&graph, &Layout::default());
    for ratio in [0.0, 1e9] {
        let summary = check(dir.path(), &with_ratio(ratio));
        assert!(summary.is_consistent(), "ratio {ratio}: {summary}");
    }
}

#[test]
fn test_dynamic_cycle_terminates() {
    let layout = Layout::builder().block_capacity(8).build();
    let dir = write(&demo_graph(), &layout);
    sabotage(dir.path(), Fault::DynamicCycle).unwrap();
    let summary = check(dir.path(), &config());
    assert!(summary.inconsistency_count(RecordType::Property) >= 1, "{summary}");
}

#[test]
fn test_shared_property_chain() {
    let dir = write(&demo_graph(), &Layout::default());
    let sabotaged = sabotage(dir.path(), Fault::SharedPropertyChain).unwrap();
    assert_eq!(sabotaged.description, format!("node 1 shares the property chain of node {HUB}"));
    let summary = check(dir.path(), &config());
    assert!(summary.inconsistency_count(RecordType::Property) >= 1, "{summary}");
}

#[test]
fn test_every_fault_is_detected() {
    let layout = Layout::builder().block_capacity(8).build();
    for fault in Fault::ALL {
        let dir = write(&demo_graph(), &layout);
        sabotage(dir.path(), fault).unwrap();
        let summary = check(dir.path(), &with_ratio(0.0));
        assert!(!summary.is_consistent(), "{fault} went unnoticed");
    }
}

#[test]
fn test_fail_fast_stops_after_threshold() {
    let dir = write(&demo_graph(), &Layout::default());
    sabotage(dir.path(), Fault::RelationshipToOtherNodes).unwrap();
    let config = CheckConfig::builder()
        .threads(1)
        .fail_fast_threshold(1)
        .build();
    let summary = check(dir.path(), &config);
    assert!(summary.aborted);
    assert_eq!(summary.total_inconsistency_count(), 1);
}

#[test]
fn test_missing_counts_store_is_fatal() {
    let dir = write(&demo_graph(), &Layout::default());
    fs::remove_file(dir.path().join("counts.store")).unwrap();
    let err = storecop_core::check(dir.path(), &config()).unwrap_err();
    assert!(matches!(err.error, Error::Store(StoreError::CountsStoreMissing)));

    let config = CheckConfig::builder()
        .threads(2)
        .flags(CheckFlags::builder().counts(false).build())
        .build();
    assert!(check(dir.path(), &config).is_consistent());
}

#[test]
fn test_report_file_lists_findings() {
    let dir = write(&demo_graph(), &Layout::default());
    let reports = tempfile::tempdir().unwrap();
    sabotage(dir.path(), Fault::CountsOffByOne).unwrap();
    let config = CheckConfig::builder()
        .threads(2)
        .report_dir(reports.path().to_path_buf())
        .build();
    let summary = check(dir.path(), &config);
    let path = summary.report_path.clone().unwrap();
    assert!(path.starts_with(reports.path()));
    let report = fs::read_to_string(path).unwrap();
    assert_eq!(report.lines().filter(|line| !line.is_empty()).count(), 1);
    assert_eq!(summary.descriptions.len(), 1);
}

#[test]
fn test_generated_stores_are_consistent_until_sabotaged() {
    let root = tempfile::tempdir().unwrap();
    let params = GenParams::builder()
        .n_node(60)
        .n_relationship(200)
        .n_label(9)
        .n_rel_type(3)
        .n_property_key(4)
        .build();
    let stores = generate_stores(root.path(), 3, &params, &Layout::default()).unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    for store in &stores {
        let summary = check(store.get_dir(), &config());
        assert!(summary.is_consistent(), "store {}: {summary}", store.get_id());

        let sabotaged = sabotage_random(store.get_dir(), &mut rng).unwrap();
        let summary = check(store.get_dir(), &with_ratio(0.0));
        assert!(!summary.is_consistent(), "{} went unnoticed", sabotaged.fault);
    }
}

#[test]
fn test_sabotage_outcome_serializes() {
    let dir = write(&demo_graph(), &Layout::default());
    let sabotaged = sabotage(dir.path(), Fault::CountsOffByOne).unwrap();
    let json = serde_json::to_value(&sabotaged).unwrap();
    assert_eq!(json["fault"], "CountsOffByOne");
    assert_eq!(json["description"], sabotaged.description.as_str());
}
