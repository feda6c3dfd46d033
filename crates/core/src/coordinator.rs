//! Drives one check from opening the stores to the final summary.
//!
//! The node id space is split into partitions whose cache fits the memory
//! limit. Each partition is scanned in stages (nodes, then every
//! relationship against the cached nodes, then the chain heads); record
//! types that do not depend on the cache ride along with the first
//! partition. Global passes over schema, indexes and counts follow.

use core::fmt;
use core::ops::Range;
use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::cache::{AtomicBitset, NodeCache, CACHE_LINE_SIZE};
use crate::checker::dynamic::check_dynamic_records;
use crate::checker::group::check_groups;
use crate::checker::node::{check_chain_heads, check_nodes};
use crate::checker::property::check_property_records;
use crate::checker::relationship::check_relationships;
use crate::checker::schema::{analyze_schema, schema_pass};
use crate::checker::token::check_tokens;
use crate::checker::CheckContext;
use crate::config::CheckConfig;
use crate::counts::{check_counts, read_counts_store, ObservedCounts};
use crate::error::{Error, IncompleteCheck};
use crate::index::strategy::{index_pass, IndexSet};
use crate::index::{FileIndexProvider, IndexProvider};
use crate::partition::{units, Partitioner};
use crate::report::{ConsistencySummary, Reporter};
use crate::schema::EntityType;
use crate::store::dynamic::DynamicKind;
use crate::store::{Stores, COUNTS_STORE};

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Scanning the partition with this index.
    Scanning(u64),
    SchemaPass,
    IndexPass,
    CountsPass,
    Done,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Scanning(partition) => write!(f, "scanning partition {partition}"),
            Self::SchemaPass => write!(f, "schema pass"),
            Self::IndexPass => write!(f, "index pass"),
            Self::CountsPass => write!(f, "counts pass"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// A unit of cache-independent work done alongside the first partition.
#[derive(Debug, Clone)]
enum SideUnit {
    Groups(Range<u64>),
    Properties(Range<u64>),
    /// Index into [`DynamicKind::ALL`].
    Dynamic(usize, Range<u64>),
}

/// One consistency check over one store directory.
#[derive(Debug)]
pub struct Coordinator {
    config: CheckConfig,
    phase: Phase,
}

impl Coordinator {
    #[must_use]
    pub const fn new(config: CheckConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    fn transition(&mut self, phase: Phase) {
        info!(from = %self.phase, to = %phase, "phase change");
        self.phase = phase;
    }

    /// Checks the store in `dir`, reading indexes through `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`IncompleteCheck`] when the configuration is unusable, a
    /// store or index cannot be opened, the worker pool cannot start, or the
    /// report file cannot be written. It carries whatever was recorded
    /// before the failure.
    pub fn run(
        &mut self,
        dir: &Path,
        provider: &dyn IndexProvider,
    ) -> Result<ConsistencySummary, IncompleteCheck> {
        let early = |error: Error| IncompleteCheck::new(error, ConsistencySummary::default());
        self.config.validate().map_err(|e| early(e.into()))?;
        let reporter = Reporter::new(
            self.config.fail_fast_threshold,
            self.config.max_recorded_descriptions,
            self.config.report_dir.as_deref(),
        )
        .map_err(|e| early(e.into()))?;

        let result = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("storecop-worker-{i}"))
            .build()
            .map_err(|e| Error::WorkerPool {
                reason: e.to_string(),
            })
            .and_then(|pool| pool.install(|| self.check(dir, provider, &reporter)))
            .and_then(|()| reporter.finish().map_err(Error::from));

        match result {
            Ok(()) => Ok(reporter.summary()),
            Err(error) => {
                self.transition(Phase::Aborted);
                Err(IncompleteCheck::new(error, reporter.summary()))
            }
        }
    }

    fn check(
        &mut self,
        dir: &Path,
        provider: &dyn IndexProvider,
        reporter: &Reporter,
    ) -> Result<(), Error> {
        info!(dir = %dir.display(), threads = self.config.threads, "starting consistency check");
        let flags = self.config.flags;
        let stores = Stores::open(dir)?;
        let tokens = check_tokens(&stores, |record_type, id, kind| {
            if flags.graph {
                reporter.on(record_type, id, kind);
            }
        });
        let schema = analyze_schema(&stores, &tokens);
        let indexes = if flags.indexes || flags.index_structure {
            IndexSet::open(
                provider,
                &schema.rules,
                stores.nodes.high_id(),
                stores.relationships.high_id(),
                self.config.small_index_ratio,
            )?
        } else {
            IndexSet::default()
        };
        let stored_counts = if flags.counts {
            Some(read_counts_store(&stores.dir.join(COUNTS_STORE))?)
        } else {
            None
        };
        let owners = flags
            .property_owners
            .then(|| AtomicBitset::new(stores.properties.high_id()));
        let ctx = CheckContext {
            stores: &stores,
            tokens: &tokens,
            reporter,
            flags,
            indexes: &indexes,
            property_owners: owners.as_ref(),
        };

        let observed = self.scan(&ctx)?;
        if !reporter.should_stop() {
            self.transition(Phase::SchemaPass);
            schema_pass(&ctx, &schema);
        }
        if !reporter.should_stop() && (flags.indexes || flags.index_structure) {
            self.transition(Phase::IndexPass);
            index_pass(&ctx);
        }
        if let (false, Some(stored)) = (reporter.should_stop(), &stored_counts) {
            self.transition(Phase::CountsPass);
            check_counts(stored, &observed, reporter);
        }
        if reporter.should_stop() {
            self.transition(Phase::Aborted);
        } else {
            self.transition(Phase::Done);
        }
        info!(inconsistencies = reporter.total(), "consistency check finished");
        Ok(())
    }

    fn scan(&mut self, ctx: &CheckContext<'_>) -> Result<ObservedCounts, Error> {
        let stores = ctx.stores;
        let unit_size = self.config.unit_size;
        let limit = self.config.memory_limit;
        let line = CACHE_LINE_SIZE + ctx.indexes.presence_bits(EntityType::Node).div_ceil(8);
        let fixed = fixed_costs(ctx);
        let partitioner = Partitioner::new(stores.nodes.high_id(), line, limit, fixed)?;
        let label_budget = limit.saturating_sub(fixed + partitioner.per_partition() * line);
        info!(
            partitions = partitioner.count(),
            per_partition = partitioner.per_partition(),
            fixed,
            label_budget,
            "planned node partitions"
        );

        let relationship_high = stores.relationships.high_id();
        let relationship_presence = ctx
            .indexes
            .presence(EntityType::Relationship, 0..relationship_high);
        let relationship_units = units(0..relationship_high, unit_size);
        let referenced = DynamicKind::ALL
            .map(|kind| AtomicBitset::new(stores.dynamic(kind).records().high_id()));
        let side_units = side_units(stores, unit_size);

        let mut observed = ObservedCounts::default();
        for (index, range) in (0u64..).zip(partitioner.ranges()) {
            if ctx.reporter.should_stop() {
                break;
            }
            self.transition(Phase::Scanning(index));
            let first_round = index == 0;
            let cache = NodeCache::new(range.clone(), label_budget);
            let node_presence = ctx.indexes.presence(EntityType::Node, range.clone());
            let node_units = units(range.clone(), unit_size);

            observed.merge(scan_units(ctx, &node_units, |unit, counts| {
                check_nodes(ctx, &cache, &node_presence, unit, counts);
            }));
            observed.merge(scan_units(ctx, &relationship_units, |unit, counts| {
                check_relationships(ctx, &cache, &relationship_presence, unit, first_round, counts);
            }));
            if first_round {
                side_units.par_iter().for_each(|unit| {
                    if ctx.reporter.should_stop() {
                        return;
                    }
                    match unit {
                        SideUnit::Groups(ids) => check_groups(ctx, ids.clone()),
                        SideUnit::Properties(ids) => check_property_records(ctx, ids.clone()),
                        SideUnit::Dynamic(at, ids) => check_dynamic_records(
                            ctx,
                            DynamicKind::ALL[*at],
                            &referenced[*at],
                            ids.clone(),
                        ),
                    }
                });
            }
            scan_units(ctx, &node_units, |unit, _| check_chain_heads(ctx, &cache, unit));
            debug!(partition = index, nodes = ?range, "partition scanned");
        }
        Ok(observed)
    }
}

const fn bitset_bytes(len: u64) -> u64 {
    len.div_ceil(64) * 8
}

/// Bytes held for the whole run whatever the partitioning.
fn fixed_costs(ctx: &CheckContext<'_>) -> u64 {
    let stores = ctx.stores;
    let indexes = ctx.indexes;
    let dynamic: u64 = DynamicKind::ALL
        .iter()
        .map(|&kind| bitset_bytes(stores.dynamic(kind).records().high_id()))
        .sum();
    let owners = if ctx.flags.property_owners {
        bitset_bytes(stores.properties.high_id())
    } else {
        0
    };
    let relationships = indexes.presence_bits(EntityType::Relationship)
        * bitset_bytes(stores.relationships.high_id());
    let node_rounding = indexes.presence_bits(EntityType::Node) * 8;
    dynamic + owners + relationships + node_rounding
}

fn side_units(stores: &Stores, unit_size: u64) -> Vec<SideUnit> {
    let mut out: Vec<SideUnit> = units(0..stores.groups.high_id(), unit_size)
        .into_iter()
        .map(SideUnit::Groups)
        .collect();
    out.extend(
        units(0..stores.properties.high_id(), unit_size)
            .into_iter()
            .map(SideUnit::Properties),
    );
    for (at, kind) in DynamicKind::ALL.into_iter().enumerate() {
        let high = stores.dynamic(kind).records().high_id();
        out.extend(
            units(0..high, unit_size)
                .into_iter()
                .map(|ids| SideUnit::Dynamic(at, ids)),
        );
    }
    out
}

/// Runs `check` over every unit in parallel and sums the counts they observe.
/// Units are skipped once the fail-fast threshold is reached.
fn scan_units(
    ctx: &CheckContext<'_>,
    units: &[Range<u64>],
    check: impl Fn(Range<u64>, &mut ObservedCounts) + Sync,
) -> ObservedCounts {
    units
        .par_iter()
        .map(|unit| {
            let mut counts = ObservedCounts::default();
            if !ctx.reporter.should_stop() {
                check(unit.clone(), &mut counts);
            }
            counts
        })
        .reduce(ObservedCounts::default, |mut total, counts| {
            total.merge(counts);
            total
        })
}

/// Checks the store in `dir` with its file-backed indexes.
///
/// # Errors
///
/// See [`Coordinator::run`].
pub fn check(dir: &Path, config: &CheckConfig) -> Result<ConsistencySummary, IncompleteCheck> {
    check_with_provider(dir, config, &FileIndexProvider::new(dir))
}

/// Checks the store in `dir`, reading indexes through `provider`.
///
/// # Errors
///
/// See [`Coordinator::run`].
pub fn check_with_provider(
    dir: &Path,
    config: &CheckConfig,
    provider: &dyn IndexProvider,
) -> Result<ConsistencySummary, IncompleteCheck> {
    Coordinator::new(config.clone()).run(dir, provider)
}
