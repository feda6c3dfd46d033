//! storecop CLI -- check record stores, and generate or sabotage test stores.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use storecop_core::{CheckConfig, CheckFlags};
use storecop_testgen::fixture::Layout;
use storecop_testgen::generator::GenParams;
use storecop_testgen::sabotage::Fault;

#[derive(Debug, Parser)]
#[command(
    name = "storecop",
    about = "Offline consistency checking for record-based graph stores"
)]
pub struct App {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check a store directory for inconsistencies
    Check(CheckArgs),
    /// Generate random consistent stores
    Generate(GenerateArgs),
    /// Inject one fault into a store directory
    Sabotage(SabotageArgs),
}

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Store directory to check
    pub dir: PathBuf,
    /// Print every recorded finding, not just the counts
    #[arg(long)]
    pub verbose: bool,
    /// Output the summary as JSON
    #[arg(long)]
    pub json: bool,
    /// Worker threads [default: available parallelism]
    #[arg(long)]
    pub threads: Option<usize>,
    /// Bytes of node cache per partition
    #[arg(long, default_value_t = 256 * 1024 * 1024)]
    pub memory_limit: u64,
    /// Stop after this many inconsistencies
    #[arg(long)]
    pub fail_fast: Option<u64>,
    /// Directory for the detailed report file
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
    /// Indexes smaller than this share of their entities are checked entity-first
    #[arg(long, default_value_t = 0.05)]
    pub small_index_ratio: f64,
    #[command(flatten)]
    pub skip: SkipArgs,
}

/// Check classes to leave out.
#[derive(Debug, Args)]
pub struct SkipArgs {
    /// Skip record and chain checks
    #[arg(long)]
    pub skip_graph: bool,
    /// Skip entity against index checks
    #[arg(long)]
    pub skip_indexes: bool,
    /// Skip index entry and uniqueness checks
    #[arg(long)]
    pub skip_index_structure: bool,
    /// Skip the counts store
    #[arg(long)]
    pub skip_counts: bool,
    /// Skip property chain ownership checks
    #[arg(long)]
    pub skip_property_owners: bool,
}

#[derive(Debug, Parser)]
pub struct GenerateArgs {
    /// Number of stores to generate
    #[arg(long)]
    pub n_store: u64,
    /// Number of nodes per store
    #[arg(long)]
    pub n_node: u64,
    /// Number of relationships per store
    #[arg(long)]
    pub n_relationship: u64,
    /// Number of labels
    #[arg(long, default_value_t = 4)]
    pub n_label: u32,
    /// Number of relationship types
    #[arg(long, default_value_t = 2)]
    pub n_rel_type: u32,
    /// Number of property keys
    #[arg(long, default_value_t = 3)]
    pub n_property_key: u32,
    /// Degree from which a node stores its relationships in groups
    #[arg(long, default_value_t = 8)]
    pub dense_threshold: usize,
    /// Output directory; each store lands in a numbered subdirectory
    #[arg(long)]
    pub output_dir: PathBuf,
}

#[derive(Debug, Parser)]
pub struct SabotageArgs {
    /// Store directory to damage
    pub dir: PathBuf,
    /// Fault to inject [default: a random one that applies]
    #[arg(long)]
    pub fault: Option<FaultArg>,
    /// Output what changed as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FaultArg {
    CountsOffByOne,
    DuplicateIndexRule,
    RelationshipToOtherNodes,
    GroupToUnusedRelationships,
    DynamicCycle,
    MissingIndexEntry,
    ExtraIndexEntry,
    SharedPropertyChain,
}

impl From<FaultArg> for Fault {
    fn from(fault: FaultArg) -> Self {
        match fault {
            FaultArg::CountsOffByOne => Self::CountsOffByOne,
            FaultArg::DuplicateIndexRule => Self::DuplicateIndexRule,
            FaultArg::RelationshipToOtherNodes => Self::RelationshipToOtherNodes,
            FaultArg::GroupToUnusedRelationships => Self::GroupToUnusedRelationships,
            FaultArg::DynamicCycle => Self::DynamicCycle,
            FaultArg::MissingIndexEntry => Self::MissingIndexEntry,
            FaultArg::ExtraIndexEntry => Self::ExtraIndexEntry,
            FaultArg::SharedPropertyChain => Self::SharedPropertyChain,
        }
    }
}

impl SkipArgs {
    #[must_use]
    pub const fn flags(&self) -> CheckFlags {
        CheckFlags {
            graph: !self.skip_graph,
            indexes: !self.skip_indexes,
            index_structure: !self.skip_index_structure,
            counts: !self.skip_counts,
            property_owners: !self.skip_property_owners,
        }
    }
}

impl CheckArgs {
    #[must_use]
    pub fn config(&self) -> CheckConfig {
        let mut config = CheckConfig::builder()
            .memory_limit(self.memory_limit)
            .flags(self.skip.flags())
            .small_index_ratio(self.small_index_ratio)
            .build();
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        config.fail_fast_threshold = self.fail_fast;
        config.report_dir.clone_from(&self.report_dir);
        config
    }
}

impl GenerateArgs {
    #[must_use]
    pub fn params(&self) -> GenParams {
        GenParams::builder()
            .n_node(self.n_node)
            .n_relationship(self.n_relationship)
            .n_label(self.n_label)
            .n_rel_type(self.n_rel_type)
            .n_property_key(self.n_property_key)
            .build()
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        Layout::builder()
            .dense_threshold(self.dense_threshold)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        App::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_check_defaults_match_library() {
        let Command::Check(args) = parse(&["storecop", "check", "graph.db"]) else {
            panic!("expected check");
        };
        assert_eq!(args.config(), CheckConfig::default());
    }

    #[test]
    fn test_check_options() {
        let Command::Check(args) = parse(&[
            "storecop",
            "check",
            "graph.db",
            "--threads",
            "3",
            "--fail-fast",
            "10",
            "--skip-counts",
            "--report-dir",
            "reports",
        ]) else {
            panic!("expected check");
        };
        let config = args.config();
        assert_eq!(config.threads, 3);
        assert_eq!(config.fail_fast_threshold, Some(10));
        assert!(!config.flags.counts && config.flags.graph);
        assert_eq!(config.report_dir, Some(PathBuf::from("reports")));
    }

    #[test]
    fn test_fault_names_match_library() {
        for fault in Fault::ALL {
            let arg = FaultArg::from_str(fault.name(), false).unwrap();
            assert_eq!(Fault::from(arg), fault);
        }
    }
}
