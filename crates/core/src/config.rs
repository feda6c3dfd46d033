use std::path::PathBuf;

use typed_builder::TypedBuilder;

use crate::cache::CACHE_LINE_SIZE;
use crate::error::ConfigError;

/// Which classes of checks run.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct CheckFlags {
    /// Node, relationship, group, property, dynamic, token and schema records.
    #[builder(default = true)]
    pub graph: bool,
    /// Agreement between entities and value or token indexes.
    #[builder(default = true)]
    pub indexes: bool,
    /// Index entries pointing at missing entities and unique value clashes.
    #[builder(default = true)]
    pub index_structure: bool,
    #[builder(default = true)]
    pub counts: bool,
    /// Property records reachable from more than one owner.
    #[builder(default = true)]
    pub property_owners: bool,
}

impl Default for CheckFlags {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct CheckConfig {
    /// Bytes the node cache of one partition may occupy.
    #[builder(default = 256 * 1024 * 1024)]
    pub memory_limit: u64,
    /// Stop after this many inconsistencies; `None` or `Some(0)` never stops.
    #[builder(default, setter(strip_option))]
    pub fail_fast_threshold: Option<u64>,
    #[builder(default = default_threads())]
    pub threads: usize,
    #[builder(default)]
    pub flags: CheckFlags,
    /// Indexes whose `entries / entity high id` is below this are checked
    /// entity-first.
    #[builder(default = 0.05)]
    pub small_index_ratio: f64,
    /// Descriptions kept in the summary; every finding is still logged.
    #[builder(default = 1024)]
    pub max_recorded_descriptions: usize,
    /// Where the timestamped report file is written, if anywhere.
    #[builder(default, setter(strip_option))]
    pub report_dir: Option<PathBuf>,
    /// Ids per unit of work within a partition.
    #[builder(default = 4096)]
    pub unit_size: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CheckConfig {
    /// # Errors
    ///
    /// Returns the first setting that cannot make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.memory_limit < CACHE_LINE_SIZE {
            return Err(ConfigError::MemoryLimitTooSmall {
                limit: self.memory_limit,
                line: CACHE_LINE_SIZE,
            });
        }
        if self.small_index_ratio.is_nan() || self.small_index_ratio < 0.0 {
            return Err(ConfigError::SmallIndexRatio {
                ratio: self.small_index_ratio,
            });
        }
        Ok(())
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CheckConfig::default();
        assert_eq!(config.memory_limit, 256 * 1024 * 1024);
        assert_eq!(config.fail_fast_threshold, None);
        assert!(config.threads >= 1);
        assert_eq!(config.flags, CheckFlags::default());
        assert!(config.flags.graph && config.flags.counts && config.flags.property_owners);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unusable_settings() {
        let config = CheckConfig::builder().threads(0).build();
        assert_eq!(config.validate(), Err(ConfigError::ZeroThreads));
        let config = CheckConfig::builder().memory_limit(8).build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MemoryLimitTooSmall { limit: 8, .. })
        ));
        let config = CheckConfig::builder().small_index_ratio(f64::NAN).build();
        assert!(matches!(config.validate(), Err(ConfigError::SmallIndexRatio { .. })));
    }

    #[test]
    fn test_builder_overrides() {
        let config = CheckConfig::builder()
            .fail_fast_threshold(3)
            .flags(CheckFlags::builder().indexes(false).build())
            .report_dir(PathBuf::from("/tmp"))
            .build();
        assert_eq!(config.fail_fast_threshold, Some(3));
        assert!(!config.flags.indexes);
        assert!(config.flags.graph);
    }
}
