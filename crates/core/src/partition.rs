//! Splits an id space into ranges whose cache fits a memory budget.

use core::ops::Range;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    high_id: u64,
    per_partition: u64,
    count: u64,
}

impl Partitioner {
    /// Fits as many cache lines per partition as `memory_limit` allows once
    /// `fixed` bytes of per-run buffers are set aside, then plans
    /// `ceil(high_id / per_partition)` partitions, at least one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FixedCostsExceedLimit`] when the per-run
    /// buffers leave no room, or [`ConfigError::MemoryLimitTooSmall`] when
    /// not even one cache line fits.
    pub fn new(
        high_id: u64,
        line_size: u64,
        memory_limit: u64,
        fixed: u64,
    ) -> Result<Self, ConfigError> {
        let available = memory_limit
            .checked_sub(fixed)
            .ok_or(ConfigError::FixedCostsExceedLimit {
                limit: memory_limit,
                fixed,
            })?;
        if available < line_size || line_size == 0 {
            return Err(ConfigError::MemoryLimitTooSmall {
                limit: available,
                line: line_size,
            });
        }
        let per_partition = available / line_size;
        let count = high_id.div_ceil(per_partition).max(1);
        Ok(Self {
            high_id,
            per_partition,
            count,
        })
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    #[must_use]
    pub const fn per_partition(&self) -> u64 {
        self.per_partition
    }

    /// Id range of partition `index`; the last one may be shorter.
    #[must_use]
    pub fn range(&self, index: u64) -> Range<u64> {
        let start = (index * self.per_partition).min(self.high_id);
        let end = start.saturating_add(self.per_partition).min(self.high_id);
        start..end
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<u64>> + '_ {
        (0..self.count).map(|i| self.range(i))
    }
}

/// Splits `range` into consecutive units of at most `size` ids.
#[must_use]
pub fn units(range: Range<u64>, size: u64) -> Vec<Range<u64>> {
    let size = size.max(1);
    let mut out = Vec::new();
    let mut start = range.start;
    while start < range.end {
        let end = start.saturating_add(size).min(range.end);
        out.push(start..end);
        start = end;
    }
    out
}
