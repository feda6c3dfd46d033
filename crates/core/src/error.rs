//! Fatal errors. Data inconsistencies are never errors; see [`crate::report`].

use std::io;
use std::path::PathBuf;

use derive_more::{Display, Error, From};

use crate::report::ConsistencySummary;

/// A failure that stops a check before it can finish.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    #[from]
    Store(StoreError),
    #[from]
    Configuration(ConfigError),
    #[from]
    Index(IndexError),
    #[display("worker pool could not be started: {reason}")]
    WorkerPool { reason: String },
}

/// A store file could not be opened or does not follow the expected format.
#[derive(Debug, Display, Error)]
pub enum StoreError {
    #[display("store '{store}' is missing at {}", path.display())]
    Missing { store: String, path: PathBuf },
    #[display("store '{store}' has an unrecognised format: {reason}")]
    Format { store: String, reason: String },
    #[display("store '{store}' declares record size {actual}, expected {expected}")]
    RecordSize {
        store: String,
        expected: u32,
        actual: u32,
    },
    #[display("store '{store}' is truncated: expected at least {expected} bytes, found {actual}")]
    Truncated {
        store: String,
        expected: u64,
        actual: u64,
    },
    #[display("store '{store}' could not be read: {source}")]
    Io { store: String, source: io::Error },
    #[display("counts store missing or of an older format")]
    CountsStoreMissing,
}

/// An index referenced by a schema rule could not be opened.
#[derive(Debug, Display, Error)]
pub enum IndexError {
    #[display("index for rule {rule} is missing at {}", path.display())]
    Missing { rule: u64, path: PathBuf },
    #[display("index for rule {rule} is malformed: {reason}")]
    Format { rule: u64, reason: String },
    #[display("index for rule {rule} could not be read: {source}")]
    Io { rule: u64, source: io::Error },
}

/// The configuration cannot make progress.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Display, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[display("thread count must be at least 1")]
    ZeroThreads,
    #[display("memory limit of {limit} bytes cannot hold a single cache line of {line} bytes")]
    MemoryLimitTooSmall { limit: u64, line: u64 },
    #[display("memory limit of {limit} bytes is used up by {fixed} bytes of per-run buffers")]
    FixedCostsExceedLimit { limit: u64, fixed: u64 },
    #[display("small index ratio must be a non-negative number, got {ratio}")]
    SmallIndexRatio { ratio: f64 },
}

/// A fatal error together with everything recorded before it occurred.
#[derive(Debug, Display, Error)]
#[display("check did not complete: {error}")]
pub struct IncompleteCheck {
    #[error(source)]
    pub error: Error,
    #[error(not(source))]
    pub partial: ConsistencySummary,
}

impl IncompleteCheck {
    #[must_use]
    pub const fn new(error: Error, partial: ConsistencySummary) -> Self {
        Self { error, partial }
    }
}
