//! Offline consistency checking for record-based graph stores.
//!
//! `storecop_core` scans a store directory (fixed-size node, relationship,
//! relationship group, property, token and schema records, chains of dynamic
//! blocks, value and token indexes, and an aggregate counts store) and
//! verifies that every reference between records is sound.
//!
//! Findings are values, never errors: each one is an
//! [`Inconsistency`](report::Inconsistency) on a record, collected into a
//! [`ConsistencySummary`] with deterministic per-record-type counts. Only
//! conditions that stop the check from running at all (a missing store file,
//! an unusable configuration, an unreadable index) end in an
//! [`IncompleteCheck`].
//!
//! Node ids are split into partitions whose cache fits
//! [`CheckConfig::memory_limit`]; every relationship is visited once per
//! partition, so memory stays bounded however large the store is.
//!
//! # Entry point
//!
//! ```rust,ignore
//! use storecop_core::{check, CheckConfig};
//!
//! let summary = check(Path::new("graph.db"), &CheckConfig::default())?;
//! if !summary.is_consistent() {
//!     println!("{summary}");
//! }
//! ```
//!
//! # Crate features
//!
//! - **`serde`** -- enables `Serialize`/`Deserialize` derives on the
//!   configuration, record types and the summary.

pub mod cache;
pub mod checker;
pub mod config;
pub mod coordinator;
pub mod counts;
pub mod error;
pub mod index;
pub mod partition;
pub mod report;
pub mod schema;
pub mod store;
pub mod tokens;

pub use config::{CheckConfig, CheckFlags};
pub use coordinator::{check, check_with_provider, Coordinator, Phase};
pub use error::{Error, IncompleteCheck};
pub use report::{ConsistencySummary, RecordType};
