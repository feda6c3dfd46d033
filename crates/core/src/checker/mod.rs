//! Per-record checkers.
//!
//! Every checker is a plain function over one record (or one unit of
//! records) that reads the stores directly, consults the node cache when it
//! needs facts gathered earlier in the same partition, and reports findings
//! through the shared [`Reporter`]. No checker returns an error: a malformed
//! record is a finding, never a failure.

pub mod dynamic;
pub mod group;
pub mod node;
pub mod property;
pub mod relationship;
pub mod schema;
pub mod token;

use crate::cache::AtomicBitset;
use crate::config::CheckFlags;
use crate::index::strategy::IndexSet;
use crate::report::{Kind, RecordType, Reporter};
use crate::store::Stores;
use crate::tokens::Tokens;

/// Everything a checker may consult, shared by every worker of one run.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext<'a> {
    pub stores: &'a Stores,
    pub tokens: &'a Tokens,
    pub reporter: &'a Reporter,
    pub flags: CheckFlags,
    pub indexes: &'a IndexSet,
    /// Property records already claimed by an owner.
    pub property_owners: Option<&'a AtomicBitset>,
}

impl CheckContext<'_> {
    /// Reports a structural finding unless graph checks are switched off.
    pub fn graph(&self, record_type: RecordType, id: u64, kind: Kind) {
        if self.flags.graph {
            self.reporter.on(record_type, id, kind);
        }
    }

    /// Reports an index agreement finding unless index checks are switched off.
    pub fn index(&self, record_type: RecordType, id: u64, kind: Kind) {
        if self.flags.indexes {
            self.reporter.on(record_type, id, kind);
        }
    }

    /// Reports an index entry that is broken on its own, such as one that
    /// points at a record not in use.
    pub fn index_structure(&self, record_type: RecordType, id: u64, kind: Kind) {
        if self.flags.index_structure {
            self.reporter.on(record_type, id, kind);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::report::ConsistencySummary;

    /// Runs `f` against `stores` with every check enabled and no indexes.
    pub fn with_context(
        stores: &Stores,
        tokens: &Tokens,
        owners: Option<&AtomicBitset>,
        f: impl FnOnce(&CheckContext<'_>),
    ) -> ConsistencySummary {
        let reporter = Reporter::new(None, 100, None).unwrap();
        let indexes = IndexSet::default();
        let ctx = CheckContext {
            stores,
            tokens,
            reporter: &reporter,
            flags: CheckFlags::default(),
            indexes: &indexes,
            property_owners: owners,
        };
        f(&ctx);
        reporter.summary()
    }
}
