//! Dynamic blocks, checked one by one regardless of which chain they belong to.

use core::ops::Range;

use super::CheckContext;
use crate::cache::AtomicBitset;
use crate::report::{Kind, RecordType};
use crate::store::dynamic::DynamicKind;
use crate::store::record::{is_null, DynamicRecord};

/// Record type findings about blocks of `kind` are filed under.
#[must_use]
pub const fn record_type(kind: DynamicKind) -> RecordType {
    match kind {
        DynamicKind::String => RecordType::StringProperty,
        DynamicKind::Array => RecordType::ArrayProperty,
        DynamicKind::NodeLabels => RecordType::NodeDynamicLabel,
        DynamicKind::LabelName => RecordType::LabelName,
        DynamicKind::RelationshipTypeName => RecordType::RelationshipTypeName,
        DynamicKind::PropertyKeyName => RecordType::PropertyKeyName,
    }
}

/// Checks the blocks of `unit` in the store of `kind`.
///
/// `referenced` is shared by every unit of the same store and marks blocks
/// already named as some block's next.
pub fn check_dynamic_records(
    ctx: &CheckContext<'_>,
    kind: DynamicKind,
    referenced: &AtomicBitset,
    unit: Range<u64>,
) {
    let store = ctx.stores.dynamic(kind);
    let capacity = store.capacity();
    let record_type = record_type(kind);
    for block in store.records().cursor(unit) {
        if ctx.reporter.should_stop() {
            return;
        }
        if !block.in_use {
            continue;
        }
        let report = |finding| ctx.graph(record_type, block.id, finding);
        check_block(ctx, kind, capacity, referenced, &block, report);
    }
}

fn check_block(
    ctx: &CheckContext<'_>,
    kind: DynamicKind,
    capacity: usize,
    referenced: &AtomicBitset,
    block: &DynamicRecord,
    report: impl Fn(Kind),
) {
    let length = block.length as usize;
    if length > capacity {
        report(Kind::DynamicInvalidLength {
            length: block.length,
        });
    }
    if block.type_code != kind.code() {
        report(Kind::DynamicWrongType {
            found: block.type_code,
        });
    }
    if is_null(block.next) {
        return;
    }
    if block.next == block.id {
        report(Kind::DynamicSelfReference);
        return;
    }
    let next = ctx.stores.dynamic(kind).records().read(block.next);
    if !next.in_use {
        report(Kind::DynamicNextNotInUse { next: next.id });
    } else {
        if !referenced.insert(next.id) {
            report(Kind::DynamicNextMultipleOwners { next: next.id });
        }
        if next.length == 0 {
            report(Kind::DynamicEmptyNextBlock { next: next.id });
        }
    }
    if length == 0 {
        report(Kind::DynamicEmptyBlock);
    } else if length < capacity {
        report(Kind::DynamicNotFullReferencesNext);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::testing::with_context;
    use crate::report::ConsistencySummary;
    use crate::store::testing::{tokens, TestStores, CAPACITY};

    fn run(ts: TestStores, kind: DynamicKind) -> ConsistencySummary {
        let stores = ts.build();
        let tokens = tokens(&[], &[], &[]);
        let high = stores.dynamic(kind).records().high_id();
        let referenced = AtomicBitset::new(high);
        with_context(&stores, &tokens, None, |ctx| {
            // two units over the same bitset
            check_dynamic_records(ctx, kind, &referenced, 0..high / 2);
            check_dynamic_records(ctx, kind, &referenced, high / 2..high);
        })
    }

    #[test]
    fn test_clean_chains() {
        let mut ts = TestStores::default();
        ts.chain(DynamicKind::String, &[b'a'; CAPACITY * 3]);
        ts.chain(DynamicKind::String, b"tail ends short");
        let summary = run(ts, DynamicKind::String);
        assert!(summary.is_consistent());
        assert_eq!(summary.warning_count(RecordType::StringProperty), 0);
    }

    #[test]
    fn test_block_findings() {
        let mut ts = TestStores::default();
        ts.chain(DynamicKind::Array, &[1; CAPACITY * 2]);
        ts.chain(DynamicKind::Array, &[2; CAPACITY * 2]);
        ts.dynamic[0].1.length = CAPACITY as u32 + 1;
        ts.dynamic[1].1.type_code = DynamicKind::String.code();
        // block 2 also points at block 1
        ts.dynamic[2].1.next = 1;
        let summary = run(ts, DynamicKind::Array);
        assert_eq!(summary.inconsistency_count(RecordType::ArrayProperty), 3);
    }

    #[test]
    fn test_self_reference_and_unused_next() {
        let mut ts = TestStores::default();
        ts.chain(DynamicKind::NodeLabels, &[0; CAPACITY]);
        ts.chain(DynamicKind::NodeLabels, &[0; CAPACITY]);
        ts.dynamic[0].1.next = 0;
        ts.dynamic[1].1.next = 7;
        let summary = run(ts, DynamicKind::NodeLabels);
        assert_eq!(summary.inconsistency_count(RecordType::NodeDynamicLabel), 2);
    }

    #[test]
    fn test_short_and_empty_blocks_warn() {
        let mut ts = TestStores::default();
        ts.chain(DynamicKind::LabelName, &[b'x'; CAPACITY * 2]);
        ts.chain(DynamicKind::LabelName, &[b'y'; CAPACITY * 2]);
        ts.dynamic[0].1.length = 3;
        ts.dynamic[1].1.length = 0;
        ts.dynamic[2].1.length = 0;
        let summary = run(ts, DynamicKind::LabelName);
        assert!(summary.is_consistent());
        // not full, empty next, empty with a next
        assert_eq!(summary.warning_count(RecordType::LabelName), 3);
    }
}
