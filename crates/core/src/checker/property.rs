//! Property records and the property chains hanging off their owners.

use core::ops::Range;

use hashbrown::HashSet;

use super::CheckContext;
use crate::cache::AtomicBitset;
use crate::report::{Kind, RecordType};
use crate::store::dynamic::ChainError;
use crate::store::record::{is_null, BlockType, PropertyBlock, PropertyRecord};
use crate::store::value::Value;
use crate::store::Stores;
use crate::tokens::TokenTable;

/// Why a block does not yield a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIssue {
    InvalidType(u8),
    Chain(ChainError),
    Malformed,
}

/// Decodes the value of one block, following its dynamic chain if needed.
///
/// # Errors
///
/// Returns a [`BlockIssue`] when the type code is unknown, the chain is
/// broken, or the payload does not decode.
pub fn block_value(stores: &Stores, block: &PropertyBlock) -> Result<Value, BlockIssue> {
    match block.block_type() {
        None | Some(BlockType::Empty) => Err(BlockIssue::InvalidType(block.type_code)),
        Some(BlockType::String) => {
            let chain = stores.strings.read_chain(block.value).map_err(BlockIssue::Chain)?;
            Value::from_string_payload(chain.payload).ok_or(BlockIssue::Malformed)
        }
        Some(BlockType::Array) => {
            let chain = stores.arrays.read_chain(block.value).map_err(BlockIssue::Chain)?;
            Value::from_array_payload(&chain.payload).ok_or(BlockIssue::Malformed)
        }
        Some(_) => Value::from_inline(block).ok_or(BlockIssue::Malformed),
    }
}

/// Checks property records `unit` on their own: neighbours, keys and values.
pub fn check_property_records(ctx: &CheckContext<'_>, unit: Range<u64>) {
    let properties = &ctx.stores.properties;
    for record in properties.cursor(unit) {
        if ctx.reporter.should_stop() {
            return;
        }
        if record.in_use {
            check_property_record(ctx, &record);
        }
    }
}

fn check_property_record(ctx: &CheckContext<'_>, record: &PropertyRecord) {
    let properties = &ctx.stores.properties;
    let report = |kind| ctx.graph(RecordType::Property, record.id, kind);

    if !is_null(record.prev) {
        let prev = properties.read(record.prev);
        if !prev.in_use {
            report(Kind::PropertyPrevNotInUse { prev: prev.id });
        } else if prev.next != record.id {
            report(Kind::PropertyPrevDoesNotReferenceBack { prev: prev.id });
        }
    }
    if !is_null(record.next) {
        let next = properties.read(record.next);
        if !next.in_use {
            report(Kind::PropertyNextNotInUse { next: next.id });
        } else if next.prev != record.id {
            report(Kind::PropertyNextDoesNotReferenceBack { next: next.id });
        }
    }

    for (_, block) in record.used_blocks() {
        let key = block.key;
        if !ctx.tokens.property_keys.in_use(key) {
            report(Kind::PropertyKeyNotInUse { key });
        }
        match block_value(ctx.stores, block) {
            Ok(_) => {}
            Err(BlockIssue::InvalidType(type_code)) => {
                report(Kind::PropertyTypeInvalid { key, type_code });
            }
            Err(BlockIssue::Chain(error)) => report(Kind::PropertyValueChain { key, error }),
            Err(BlockIssue::Malformed) => report(Kind::PropertyValueMalformed { key }),
        }
    }
}

/// A problem found while reading a chain on behalf of its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerIssue {
    /// Reported on the owning record.
    Owner(Kind),
    /// The property record is already claimed by another owner.
    SharedRecord(u64),
}

/// Walks the property chain starting at `first` and returns the key/value
/// pairs it resolves.
///
/// `owners` marks every visited record; a record already marked is reported
/// as shared. Internal keys are flagged unless `allow_internal` is set.
pub fn read_owner_chain(
    stores: &Stores,
    keys: &TokenTable,
    first: u64,
    allow_internal: bool,
    owners: Option<&AtomicBitset>,
    mut on_issue: impl FnMut(OwnerIssue),
) -> Vec<(u32, Value)> {
    let mut values = Vec::new();
    let mut visited = HashSet::new();
    let mut repeated = HashSet::new();
    let mut current = first;
    while !is_null(current) {
        if !visited.insert(current) {
            on_issue(OwnerIssue::Owner(Kind::PropertyChainCycle { property: current }));
            break;
        }
        let record = stores.properties.read(current);
        if !record.in_use {
            on_issue(OwnerIssue::Owner(Kind::PropertyNotInUse { property: current }));
            break;
        }
        if current == first && !is_null(record.prev) {
            on_issue(OwnerIssue::Owner(Kind::PropertyNotFirstInChain { property: current }));
        }
        if owners.is_some_and(|owners| !owners.insert(current)) {
            on_issue(OwnerIssue::SharedRecord(current));
        }
        for (_, block) in record.used_blocks() {
            let key = block.key;
            if values.iter().any(|(k, _)| *k == key) {
                if repeated.insert(key) {
                    on_issue(OwnerIssue::Owner(Kind::PropertyKeyNotUnique { key }));
                }
                continue;
            }
            if !allow_internal && keys.is_internal(key) {
                on_issue(OwnerIssue::Owner(Kind::InternalPropertyKey { key }));
            }
            if let Ok(value) = block_value(stores, block) {
                values.push((key, value));
            }
        }
        current = record.next;
    }
    values
}

/// Reads the chain of a user entity and reports what is wrong with it.
pub fn check_owner_chain(
    ctx: &CheckContext<'_>,
    owner_type: RecordType,
    owner: u64,
    first: u64,
) -> Vec<(u32, Value)> {
    read_owner_chain(
        ctx.stores,
        &ctx.tokens.property_keys,
        first,
        owner_type == RecordType::Schema,
        ctx.property_owners,
        |issue| match issue {
            OwnerIssue::Owner(kind) => ctx.graph(owner_type, owner, kind),
            OwnerIssue::SharedRecord(property) => {
                ctx.graph(RecordType::Property, property, Kind::PropertyMultipleOwners);
            }
        },
    )
}

/// Resolves the values of a chain without reporting anything.
#[must_use]
pub fn resolve_values(stores: &Stores, keys: &TokenTable, first: u64) -> Vec<(u32, Value)> {
    read_owner_chain(stores, keys, first, true, None, |_| {})
}
