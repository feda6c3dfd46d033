//! Token records and their name chains.
//!
//! Runs before everything else: the tables built here are what every other
//! checker resolves label, type and key ids against.

use hashbrown::HashMap;
use tracing::debug;

use crate::report::{Kind, RecordType};
use crate::store::{Stores, TokenKind};
use crate::tokens::{TokenEntry, TokenTable, Tokens};

#[must_use]
pub const fn record_type(kind: TokenKind) -> RecordType {
    match kind {
        TokenKind::Label => RecordType::Label,
        TokenKind::RelationshipType => RecordType::RelationshipType,
        TokenKind::PropertyKey => RecordType::PropertyKey,
    }
}

/// Reads and checks every token, returning the resolved tables.
///
/// A token whose name cannot be read stays in its table without a name.
pub fn check_tokens(stores: &Stores, report: impl Fn(RecordType, u64, Kind)) -> Tokens {
    let [labels, relationship_types, property_keys] =
        TokenKind::ALL.map(|kind| read_table(stores, kind, &report));
    Tokens {
        labels,
        relationship_types,
        property_keys,
    }
}

fn read_table(
    stores: &Stores,
    kind: TokenKind,
    report: &impl Fn(RecordType, u64, Kind),
) -> TokenTable {
    let names = stores.dynamic(kind.names());
    let record_type = record_type(kind);
    let mut entries = Vec::new();
    let mut first_blocks = HashMap::new();
    let mut seen: HashMap<String, u64> = HashMap::new();
    for record in stores.tokens(kind).scan() {
        if !record.in_use {
            entries.push(TokenEntry {
                in_use: false,
                internal: record.internal,
                name: None,
            });
            continue;
        }
        let id = record.id;
        if let Some(&other) = first_blocks.get(&record.name) {
            report(record_type, id, Kind::TokenNameShared { other });
        } else {
            first_blocks.insert(record.name, id);
        }
        let name = match names.read_chain(record.name) {
            Err(error) => {
                report(record_type, id, Kind::TokenNameChain { error });
                None
            }
            Ok(chain) => String::from_utf8(chain.payload).ok().or_else(|| {
                report(record_type, id, Kind::TokenNameInvalid);
                None
            }),
        };
        match &name {
            Some(name) if name.is_empty() => report(record_type, id, Kind::TokenEmptyName),
            Some(name) => {
                if let Some(&other) = seen.get(name) {
                    report(record_type, id, Kind::TokenNameNotUnique { other });
                } else {
                    seen.insert(name.clone(), id);
                }
            }
            None => {}
        }
        entries.push(TokenEntry {
            in_use: true,
            internal: record.internal,
            name,
        });
    }
    debug!(kind = ?kind, tokens = entries.len(), "read token table");
    TokenTable::new(entries)
}

#[cfg(test)]
mod tests {
    use core::cell::RefCell;

    use super::*;
    use crate::store::dynamic::DynamicKind;
    use crate::store::record::TokenRecord;
    use crate::store::testing::{store, TestStores};

    fn collect(stores: &Stores) -> (Tokens, Vec<(RecordType, u64, Kind)>) {
        let found = RefCell::new(Vec::new());
        let tokens = check_tokens(stores, |rt, id, kind| found.borrow_mut().push((rt, id, kind)));
        (tokens, found.into_inner())
    }

    #[test]
    fn test_tables_resolve_names() {
        let mut ts = TestStores::default();
        ts.labels = vec!["Person", "Movie"];
        ts.property_keys = vec!["name", "__schema.kind"];
        let (tokens, found) = collect(&ts.build());
        assert!(found.is_empty());
        assert_eq!(tokens.labels.find("Movie"), Some(1));
        assert!(tokens.property_keys.is_internal(1));
        assert!(tokens.relationship_types.is_empty());
    }

    #[test]
    fn test_duplicate_and_empty_names() {
        let mut ts = TestStores::default();
        ts.relationship_types = vec!["KNOWS", "KNOWS", ""];
        let (tokens, found) = collect(&ts.build());
        assert_eq!(
            found,
            vec![
                (RecordType::RelationshipType, 1, Kind::TokenNameNotUnique { other: 0 }),
                (RecordType::RelationshipType, 2, Kind::TokenEmptyName),
            ]
        );
        assert_eq!(tokens.relationship_types.find("KNOWS"), Some(0));
    }

    #[test]
    fn test_shared_and_broken_name_chains() {
        let mut ts = TestStores::default();
        let good = ts.chain(DynamicKind::LabelName, b"Person");
        let bad = ts.chain(DynamicKind::LabelName, &[0xff, 0xfe]);
        let mut stores = ts.build();
        let record = |id, name| TokenRecord {
            id,
            in_use: true,
            internal: false,
            name,
        };
        let records = [record(0, good), record(1, good), record(2, bad), record(3, 40)];
        stores.label_tokens = store("labels", TokenRecord::SIZE, &records);
        let (tokens, found) = collect(&stores);
        let kinds: Vec<_> = found.into_iter().map(|(_, id, kind)| (id, kind)).collect();
        assert_eq!(kinds[0], (1, Kind::TokenNameShared { other: 0 }));
        assert_eq!(kinds[1], (1, Kind::TokenNameNotUnique { other: 0 }));
        assert_eq!(kinds[2], (2, Kind::TokenNameInvalid));
        assert!(matches!(kinds[3], (3, Kind::TokenNameChain { .. })));
        assert_eq!(kinds.len(), 4);
        assert!(tokens.labels.in_use(3));
        assert_eq!(tokens.labels.get(3).and_then(|e| e.name.clone()), None);
    }
}
