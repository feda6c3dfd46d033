//! In-memory store directories for unit tests.

use std::path::PathBuf;

use super::dynamic::{chain_blocks, DynamicKind, DynamicStore};
use super::format::{encode_store, NULL_REFERENCE};
use super::record::{
    DynamicRecord, NodeRecord, PropertyRecord, Record, RelationshipGroupRecord,
    RelationshipRecord, SchemaRecord, TokenRecord,
};
use super::record_store::{RecordStore, StoreBytes};
use super::value::Value;
use super::{Stores, TokenKind};
use crate::tokens::{TokenEntry, TokenTable, Tokens};

pub const CAPACITY: usize = 16;

pub fn store<R: Record>(name: &str, size: usize, records: &[R]) -> RecordStore<R> {
    let high_id = records.iter().map(|r| r.id() + 1).max().unwrap_or(0);
    let bytes = encode_store(R::KIND, size, high_id, records, |r, slot| {
        r.encode(slot);
        r.id()
    });
    RecordStore::from_bytes(name, StoreBytes::Owned(bytes)).unwrap()
}

#[derive(Debug, Default)]
pub struct TestStores {
    pub nodes: Vec<NodeRecord>,
    pub relationships: Vec<RelationshipRecord>,
    pub groups: Vec<RelationshipGroupRecord>,
    pub properties: Vec<PropertyRecord>,
    pub schema: Vec<SchemaRecord>,
    pub labels: Vec<&'static str>,
    pub relationship_types: Vec<&'static str>,
    pub property_keys: Vec<&'static str>,
    pub dynamic: Vec<(DynamicKind, DynamicRecord)>,
}

impl TestStores {
    /// Appends a chain holding `payload` and returns its first block id.
    pub fn chain(&mut self, kind: DynamicKind, payload: &[u8]) -> u64 {
        let first = self
            .dynamic
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, r)| r.id + 1)
            .max()
            .unwrap_or(0);
        for block in chain_blocks(kind, CAPACITY, first, payload) {
            self.dynamic.push((kind, block));
        }
        first
    }

    /// Appends property records holding `values` and returns the head id.
    pub fn property_chain(&mut self, values: &[(u32, Value)]) -> u64 {
        let mut next_id = self.properties.iter().map(|r| r.id + 1).max().unwrap_or(0);
        let first = next_id;
        let mut prev = NULL_REFERENCE;
        for group in values.chunks(4) {
            let mut record = PropertyRecord::new(next_id);
            record.prev = prev;
            for (slot, (key, value)) in record.blocks.iter_mut().zip(group) {
                *slot = value.to_block(*key, |kind, payload| self.chain(kind, &payload));
            }
            if let Some(last) = self.properties.last_mut().filter(|r| r.id == prev) {
                last.next = next_id;
            }
            self.properties.push(record);
            prev = next_id;
            next_id += 1;
        }
        if values.is_empty() {
            NULL_REFERENCE
        } else {
            first
        }
    }

    pub fn build(mut self) -> Stores {
        let mut tokens = Vec::new();
        for kind in TokenKind::ALL {
            let names = match kind {
                TokenKind::Label => self.labels.clone(),
                TokenKind::RelationshipType => self.relationship_types.clone(),
                TokenKind::PropertyKey => self.property_keys.clone(),
            };
            let records: Vec<TokenRecord> = (0..)
                .zip(names)
                .map(|(id, name)| TokenRecord {
                    id,
                    in_use: true,
                    internal: name.starts_with("__"),
                    name: self.chain(kind.names(), name.as_bytes()),
                })
                .collect();
            tokens.push(store(kind.file_name(), TokenRecord::SIZE, &records));
        }
        let dynamic = |kind: DynamicKind, max: Option<usize>| {
            let records: Vec<DynamicRecord> = self
                .dynamic
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, r)| r.clone())
                .collect();
            let records = store(
                kind.file_name(),
                DynamicRecord::HEADER_SIZE + CAPACITY,
                &records,
            );
            DynamicStore::new(records, kind, max)
        };
        let names = Some(DynamicKind::MAX_NAME_LEN);
        let mut tokens = tokens.into_iter();
        Stores {
            dir: PathBuf::new(),
            nodes: store("nodes", NodeRecord::SIZE, &self.nodes),
            relationships: store("relationships", RelationshipRecord::SIZE, &self.relationships),
            groups: store("groups", RelationshipGroupRecord::SIZE, &self.groups),
            properties: store("properties", PropertyRecord::SIZE, &self.properties),
            schema: store("schema", SchemaRecord::SIZE, &self.schema),
            label_tokens: tokens.next().unwrap(),
            relationship_type_tokens: tokens.next().unwrap(),
            property_key_tokens: tokens.next().unwrap(),
            strings: dynamic(DynamicKind::String, None),
            arrays: dynamic(DynamicKind::Array, None),
            node_labels: dynamic(DynamicKind::NodeLabels, Some(1024)),
            label_names: dynamic(DynamicKind::LabelName, names),
            relationship_type_names: dynamic(DynamicKind::RelationshipTypeName, names),
            property_key_names: dynamic(DynamicKind::PropertyKeyName, names),
        }
    }
}

/// Token tables matching the names given to [`TestStores`].
pub fn tokens(labels: &[&str], relationship_types: &[&str], property_keys: &[&str]) -> Tokens {
    let table = |names: &[&str]| {
        TokenTable::new(
            names
                .iter()
                .map(|name| TokenEntry {
                    in_use: true,
                    internal: name.starts_with("__"),
                    name: Some((*name).to_owned()),
                })
                .collect(),
        )
    };
    Tokens {
        labels: table(labels),
        relationship_types: table(relationship_types),
        property_keys: table(property_keys),
    }
}
