//! Read-only access to a store directory.

pub mod dynamic;
pub mod format;
pub mod labels;
pub mod record;
pub mod record_store;
#[cfg(test)]
pub(crate) mod testing;
pub mod value;

use std::path::{Path, PathBuf};

use self::dynamic::{DynamicKind, DynamicStore};
use self::record::{
    NodeRecord, PropertyRecord, RelationshipGroupRecord, RelationshipRecord, SchemaRecord,
    TokenRecord,
};
use self::record_store::RecordStore;
use crate::error::StoreError;

pub const NODE_STORE: &str = "nodes.store";
pub const RELATIONSHIP_STORE: &str = "relationships.store";
pub const RELATIONSHIP_GROUP_STORE: &str = "relationship_groups.store";
pub const PROPERTY_STORE: &str = "properties.store";
pub const SCHEMA_STORE: &str = "schema.store";
pub const COUNTS_STORE: &str = "counts.store";

/// The three kinds of interned names.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Label,
    RelationshipType,
    PropertyKey,
}

impl TokenKind {
    pub const ALL: [Self; 3] = [Self::Label, Self::RelationshipType, Self::PropertyKey];

    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Label => "label_tokens.store",
            Self::RelationshipType => "relationship_type_tokens.store",
            Self::PropertyKey => "property_key_tokens.store",
        }
    }

    /// The dynamic store holding names of this kind.
    #[must_use]
    pub const fn names(self) -> DynamicKind {
        match self {
            Self::Label => DynamicKind::LabelName,
            Self::RelationshipType => DynamicKind::RelationshipTypeName,
            Self::PropertyKey => DynamicKind::PropertyKeyName,
        }
    }
}

/// Every store file of one database, opened for reading.
#[derive(Debug)]
pub struct Stores {
    pub dir: PathBuf,
    pub nodes: RecordStore<NodeRecord>,
    pub relationships: RecordStore<RelationshipRecord>,
    pub groups: RecordStore<RelationshipGroupRecord>,
    pub properties: RecordStore<PropertyRecord>,
    pub schema: RecordStore<SchemaRecord>,
    pub label_tokens: RecordStore<TokenRecord>,
    pub relationship_type_tokens: RecordStore<TokenRecord>,
    pub property_key_tokens: RecordStore<TokenRecord>,
    pub strings: DynamicStore,
    pub arrays: DynamicStore,
    pub node_labels: DynamicStore,
    pub label_names: DynamicStore,
    pub relationship_type_names: DynamicStore,
    pub property_key_names: DynamicStore,
}

impl Stores {
    /// Opens every store file under `dir`.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`] met; a check cannot start without
    /// all stores.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let open_tokens =
            |kind: TokenKind| RecordStore::open(kind.file_name(), &dir.join(kind.file_name()));
        let label_tokens = open_tokens(TokenKind::Label)?;
        let relationship_type_tokens = open_tokens(TokenKind::RelationshipType)?;
        let property_key_tokens = open_tokens(TokenKind::PropertyKey)?;

        let names = Some(DynamicKind::MAX_NAME_LEN);
        // owner id plus one entry per label token
        let label_list = usize::try_from(label_tokens.high_id())
            .ok()
            .and_then(|labels| labels.checked_mul(4))
            .and_then(|bytes| bytes.checked_add(8));

        let stores = Self {
            dir: dir.to_path_buf(),
            nodes: RecordStore::open(NODE_STORE, &dir.join(NODE_STORE))?,
            relationships: RecordStore::open(RELATIONSHIP_STORE, &dir.join(RELATIONSHIP_STORE))?,
            groups: RecordStore::open(
                RELATIONSHIP_GROUP_STORE,
                &dir.join(RELATIONSHIP_GROUP_STORE),
            )?,
            properties: RecordStore::open(PROPERTY_STORE, &dir.join(PROPERTY_STORE))?,
            schema: RecordStore::open(SCHEMA_STORE, &dir.join(SCHEMA_STORE))?,
            label_tokens,
            relationship_type_tokens,
            property_key_tokens,
            strings: DynamicStore::open(dir, DynamicKind::String, None)?,
            arrays: DynamicStore::open(dir, DynamicKind::Array, None)?,
            node_labels: DynamicStore::open(dir, DynamicKind::NodeLabels, label_list)?,
            label_names: DynamicStore::open(dir, DynamicKind::LabelName, names)?,
            relationship_type_names: DynamicStore::open(
                dir,
                DynamicKind::RelationshipTypeName,
                names,
            )?,
            property_key_names: DynamicStore::open(dir, DynamicKind::PropertyKeyName, names)?,
        };
        tracing::info!(
            dir = %dir.display(),
            nodes = stores.nodes.high_id(),
            relationships = stores.relationships.high_id(),
            groups = stores.groups.high_id(),
            properties = stores.properties.high_id(),
            "opened stores"
        );
        Ok(stores)
    }

    #[must_use]
    pub const fn dynamic(&self, kind: DynamicKind) -> &DynamicStore {
        match kind {
            DynamicKind::String => &self.strings,
            DynamicKind::Array => &self.arrays,
            DynamicKind::NodeLabels => &self.node_labels,
            DynamicKind::LabelName => &self.label_names,
            DynamicKind::RelationshipTypeName => &self.relationship_type_names,
            DynamicKind::PropertyKeyName => &self.property_key_names,
        }
    }

    #[must_use]
    pub const fn tokens(&self, kind: TokenKind) -> &RecordStore<TokenRecord> {
        match kind {
            TokenKind::Label => &self.label_tokens,
            TokenKind::RelationshipType => &self.relationship_type_tokens,
            TokenKind::PropertyKey => &self.property_key_tokens,
        }
    }
}
