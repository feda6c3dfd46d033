//! Schema rules and their property-chain encoding.

use core::fmt;

use crate::store::value::Value;
use crate::tokens::TokenTable;

pub const KEY_KIND: &str = "__schema.kind";
pub const KEY_ENTITY: &str = "__schema.entity";
pub const KEY_TOKENS: &str = "__schema.tokens";
pub const KEY_PROPERTIES: &str = "__schema.properties";
pub const KEY_INDEX_TYPE: &str = "__schema.index_type";
pub const KEY_PROVIDER: &str = "__schema.provider";
pub const KEY_OWNED_INDEX: &str = "__schema.owned_index";
pub const KEY_OWNING_CONSTRAINT: &str = "__schema.owning_constraint";
pub const KEY_CONSTRAINT_TYPE: &str = "__schema.constraint_type";
pub const KEY_NAME: &str = "__schema.name";

/// Every internal key a schema rule may use.
pub const SCHEMA_KEYS: [&str; 10] = [
    KEY_KIND,
    KEY_ENTITY,
    KEY_TOKENS,
    KEY_PROPERTIES,
    KEY_INDEX_TYPE,
    KEY_PROVIDER,
    KEY_OWNED_INDEX,
    KEY_OWNING_CONSTRAINT,
    KEY_CONSTRAINT_TYPE,
    KEY_NAME,
];

/// Provider of the file-backed index implementation.
pub const DEFAULT_PROVIDER: &str = "storecop-file-1.0";

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Node,
    Relationship,
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    Range,
    Text,
    /// Token index: entity to labels or relationship type.
    Lookup,
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintType {
    Unique,
    Exists,
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRule {
    pub id: u64,
    pub name: String,
    pub entity: EntityType,
    /// Labels or relationship types; empty for lookup indexes.
    pub tokens: Vec<u32>,
    pub properties: Vec<u32>,
    pub index_type: IndexType,
    pub provider: String,
    pub owning_constraint: Option<u64>,
}

impl IndexRule {
    /// Whether an entity carrying `tokens` falls under this index.
    #[must_use]
    pub fn covers(&self, tokens: &[u32]) -> bool {
        self.tokens.iter().any(|t| tokens.contains(t))
    }
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintRule {
    pub id: u64,
    pub name: String,
    pub entity: EntityType,
    pub tokens: Vec<u32>,
    pub properties: Vec<u32>,
    pub constraint_type: ConstraintType,
    pub owned_index: Option<u64>,
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaRule {
    Index(IndexRule),
    Constraint(ConstraintRule),
}

/// Why a property chain does not describe a schema rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRule(pub String);

impl fmt::Display for MalformedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Fields<'a> {
    properties: &'a [(u32, Value)],
    keys: &'a TokenTable,
}

impl Fields<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        let id = self.keys.find(key)?;
        self.properties
            .iter()
            .find_map(|(k, v)| (*k == id).then_some(v))
    }

    fn string(&self, key: &str) -> Result<&str, MalformedRule> {
        match self.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(MalformedRule(format!("{key} is not a string"))),
            None => Err(MalformedRule(format!("{key} is missing"))),
        }
    }

    fn reference(&self, key: &str) -> Result<Option<u64>, MalformedRule> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Int(id)) => u64::try_from(*id)
                .map(Some)
                .map_err(|_| MalformedRule(format!("{key} is negative"))),
            Some(_) => Err(MalformedRule(format!("{key} is not an integer"))),
        }
    }

    fn ids(&self, key: &str) -> Result<Vec<u32>, MalformedRule> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|&i| u32::try_from(i).map_err(|_| MalformedRule(format!("{key} holds {i}"))))
                .collect(),
            Some(_) => Err(MalformedRule(format!("{key} is not an array"))),
        }
    }
}

impl SchemaRule {
    #[must_use]
    pub const fn id(&self) -> u64 {
        match self {
            Self::Index(rule) => rule.id,
            Self::Constraint(rule) => rule.id,
        }
    }

    /// Decodes a rule from the resolved property chain of schema record `id`.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedRule`] naming the first missing or mistyped field.
    pub fn parse(
        id: u64,
        properties: &[(u32, Value)],
        keys: &TokenTable,
    ) -> Result<Self, MalformedRule> {
        let fields = Fields { properties, keys };
        let entity = match fields.string(KEY_ENTITY)? {
            "node" => EntityType::Node,
            "relationship" => EntityType::Relationship,
            other => return Err(MalformedRule(format!("unknown entity type {other:?}"))),
        };
        let name = fields.string(KEY_NAME)?.to_owned();
        let tokens = fields.ids(KEY_TOKENS)?;
        let properties = fields.ids(KEY_PROPERTIES)?;
        match fields.string(KEY_KIND)? {
            "index" => {
                let index_type = match fields.string(KEY_INDEX_TYPE)? {
                    "range" => IndexType::Range,
                    "text" => IndexType::Text,
                    "lookup" => IndexType::Lookup,
                    other => return Err(MalformedRule(format!("unknown index type {other:?}"))),
                };
                let lookup = index_type == IndexType::Lookup;
                if lookup != (tokens.is_empty() && properties.is_empty()) {
                    return Err(MalformedRule(
                        "only lookup indexes have an empty schema".to_owned(),
                    ));
                }
                Ok(Self::Index(IndexRule {
                    id,
                    name,
                    entity,
                    tokens,
                    properties,
                    index_type,
                    provider: fields.string(KEY_PROVIDER)?.to_owned(),
                    owning_constraint: fields.reference(KEY_OWNING_CONSTRAINT)?,
                }))
            }
            "constraint" => {
                let constraint_type = match fields.string(KEY_CONSTRAINT_TYPE)? {
                    "unique" => ConstraintType::Unique,
                    "exists" => ConstraintType::Exists,
                    other => {
                        return Err(MalformedRule(format!("unknown constraint type {other:?}")))
                    }
                };
                if tokens.is_empty() || properties.is_empty() {
                    return Err(MalformedRule("constraint has an empty schema".to_owned()));
                }
                Ok(Self::Constraint(ConstraintRule {
                    id,
                    name,
                    entity,
                    tokens,
                    properties,
                    constraint_type,
                    owned_index: fields.reference(KEY_OWNED_INDEX)?,
                }))
            }
            other => Err(MalformedRule(format!("unknown rule kind {other:?}"))),
        }
    }

    /// Field values keyed by internal key name, the inverse of [`Self::parse`].
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        let entity = |e: EntityType| {
            Value::String(
                match e {
                    EntityType::Node => "node",
                    EntityType::Relationship => "relationship",
                }
                .to_owned(),
            )
        };
        let ids = |ids: &[u32]| Value::Array(ids.iter().map(|&i| i64::from(i)).collect());
        #[allow(clippy::cast_possible_wrap)]
        let reference = |id: u64| Value::Int(id as i64);
        let mut out = Vec::new();
        match self {
            Self::Index(rule) => {
                out.push((KEY_KIND, Value::String("index".to_owned())));
                out.push((KEY_NAME, Value::String(rule.name.clone())));
                out.push((KEY_ENTITY, entity(rule.entity)));
                out.push((KEY_TOKENS, ids(&rule.tokens)));
                out.push((KEY_PROPERTIES, ids(&rule.properties)));
                let index_type = match rule.index_type {
                    IndexType::Range => "range",
                    IndexType::Text => "text",
                    IndexType::Lookup => "lookup",
                };
                out.push((KEY_INDEX_TYPE, Value::String(index_type.to_owned())));
                out.push((KEY_PROVIDER, Value::String(rule.provider.clone())));
                if let Some(owner) = rule.owning_constraint {
                    out.push((KEY_OWNING_CONSTRAINT, reference(owner)));
                }
            }
            Self::Constraint(rule) => {
                out.push((KEY_KIND, Value::String("constraint".to_owned())));
                out.push((KEY_NAME, Value::String(rule.name.clone())));
                out.push((KEY_ENTITY, entity(rule.entity)));
                out.push((KEY_TOKENS, ids(&rule.tokens)));
                out.push((KEY_PROPERTIES, ids(&rule.properties)));
                let constraint_type = match rule.constraint_type {
                    ConstraintType::Unique => "unique",
                    ConstraintType::Exists => "exists",
                };
                out.push((KEY_CONSTRAINT_TYPE, Value::String(constraint_type.to_owned())));
                if let Some(index) = rule.owned_index {
                    out.push((KEY_OWNED_INDEX, reference(index)));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::TokenEntry;

    fn keys() -> TokenTable {
        TokenTable::new(
            SCHEMA_KEYS
                .iter()
                .map(|name| TokenEntry {
                    in_use: true,
                    internal: true,
                    name: Some((*name).to_owned()),
                })
                .collect(),
        )
    }

    fn resolve(rule: &SchemaRule, keys: &TokenTable) -> Vec<(u32, Value)> {
        rule.fields()
            .into_iter()
            .map(|(name, value)| (keys.find(name).unwrap(), value))
            .collect()
    }

    #[test]
    fn test_index_rule_fields() {
        let keys = keys();
        let rule = SchemaRule::Index(IndexRule {
            id: 3,
            name: "person_name".into(),
            entity: EntityType::Node,
            tokens: vec![0],
            properties: vec![1, 2],
            index_type: IndexType::Range,
            provider: DEFAULT_PROVIDER.into(),
            owning_constraint: Some(4),
        });
        assert_eq!(SchemaRule::parse(3, &resolve(&rule, &keys), &keys).unwrap(), rule);
    }

    #[test]
    fn test_constraint_rule_fields() {
        let keys = keys();
        let rule = SchemaRule::Constraint(ConstraintRule {
            id: 4,
            name: "person_name_unique".into(),
            entity: EntityType::Node,
            tokens: vec![0],
            properties: vec![1],
            constraint_type: ConstraintType::Unique,
            owned_index: None,
        });
        assert_eq!(SchemaRule::parse(4, &resolve(&rule, &keys), &keys).unwrap(), rule);
    }

    #[test]
    fn test_missing_field_is_named() {
        let keys = keys();
        let props = vec![(keys.find(KEY_ENTITY).unwrap(), Value::String("node".into()))];
        let err = SchemaRule::parse(0, &props, &keys).unwrap_err();
        assert_eq!(err.0, "__schema.name is missing");
    }

    #[test]
    fn test_lookup_index_must_have_empty_schema() {
        let keys = keys();
        let rule = SchemaRule::Index(IndexRule {
            id: 0,
            name: "labels".into(),
            entity: EntityType::Node,
            tokens: vec![1],
            properties: vec![],
            index_type: IndexType::Lookup,
            provider: DEFAULT_PROVIDER.into(),
            owning_constraint: None,
        });
        assert!(SchemaRule::parse(0, &resolve(&rule, &keys), &keys).is_err());
    }
}
