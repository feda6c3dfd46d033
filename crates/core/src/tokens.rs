//! Resolved token names, built once per check.

use hashbrown::HashMap;

use crate::store::TokenKind;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenEntry {
    pub in_use: bool,
    pub internal: bool,
    /// `None` when the name chain could not be read.
    pub name: Option<String>,
}

/// Every token of one kind, indexed by id.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    entries: Vec<TokenEntry>,
    by_name: HashMap<String, u32>,
}

impl TokenTable {
    #[must_use]
    pub fn new(entries: Vec<TokenEntry>) -> Self {
        let mut by_name = HashMap::new();
        for (id, entry) in (0u32..).zip(&entries) {
            if let (true, Some(name)) = (entry.in_use, &entry.name) {
                by_name.entry(name.clone()).or_insert(id);
            }
        }
        Self { entries, by_name }
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&TokenEntry> {
        self.entries.get(id as usize)
    }

    #[must_use]
    pub fn in_use(&self, id: u32) -> bool {
        self.get(id).is_some_and(|e| e.in_use)
    }

    #[must_use]
    pub fn is_internal(&self, id: u32) -> bool {
        self.get(id).is_some_and(|e| e.in_use && e.internal)
    }

    /// Lowest in-use id carrying `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The three token tables.
#[derive(Debug, Clone, Default)]
pub struct Tokens {
    pub labels: TokenTable,
    pub relationship_types: TokenTable,
    pub property_keys: TokenTable,
}

impl Tokens {
    #[must_use]
    pub const fn table(&self, kind: TokenKind) -> &TokenTable {
        match kind {
            TokenKind::Label => &self.labels,
            TokenKind::RelationshipType => &self.relationship_types,
            TokenKind::PropertyKey => &self.property_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(in_use: bool, internal: bool, name: &str) -> TokenEntry {
        TokenEntry {
            in_use,
            internal,
            name: Some(name.to_owned()),
        }
    }

    #[test]
    fn test_lookup_by_name_skips_unused() {
        let table = TokenTable::new(vec![
            entry(false, false, "Person"),
            entry(true, false, "Person"),
            entry(true, true, "__schema.kind"),
        ]);
        assert_eq!(table.find("Person"), Some(1));
        assert!(table.is_internal(2));
        assert!(!table.is_internal(1));
        assert!(!table.in_use(0));
        assert!(!table.in_use(17));
        assert_eq!(table.len(), 3);
    }
}
