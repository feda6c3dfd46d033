//! Token indexes: entity to its labels or relationship type.

use hashbrown::HashMap;

use crate::error::IndexError;
use crate::store::format::{get_u16, get_u32, get_u64, put_u16, put_u64};

const MAGIC: [u8; 4] = *b"SCTX";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenIndex {
    entries: HashMap<u64, Vec<u32>>,
}

impl TokenIndex {
    #[must_use]
    pub const fn new(entries: HashMap<u64, Vec<u32>>) -> Self {
        Self { entries }
    }

    /// Indexed tokens of `entity`, sorted.
    #[must_use]
    pub fn get(&self, entity: u64) -> Option<&[u32]> {
        self.entries.get(&entity).map(Vec::as_slice)
    }

    pub fn entities(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.keys().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// # Errors
    ///
    /// Returns [`IndexError::Format`] when the file is not a token index or is
    /// cut short.
    pub fn decode(rule: u64, bytes: &[u8]) -> Result<Self, IndexError> {
        let malformed = |reason: &str| IndexError::Format {
            rule,
            reason: reason.to_owned(),
        };
        if bytes.len() < HEADER_SIZE || bytes[0..4] != MAGIC || get_u16(bytes, 4) != VERSION {
            return Err(malformed("not a token index file"));
        }
        let count = get_u64(bytes, 8);
        let mut entries = HashMap::new();
        let mut at = HEADER_SIZE;
        for _ in 0..count {
            let head = bytes
                .get(at..at + 10)
                .ok_or_else(|| malformed("truncated entry"))?;
            let entity = get_u64(head, 0);
            let n = usize::from(get_u16(head, 8));
            at += 10;
            let ids = bytes
                .get(at..at + n * 4)
                .ok_or_else(|| malformed("truncated entry"))?;
            let mut tokens: Vec<u32> = ids.chunks_exact(4).map(|c| get_u32(c, 0)).collect();
            tokens.sort_unstable();
            entries.insert(entity, tokens);
            at += n * 4;
        }
        Ok(Self { entries })
    }

    /// Serialises entries ordered by entity.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut entities: Vec<_> = self.entries.keys().copied().collect();
        entities.sort_unstable();
        let mut out = vec![0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&MAGIC);
        put_u16(&mut out, 4, VERSION);
        put_u64(&mut out, 8, entities.len() as u64);
        for entity in entities {
            let tokens = &self.entries[&entity];
            out.extend_from_slice(&entity.to_le_bytes());
            #[allow(clippy::cast_possible_truncation)]
            out.extend_from_slice(&(tokens.len() as u16).to_le_bytes());
            for token in tokens {
                out.extend_from_slice(&token.to_le_bytes());
            }
        }
        out
    }
}
