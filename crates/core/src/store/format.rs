//! Store file header and little-endian field helpers.
//!
//! Every store file is a 24-byte header followed by `high_id` fixed-size
//! slots. Record `id` lives at `HEADER_SIZE + id * record_size`.

use crate::error::StoreError;

/// Sentinel for "no record" in 64-bit pointer fields.
pub const NULL_REFERENCE: u64 = u64::MAX;

/// Sentinel for "no token" in 32-bit token fields.
pub const NO_TOKEN: u32 = u32::MAX;

/// Size of the header preceding the first record slot.
pub const HEADER_SIZE: usize = 24;

/// Only supported store format version.
pub const FORMAT_VERSION: u16 = 1;

const MAGIC: [u8; 4] = *b"SCRS";

/// Which kind of records a store file holds. Stored in the header.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Node,
    Relationship,
    RelationshipGroup,
    Property,
    Dynamic,
    Token,
    Schema,
}

impl StoreKind {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Node => 1,
            Self::Relationship => 2,
            Self::RelationshipGroup => 3,
            Self::Property => 4,
            Self::Dynamic => 5,
            Self::Token => 6,
            Self::Schema => 7,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Self::Node,
            2 => Self::Relationship,
            3 => Self::RelationshipGroup,
            4 => Self::Property,
            5 => Self::Dynamic,
            6 => Self::Token,
            7 => Self::Schema,
            _ => return None,
        })
    }
}

/// Decoded store file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub kind: StoreKind,
    pub record_size: u32,
    /// Exclusive upper bound of every id ever allocated in this store.
    pub high_id: u64,
}

impl StoreHeader {
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&MAGIC);
        put_u16(&mut out, 4, FORMAT_VERSION);
        out[6] = self.kind.code();
        put_u32(&mut out, 8, self.record_size);
        put_u64(&mut out, 16, self.high_id);
        out
    }

    /// Parses a header from the first bytes of a store file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Format`] when the magic, version or kind byte is
    /// not recognised, and [`StoreError::Truncated`] when fewer than
    /// [`HEADER_SIZE`] bytes are available.
    pub fn decode(store: &str, src: &[u8]) -> Result<Self, StoreError> {
        if src.len() < HEADER_SIZE {
            return Err(StoreError::Truncated {
                store: store.to_owned(),
                expected: HEADER_SIZE as u64,
                actual: src.len() as u64,
            });
        }
        if src[0..4] != MAGIC {
            return Err(StoreError::Format {
                store: store.to_owned(),
                reason: "bad magic".to_owned(),
            });
        }
        let version = get_u16(src, 4);
        if version != FORMAT_VERSION {
            return Err(StoreError::Format {
                store: store.to_owned(),
                reason: format!("unsupported format version {version}"),
            });
        }
        let kind = StoreKind::from_code(src[6]).ok_or_else(|| StoreError::Format {
            store: store.to_owned(),
            reason: format!("unknown store kind {}", src[6]),
        })?;
        Ok(Self {
            kind,
            record_size: get_u32(src, 8),
            high_id: get_u64(src, 16),
        })
    }
}

/// Serialises a complete store file image: header plus `high_id` slots.
///
/// Slots not covered by `records` stay zeroed, which decodes as not-in-use.
/// `place` writes one record into its slot and returns its id.
#[must_use]
pub fn encode_store<T>(
    kind: StoreKind,
    record_size: usize,
    high_id: u64,
    records: &[T],
    place: impl Fn(&T, &mut [u8]) -> u64,
) -> Vec<u8> {
    #[allow(clippy::cast_possible_truncation)]
    let header = StoreHeader {
        kind,
        record_size: record_size as u32,
        high_id,
    };
    #[allow(clippy::cast_possible_truncation)]
    let mut out = vec![0u8; HEADER_SIZE + high_id as usize * record_size];
    out[..HEADER_SIZE].copy_from_slice(&header.encode());
    let mut slot = vec![0u8; record_size];
    for record in records {
        slot.fill(0);
        let id = place(record, &mut slot);
        #[allow(clippy::cast_possible_truncation)]
        let at = HEADER_SIZE + id as usize * record_size;
        if let Some(target) = out.get_mut(at..at + record_size) {
            target.copy_from_slice(&slot);
        }
    }
    out
}

#[must_use]
pub fn get_u16(src: &[u8], at: usize) -> u16 {
    let mut bytes = [0u8; 2];
    bytes.copy_from_slice(&src[at..at + 2]);
    u16::from_le_bytes(bytes)
}

#[must_use]
pub fn get_u32(src: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&src[at..at + 4]);
    u32::from_le_bytes(bytes)
}

#[must_use]
pub fn get_u64(src: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&src[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[must_use]
pub fn get_i64(src: &[u8], at: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&src[at..at + 8]);
    i64::from_le_bytes(bytes)
}

pub fn put_u16(dst: &mut [u8], at: usize, v: u16) {
    dst[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

pub fn put_u32(dst: &mut [u8], at: usize, v: u32) {
    dst[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

pub fn put_u64(dst: &mut [u8], at: usize, v: u64) {
    dst[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

pub fn put_i64(dst: &mut [u8], at: usize, v: i64) {
    dst[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = StoreHeader {
            kind: StoreKind::Relationship,
            record_size: 64,
            high_id: 12,
        };
        let bytes = header.encode();
        assert_eq!(StoreHeader::decode("rels", &bytes).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_foreign_file() {
        let mut bytes = StoreHeader {
            kind: StoreKind::Node,
            record_size: 32,
            high_id: 0,
        }
        .encode();
        bytes[0] = b'X';
        assert!(matches!(
            StoreHeader::decode("nodes", &bytes),
            Err(StoreError::Format { .. })
        ));
        assert!(matches!(
            StoreHeader::decode("nodes", &bytes[..10]),
            Err(StoreError::Truncated { .. })
        ));
    }

    #[test]
    fn test_header_rejects_newer_version() {
        let mut bytes = StoreHeader {
            kind: StoreKind::Node,
            record_size: 32,
            high_id: 0,
        }
        .encode();
        put_u16(&mut bytes, 4, 7);
        let err = StoreHeader::decode("nodes", &bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported format version 7"));
    }

    #[test]
    fn test_encode_store_places_records_by_id() {
        let image = encode_store(StoreKind::Schema, 4, 3, &[(2u64, 0xAB_u8)], |r, slot| {
            slot[0] = r.1;
            r.0
        });
        assert_eq!(image.len(), HEADER_SIZE + 12);
        assert_eq!(image[HEADER_SIZE + 8], 0xAB);
        assert_eq!(image[HEADER_SIZE], 0);
    }
}
