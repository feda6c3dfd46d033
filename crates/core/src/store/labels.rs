//! Node label field encoding.
//!
//! Bit 63 set: the low 63 bits point at the first `node_labels` block.
//! Otherwise bits 56..=59 hold a count `n` and the low 56 bits hold `n` ids of
//! `56 / n` bits each, lowest slot first. Bits 60..=62 are reserved and must
//! be clear.

use core::fmt;

const DYNAMIC_BIT: u64 = 1 << 63;
const COUNT_SHIFT: u32 = 56;
const COUNT_MASK: u64 = 0xF;
const PAYLOAD_BITS: u32 = 56;
const RESERVED_MASK: u64 = 0b111 << 60;
pub const MAX_INLINE_LABELS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelField {
    Inline(Vec<u32>),
    Dynamic(u64),
}

/// An inline label field that no writer produces.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidLabelField {
    /// The count nibble exceeds [`MAX_INLINE_LABELS`].
    Count(u8),
    /// Some of bits 60..=62 are set.
    ReservedBits(u64),
    /// A slot holds a value wider than a label id.
    OversizedId(u64),
}

impl fmt::Display for InvalidLabelField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "inline label field claims {count} labels"),
            Self::ReservedBits(bits) => {
                write!(f, "inline label field sets reserved bits {bits:#x}")
            }
            Self::OversizedId(id) => write!(f, "inline label id {id} exceeds 32 bits"),
        }
    }
}

impl LabelField {
    /// # Errors
    ///
    /// Returns [`InvalidLabelField`] when an inline field claims more labels
    /// than fit, sets reserved bits, or holds an id wider than 32 bits.
    pub fn parse(field: u64) -> Result<Self, InvalidLabelField> {
        if field & DYNAMIC_BIT != 0 {
            return Ok(Self::Dynamic(field & !DYNAMIC_BIT));
        }
        if field & RESERVED_MASK != 0 {
            return Err(InvalidLabelField::ReservedBits(field & RESERVED_MASK));
        }
        #[allow(clippy::cast_possible_truncation)]
        let count = ((field >> COUNT_SHIFT) & COUNT_MASK) as u8;
        if usize::from(count) > MAX_INLINE_LABELS {
            return Err(InvalidLabelField::Count(count));
        }
        if count == 0 {
            return Ok(Self::Inline(Vec::new()));
        }
        let bits = PAYLOAD_BITS / u32::from(count);
        let mask = (1u64 << bits) - 1;
        let ids = (0..u32::from(count))
            .map(|slot| {
                let raw = (field >> (slot * bits)) & mask;
                u32::try_from(raw).map_err(|_| InvalidLabelField::OversizedId(raw))
            })
            .collect::<Result<_, _>>()?;
        Ok(Self::Inline(ids))
    }

    #[must_use]
    pub const fn dynamic(first_block: u64) -> u64 {
        DYNAMIC_BIT | (first_block & !DYNAMIC_BIT)
    }
}

/// Packs `ids` into an inline field, or `None` if they do not fit.
#[must_use]
pub fn pack_inline(ids: &[u32]) -> Option<u64> {
    if ids.len() > MAX_INLINE_LABELS {
        return None;
    }
    if ids.is_empty() {
        return Some(0);
    }
    #[allow(clippy::cast_possible_truncation)]
    let count = ids.len() as u32;
    let bits = PAYLOAD_BITS / count;
    let mut field = u64::from(count) << COUNT_SHIFT;
    for (slot, &id) in (0..).zip(ids) {
        if bits < 32 && u64::from(id) >> bits != 0 {
            return None;
        }
        field |= u64::from(id) << (slot * bits);
    }
    Some(field)
}

/// Payload of a dynamic label chain: owning node followed by label ids.
#[must_use]
pub fn encode_dynamic(owner: u64, ids: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + ids.len() * 4);
    out.extend_from_slice(&owner.to_le_bytes());
    for id in ids {
        out.extend_from_slice(&id.to_le_bytes());
    }
    out
}

/// Inverse of [`encode_dynamic`]; `None` when the length is not `8 + 4k`.
#[must_use]
pub fn decode_dynamic(payload: &[u8]) -> Option<(u64, Vec<u32>)> {
    if payload.len() < 8 || (payload.len() - 8) % 4 != 0 {
        return None;
    }
    let owner = super::format::get_u64(payload, 0);
    let ids = payload[8..]
        .chunks_exact(4)
        .map(|chunk| super::format::get_u32(chunk, 0))
        .collect();
    Some((owner, ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_packing() {
        for ids in [vec![], vec![3], vec![1, 2, 900], vec![0, 1, 2, 3, 4, 5, 6]] {
            let field = pack_inline(&ids).unwrap();
            assert_eq!(LabelField::parse(field).unwrap(), LabelField::Inline(ids));
        }
    }

    #[test]
    fn test_inline_overflow_falls_back() {
        assert!(pack_inline(&[0, 1, 2, 3, 4, 5, 6, 7]).is_none());
        // seven labels get 8 bits each
        assert!(pack_inline(&[256, 0, 0, 0, 0, 0, 0]).is_none());
        assert!(pack_inline(&[u32::MAX]).is_some());
    }

    #[test]
    fn test_dynamic_field() {
        let field = LabelField::dynamic(42);
        assert_eq!(LabelField::parse(field).unwrap(), LabelField::Dynamic(42));
    }

    #[test]
    fn test_bad_inline_count() {
        let field = 9u64 << COUNT_SHIFT;
        assert_eq!(LabelField::parse(field), Err(InvalidLabelField::Count(9)));
    }

    #[test]
    fn test_reserved_bits_are_rejected() {
        let field = pack_inline(&[3]).unwrap() | (1 << 61);
        assert_eq!(
            LabelField::parse(field),
            Err(InvalidLabelField::ReservedBits(1 << 61))
        );
    }

    #[test]
    fn test_single_slot_wider_than_u32() {
        let wide = u64::from(u32::MAX) + 5;
        let field = (1u64 << COUNT_SHIFT) | wide;
        assert_eq!(
            LabelField::parse(field),
            Err(InvalidLabelField::OversizedId(wide))
        );
        let widest = (1u64 << COUNT_SHIFT) | u64::from(u32::MAX);
        assert_eq!(
            LabelField::parse(widest).unwrap(),
            LabelField::Inline(vec![u32::MAX])
        );
    }

    #[test]
    fn test_dynamic_payload() {
        let payload = encode_dynamic(7, &[1, 5]);
        assert_eq!(decode_dynamic(&payload), Some((7, vec![1, 5])));
        assert_eq!(decode_dynamic(&payload[..9]), None);
    }
}
