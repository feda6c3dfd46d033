//! Property values and their byte encodings.

use super::dynamic::DynamicKind;
use super::format::get_u64;
use super::record::{BlockType, PropertyBlock};

/// Longest string stored inline in a property block.
pub const SHORT_STRING_LEN: usize = 8;

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<i64>),
}

impl Value {
    const TAG_BOOL: u8 = 1;
    const TAG_INT: u8 = 2;
    const TAG_FLOAT: u8 = 3;
    const TAG_STRING: u8 = 4;
    const TAG_ARRAY: u8 = 5;

    /// Decodes a block whose value lives entirely inline.
    ///
    /// Returns `None` for empty, dynamic and unknown block types, and for
    /// short strings that are not valid UTF-8 or overflow the block.
    #[must_use]
    pub fn from_inline(block: &PropertyBlock) -> Option<Self> {
        match block.block_type()? {
            BlockType::Bool => Some(Self::Bool(block.value != 0)),
            #[allow(clippy::cast_possible_wrap)]
            BlockType::Int => Some(Self::Int(block.value as i64)),
            BlockType::Float => Some(Self::Float(f64::from_bits(block.value))),
            BlockType::ShortString => {
                let len = usize::from(block.aux);
                if len > SHORT_STRING_LEN {
                    return None;
                }
                let bytes = block.value.to_le_bytes();
                core::str::from_utf8(&bytes[..len])
                    .ok()
                    .map(|s| Self::String(s.to_owned()))
            }
            BlockType::Empty | BlockType::String | BlockType::Array => None,
        }
    }

    /// Decodes the payload of a string chain.
    #[must_use]
    pub fn from_string_payload(payload: Vec<u8>) -> Option<Self> {
        String::from_utf8(payload).ok().map(Self::String)
    }

    /// Decodes the payload of an array chain: packed little-endian `i64`s.
    #[must_use]
    pub fn from_array_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() % 8 != 0 {
            return None;
        }
        #[allow(clippy::cast_possible_wrap)]
        let items = payload
            .chunks_exact(8)
            .map(|chunk| get_u64(chunk, 0) as i64)
            .collect();
        Some(Self::Array(items))
    }

    #[must_use]
    pub fn array_payload(items: &[i64]) -> Vec<u8> {
        items.iter().flat_map(|item| item.to_le_bytes()).collect()
    }

    /// Encodes this value as the block for `key`.
    ///
    /// Strings longer than [`SHORT_STRING_LEN`] and arrays are handed to
    /// `store_chain` together with their payload; it returns the first block
    /// of the stored chain.
    pub fn to_block(
        &self,
        key: u32,
        mut store_chain: impl FnMut(DynamicKind, Vec<u8>) -> u64,
    ) -> PropertyBlock {
        match self {
            Self::Bool(b) => PropertyBlock::new(key, BlockType::Bool, 0, u64::from(*b)),
            #[allow(clippy::cast_sign_loss)]
            Self::Int(i) => PropertyBlock::new(key, BlockType::Int, 0, *i as u64),
            Self::Float(x) => PropertyBlock::new(key, BlockType::Float, 0, x.to_bits()),
            Self::String(s) if s.len() <= SHORT_STRING_LEN => {
                let mut raw = [0u8; SHORT_STRING_LEN];
                raw[..s.len()].copy_from_slice(s.as_bytes());
                #[allow(clippy::cast_possible_truncation)]
                let len = s.len() as u8;
                PropertyBlock::new(key, BlockType::ShortString, len, u64::from_le_bytes(raw))
            }
            Self::String(s) => {
                let first = store_chain(DynamicKind::String, s.as_bytes().to_vec());
                PropertyBlock::new(key, BlockType::String, 0, first)
            }
            Self::Array(items) => {
                let first = store_chain(DynamicKind::Array, Self::array_payload(items));
                PropertyBlock::new(key, BlockType::Array, 0, first)
            }
        }
    }

    /// Self-delimiting encoding used by index files and uniqueness grouping.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Bool(b) => {
                out.push(Self::TAG_BOOL);
                out.push(u8::from(*b));
            }
            Self::Int(i) => {
                out.push(Self::TAG_INT);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Self::Float(f) => {
                out.push(Self::TAG_FLOAT);
                out.extend_from_slice(&f.to_bits().to_le_bytes());
            }
            Self::String(s) => {
                out.push(Self::TAG_STRING);
                #[allow(clippy::cast_possible_truncation)]
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Self::Array(items) => {
                out.push(Self::TAG_ARRAY);
                #[allow(clippy::cast_possible_truncation)]
                out.extend_from_slice(&(items.len() as u32).to_le_bytes());
                out.extend_from_slice(&Self::array_payload(items));
            }
        }
    }

    /// Decodes one value from the front of `src`, returning bytes consumed.
    #[must_use]
    pub fn decode(src: &[u8]) -> Option<(Self, usize)> {
        let (&tag, rest) = src.split_first()?;
        let fixed = |rest: &[u8]| -> Option<u64> { rest.get(..8).map(|b| get_u64(b, 0)) };
        let length = |rest: &[u8]| -> Option<usize> {
            rest.get(..4)
                .map(|b| super::format::get_u32(b, 0) as usize)
        };
        match tag {
            Self::TAG_BOOL => Some((Self::Bool(*rest.first()? != 0), 2)),
            #[allow(clippy::cast_possible_wrap)]
            Self::TAG_INT => Some((Self::Int(fixed(rest)? as i64), 9)),
            Self::TAG_FLOAT => Some((Self::Float(f64::from_bits(fixed(rest)?)), 9)),
            Self::TAG_STRING => {
                let len = length(rest)?;
                let bytes = rest.get(4..4 + len)?;
                let s = core::str::from_utf8(bytes).ok()?;
                Some((Self::String(s.to_owned()), 5 + len))
            }
            Self::TAG_ARRAY => {
                let len = length(rest)?;
                let bytes = rest.get(4..4 + len * 8)?;
                let value = Self::from_array_payload(bytes)?;
                Some((value, 5 + len * 8))
            }
            _ => None,
        }
    }

    /// Canonical bytes of a value tuple, used as a grouping key.
    #[must_use]
    pub fn key_of(values: &[Self]) -> Vec<u8> {
        let mut out = Vec::new();
        for value in values {
            value.encode(&mut out);
        }
        out
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Array(items) => write!(f, "{items:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_string_block() {
        let mut raw = [0u8; 8];
        raw[..3].copy_from_slice(b"abc");
        let block = PropertyBlock::new(0, BlockType::ShortString, 3, u64::from_le_bytes(raw));
        assert_eq!(Value::from_inline(&block), Some(Value::String("abc".into())));
        let block = PropertyBlock::new(0, BlockType::ShortString, 9, 0);
        assert_eq!(Value::from_inline(&block), None);
    }

    #[test]
    fn test_blocks_decode_back() {
        let mut chains = Vec::new();
        for value in [Value::Int(-9), Value::Bool(true), Value::String("short".into())] {
            let block = value.to_block(1, |kind, payload| {
                chains.push((kind, payload));
                0
            });
            assert_eq!(Value::from_inline(&block), Some(value));
        }
        let block = Value::String("longer than eight".into()).to_block(1, |kind, payload| {
            chains.push((kind, payload));
            12
        });
        assert_eq!((block.block_type(), block.value), (Some(BlockType::String), 12));
        assert_eq!(chains, vec![(DynamicKind::String, b"longer than eight".to_vec())]);
    }

    #[test]
    fn test_dynamic_blocks_are_not_inline() {
        let block = PropertyBlock::new(0, BlockType::String, 0, 4);
        assert_eq!(Value::from_inline(&block), None);
    }

    #[test]
    fn test_value_sequence_decoding() {
        let values = vec![
            Value::Int(-3),
            Value::String("héllo".into()),
            Value::Array(vec![1, 2]),
            Value::Bool(true),
        ];
        let bytes = Value::key_of(&values);
        let mut at = 0;
        let mut back = Vec::new();
        while at < bytes.len() {
            let (value, used) = Value::decode(&bytes[at..]).unwrap();
            back.push(value);
            at += used;
        }
        assert_eq!(back, values);
    }

    #[test]
    fn test_ragged_array_payload() {
        assert_eq!(Value::from_array_payload(&[0; 7]), None);
        assert_eq!(
            Value::from_array_payload(&Value::array_payload(&[5, -1])),
            Some(Value::Array(vec![5, -1]))
        );
    }
}
