//! Fixed-width record layouts.
//!
//! Each record kind is a plain struct with a byte-level `decode`/`encode`
//! pair. Decoding never fails: a slot always has some bit pattern, and the
//! checkers decide whether it makes sense.

use super::format::{get_u32, get_u64, put_u32, put_u64, StoreKind, NULL_REFERENCE};

const IN_USE: u8 = 0b001;

/// A record kind stored in fixed-size slots.
pub trait Record: Sized {
    const KIND: StoreKind;

    /// Slot size, or `None` when the size is chosen per store file.
    const SIZE: Option<usize>;

    fn decode(id: u64, src: &[u8]) -> Self;

    fn encode(&self, dst: &mut [u8]);

    fn id(&self) -> u64;

    fn in_use(&self) -> bool;
}

#[must_use]
pub const fn is_null(reference: u64) -> bool {
    reference == NULL_REFERENCE
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: u64,
    pub in_use: bool,
    pub dense: bool,
    /// First relationship, or first relationship group when `dense`.
    pub next_rel: u64,
    pub next_prop: u64,
    pub labels: u64,
}

impl NodeRecord {
    pub const SIZE: usize = 32;
    const DENSE: u8 = 0b010;

    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            in_use: true,
            dense: false,
            next_rel: NULL_REFERENCE,
            next_prop: NULL_REFERENCE,
            labels: 0,
        }
    }
}

impl Record for NodeRecord {
    const KIND: StoreKind = StoreKind::Node;
    const SIZE: Option<usize> = Some(Self::SIZE);

    fn decode(id: u64, src: &[u8]) -> Self {
        Self {
            id,
            in_use: src[0] & IN_USE != 0,
            dense: src[0] & Self::DENSE != 0,
            next_rel: get_u64(src, 1),
            next_prop: get_u64(src, 9),
            labels: get_u64(src, 17),
        }
    }

    fn encode(&self, dst: &mut [u8]) {
        dst[0] = flag(self.in_use, IN_USE) | flag(self.dense, Self::DENSE);
        put_u64(dst, 1, self.next_rel);
        put_u64(dst, 9, self.next_prop);
        put_u64(dst, 17, self.labels);
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

/// Which endpoint of a relationship a chain pointer belongs to.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    First,
    Second,
}

impl core::fmt::Display for Side {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Second => write!(f, "second"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRecord {
    pub id: u64,
    pub in_use: bool,
    pub first_in_first_chain: bool,
    pub first_in_second_chain: bool,
    pub first_node: u64,
    pub second_node: u64,
    pub rel_type: u32,
    /// Chain degree instead of a pointer when `first_in_first_chain`.
    pub first_prev: u64,
    pub first_next: u64,
    /// Chain degree instead of a pointer when `first_in_second_chain`.
    pub second_prev: u64,
    pub second_next: u64,
    pub next_prop: u64,
}

impl RelationshipRecord {
    pub const SIZE: usize = 64;
    const FIRST_IN_FIRST: u8 = 0b010;
    const FIRST_IN_SECOND: u8 = 0b100;

    #[must_use]
    pub const fn new(id: u64, first_node: u64, second_node: u64, rel_type: u32) -> Self {
        Self {
            id,
            in_use: true,
            first_in_first_chain: false,
            first_in_second_chain: false,
            first_node,
            second_node,
            rel_type,
            first_prev: NULL_REFERENCE,
            first_next: NULL_REFERENCE,
            second_prev: NULL_REFERENCE,
            second_next: NULL_REFERENCE,
            next_prop: NULL_REFERENCE,
        }
    }

    #[must_use]
    pub const fn node(&self, side: Side) -> u64 {
        match side {
            Side::First => self.first_node,
            Side::Second => self.second_node,
        }
    }

    #[must_use]
    pub const fn prev(&self, side: Side) -> u64 {
        match side {
            Side::First => self.first_prev,
            Side::Second => self.second_prev,
        }
    }

    #[must_use]
    pub const fn next(&self, side: Side) -> u64 {
        match side {
            Side::First => self.first_next,
            Side::Second => self.second_next,
        }
    }

    #[must_use]
    pub const fn is_first_in_chain(&self, side: Side) -> bool {
        match side {
            Side::First => self.first_in_first_chain,
            Side::Second => self.first_in_second_chain,
        }
    }

    #[must_use]
    pub const fn is_loop(&self) -> bool {
        self.first_node == self.second_node
    }

    /// Sides on which `node` takes part, deduplicated for loops.
    pub fn sides_of(&self, node: u64) -> impl Iterator<Item = Side> + '_ {
        let first = (self.first_node == node).then_some(Side::First);
        let second = (self.second_node == node && !self.is_loop()).then_some(Side::Second);
        first.into_iter().chain(second)
    }

    pub fn set_prev(&mut self, side: Side, value: u64) {
        match side {
            Side::First => self.first_prev = value,
            Side::Second => self.second_prev = value,
        }
    }

    pub fn set_next(&mut self, side: Side, value: u64) {
        match side {
            Side::First => self.first_next = value,
            Side::Second => self.second_next = value,
        }
    }

    pub fn set_first_in_chain(&mut self, side: Side, value: bool) {
        match side {
            Side::First => self.first_in_first_chain = value,
            Side::Second => self.first_in_second_chain = value,
        }
    }
}

impl Record for RelationshipRecord {
    const KIND: StoreKind = StoreKind::Relationship;
    const SIZE: Option<usize> = Some(Self::SIZE);

    fn decode(id: u64, src: &[u8]) -> Self {
        Self {
            id,
            in_use: src[0] & IN_USE != 0,
            first_in_first_chain: src[0] & Self::FIRST_IN_FIRST != 0,
            first_in_second_chain: src[0] & Self::FIRST_IN_SECOND != 0,
            first_node: get_u64(src, 1),
            second_node: get_u64(src, 9),
            rel_type: get_u32(src, 17),
            first_prev: get_u64(src, 21),
            first_next: get_u64(src, 29),
            second_prev: get_u64(src, 37),
            second_next: get_u64(src, 45),
            next_prop: get_u64(src, 53),
        }
    }

    fn encode(&self, dst: &mut [u8]) {
        dst[0] = flag(self.in_use, IN_USE)
            | flag(self.first_in_first_chain, Self::FIRST_IN_FIRST)
            | flag(self.first_in_second_chain, Self::FIRST_IN_SECOND);
        put_u64(dst, 1, self.first_node);
        put_u64(dst, 9, self.second_node);
        put_u32(dst, 17, self.rel_type);
        put_u64(dst, 21, self.first_prev);
        put_u64(dst, 29, self.first_next);
        put_u64(dst, 37, self.second_prev);
        put_u64(dst, 45, self.second_next);
        put_u64(dst, 53, self.next_prop);
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

/// Direction slot of a relationship group.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outgoing,
    Incoming,
    Loop,
}

impl Direction {
    pub const ALL: [Self; 3] = [Self::Outgoing, Self::Incoming, Self::Loop];

    /// The endpoint a relationship in this direction shares with the group owner.
    #[must_use]
    pub const fn side(self) -> Side {
        match self {
            Self::Outgoing | Self::Loop => Side::First,
            Self::Incoming => Side::Second,
        }
    }
}

impl core::fmt::Display for Direction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Outgoing => write!(f, "outgoing"),
            Self::Incoming => write!(f, "incoming"),
            Self::Loop => write!(f, "loop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipGroupRecord {
    pub id: u64,
    pub in_use: bool,
    pub rel_type: u32,
    pub next: u64,
    pub first_out: u64,
    pub first_in: u64,
    pub first_loop: u64,
    pub owner: u64,
}

impl RelationshipGroupRecord {
    pub const SIZE: usize = 48;

    #[must_use]
    pub const fn new(id: u64, owner: u64, rel_type: u32) -> Self {
        Self {
            id,
            in_use: true,
            rel_type,
            next: NULL_REFERENCE,
            first_out: NULL_REFERENCE,
            first_in: NULL_REFERENCE,
            first_loop: NULL_REFERENCE,
            owner,
        }
    }

    #[must_use]
    pub const fn first(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Outgoing => self.first_out,
            Direction::Incoming => self.first_in,
            Direction::Loop => self.first_loop,
        }
    }

    pub fn set_first(&mut self, direction: Direction, value: u64) {
        match direction {
            Direction::Outgoing => self.first_out = value,
            Direction::Incoming => self.first_in = value,
            Direction::Loop => self.first_loop = value,
        }
    }
}

impl Record for RelationshipGroupRecord {
    const KIND: StoreKind = StoreKind::RelationshipGroup;
    const SIZE: Option<usize> = Some(Self::SIZE);

    fn decode(id: u64, src: &[u8]) -> Self {
        Self {
            id,
            in_use: src[0] & IN_USE != 0,
            rel_type: get_u32(src, 1),
            next: get_u64(src, 5),
            first_out: get_u64(src, 13),
            first_in: get_u64(src, 21),
            first_loop: get_u64(src, 29),
            owner: get_u64(src, 37),
        }
    }

    fn encode(&self, dst: &mut [u8]) {
        dst[0] = flag(self.in_use, IN_USE);
        put_u32(dst, 1, self.rel_type);
        put_u64(dst, 5, self.next);
        put_u64(dst, 13, self.first_out);
        put_u64(dst, 21, self.first_in);
        put_u64(dst, 29, self.first_loop);
        put_u64(dst, 37, self.owner);
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

/// Raw type tag of a property block.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Empty,
    Bool,
    Int,
    Float,
    ShortString,
    String,
    Array,
}

impl BlockType {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Bool => 1,
            Self::Int => 2,
            Self::Float => 3,
            Self::ShortString => 4,
            Self::String => 5,
            Self::Array => 6,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Empty,
            1 => Self::Bool,
            2 => Self::Int,
            3 => Self::Float,
            4 => Self::ShortString,
            5 => Self::String,
            6 => Self::Array,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn is_dynamic(self) -> bool {
        matches!(self, Self::String | Self::Array)
    }
}

/// One key/value slot of a property record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyBlock {
    pub key: u32,
    pub type_code: u8,
    /// Inline length for short strings.
    pub aux: u8,
    pub value: u64,
}

impl PropertyBlock {
    pub const SIZE: usize = 16;

    #[must_use]
    pub const fn new(key: u32, block_type: BlockType, aux: u8, value: u64) -> Self {
        Self {
            key,
            type_code: block_type.code(),
            aux,
            value,
        }
    }

    #[must_use]
    pub const fn block_type(&self) -> Option<BlockType> {
        BlockType::from_code(self.type_code)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.type_code == 0
    }

    fn decode(src: &[u8]) -> Self {
        Self {
            key: get_u32(src, 0),
            type_code: src[4],
            aux: src[5],
            value: get_u64(src, 8),
        }
    }

    fn encode(&self, dst: &mut [u8]) {
        put_u32(dst, 0, self.key);
        dst[4] = self.type_code;
        dst[5] = self.aux;
        put_u64(dst, 8, self.value);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    pub id: u64,
    pub in_use: bool,
    pub prev: u64,
    pub next: u64,
    pub blocks: [PropertyBlock; PropertyRecord::BLOCKS],
}

impl PropertyRecord {
    pub const SIZE: usize = 88;
    pub const BLOCKS: usize = 4;

    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            in_use: true,
            prev: NULL_REFERENCE,
            next: NULL_REFERENCE,
            blocks: [PropertyBlock::default(); Self::BLOCKS],
        }
    }

    /// Blocks that carry a value, with their slot index.
    pub fn used_blocks(&self) -> impl Iterator<Item = (usize, &PropertyBlock)> {
        self.blocks.iter().enumerate().filter(|(_, b)| !b.is_empty())
    }
}

impl Record for PropertyRecord {
    const KIND: StoreKind = StoreKind::Property;
    const SIZE: Option<usize> = Some(Self::SIZE);

    fn decode(id: u64, src: &[u8]) -> Self {
        let mut blocks = [PropertyBlock::default(); Self::BLOCKS];
        for (slot, block) in blocks.iter_mut().enumerate() {
            let at = 24 + slot * PropertyBlock::SIZE;
            *block = PropertyBlock::decode(&src[at..at + PropertyBlock::SIZE]);
        }
        Self {
            id,
            in_use: src[0] & IN_USE != 0,
            prev: get_u64(src, 8),
            next: get_u64(src, 16),
            blocks,
        }
    }

    fn encode(&self, dst: &mut [u8]) {
        dst[0] = flag(self.in_use, IN_USE);
        put_u64(dst, 8, self.prev);
        put_u64(dst, 16, self.next);
        for (slot, block) in self.blocks.iter().enumerate() {
            let at = 24 + slot * PropertyBlock::SIZE;
            block.encode(&mut dst[at..at + PropertyBlock::SIZE]);
        }
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub id: u64,
    pub in_use: bool,
    /// Reserved for the database itself, e.g. schema rule keys.
    pub internal: bool,
    pub name: u64,
}

impl TokenRecord {
    pub const SIZE: usize = 16;
    const INTERNAL: u8 = 0b010;
}

impl Record for TokenRecord {
    const KIND: StoreKind = StoreKind::Token;
    const SIZE: Option<usize> = Some(Self::SIZE);

    fn decode(id: u64, src: &[u8]) -> Self {
        Self {
            id,
            in_use: src[0] & IN_USE != 0,
            internal: src[0] & Self::INTERNAL != 0,
            name: get_u64(src, 8),
        }
    }

    fn encode(&self, dst: &mut [u8]) {
        dst[0] = flag(self.in_use, IN_USE) | flag(self.internal, Self::INTERNAL);
        put_u64(dst, 8, self.name);
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRecord {
    pub id: u64,
    pub in_use: bool,
    pub next_prop: u64,
}

impl SchemaRecord {
    pub const SIZE: usize = 16;
}

impl Record for SchemaRecord {
    const KIND: StoreKind = StoreKind::Schema;
    const SIZE: Option<usize> = Some(Self::SIZE);

    fn decode(id: u64, src: &[u8]) -> Self {
        Self {
            id,
            in_use: src[0] & IN_USE != 0,
            next_prop: get_u64(src, 8),
        }
    }

    fn encode(&self, dst: &mut [u8]) {
        dst[0] = flag(self.in_use, IN_USE);
        put_u64(dst, 8, self.next_prop);
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

/// One block of a variable-length value chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicRecord {
    pub id: u64,
    pub in_use: bool,
    pub type_code: u8,
    /// Payload bytes used in this block.
    pub length: u32,
    pub next: u64,
    /// Full data area; only the first `length` bytes are meaningful.
    pub data: Vec<u8>,
}

impl DynamicRecord {
    pub const HEADER_SIZE: usize = 16;

    /// The meaningful part of `data`, clamped to the block capacity.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        let end = (self.length as usize).min(self.data.len());
        &self.data[..end]
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl Record for DynamicRecord {
    const KIND: StoreKind = StoreKind::Dynamic;
    const SIZE: Option<usize> = None;

    fn decode(id: u64, src: &[u8]) -> Self {
        Self {
            id,
            in_use: src[0] & IN_USE != 0,
            type_code: src[1],
            length: get_u32(src, 4),
            next: get_u64(src, 8),
            data: src[Self::HEADER_SIZE..].to_vec(),
        }
    }

    fn encode(&self, dst: &mut [u8]) {
        dst[0] = flag(self.in_use, IN_USE);
        dst[1] = self.type_code;
        put_u32(dst, 4, self.length);
        put_u64(dst, 8, self.next);
        let end = dst.len().min(Self::HEADER_SIZE + self.data.len());
        dst[Self::HEADER_SIZE..end].copy_from_slice(&self.data[..end - Self::HEADER_SIZE]);
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn in_use(&self) -> bool {
        self.in_use
    }
}

const fn flag(set: bool, bit: u8) -> u8 {
    if set {
        bit
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reencode<R: Record>(record: &R, size: usize) -> R {
        let mut slot = vec![0u8; size];
        record.encode(&mut slot);
        R::decode(record.id(), &slot)
    }

    #[test]
    fn test_relationship_layout() {
        let mut rel = RelationshipRecord::new(9, 1, 2, 4);
        rel.first_in_second_chain = true;
        rel.second_prev = 3;
        rel.first_next = 17;
        let back = reencode(&rel, RelationshipRecord::SIZE);
        assert_eq!(back, rel);
        assert!(!back.is_first_in_chain(Side::First));
        assert!(back.is_first_in_chain(Side::Second));
        assert_eq!(back.next(Side::First), 17);
    }

    #[test]
    fn test_zeroed_slot_is_not_in_use() {
        let node = NodeRecord::decode(3, &[0u8; NodeRecord::SIZE]);
        assert!(!node.in_use);
        assert_eq!(node.next_rel, 0);
        let rel = RelationshipRecord::decode(3, &[0u8; RelationshipRecord::SIZE]);
        assert!(!rel.in_use);
    }

    #[test]
    fn test_property_blocks_keep_slot_order() {
        let mut prop = PropertyRecord::new(0);
        prop.blocks[2] = PropertyBlock::new(5, BlockType::ShortString, 3, 0x63_6261);
        let back = reencode(&prop, PropertyRecord::SIZE);
        let used: Vec<_> = back.used_blocks().map(|(slot, b)| (slot, b.key)).collect();
        assert_eq!(used, vec![(2, 5)]);
        assert_eq!(back.blocks[2].block_type(), Some(BlockType::ShortString));
    }

    #[test]
    fn test_loop_sides_are_deduplicated() {
        let rel = RelationshipRecord::new(0, 4, 4, 0);
        assert_eq!(rel.sides_of(4).collect::<Vec<_>>(), vec![Side::First]);
        let rel = RelationshipRecord::new(0, 4, 5, 0);
        assert_eq!(rel.sides_of(5).collect::<Vec<_>>(), vec![Side::Second]);
        assert_eq!(rel.sides_of(6).count(), 0);
    }

    #[test]
    fn test_dynamic_payload_is_clamped() {
        let mut slot = vec![0u8; DynamicRecord::HEADER_SIZE + 8];
        let record = DynamicRecord {
            id: 1,
            in_use: true,
            type_code: 1,
            length: 100,
            next: NULL_REFERENCE,
            data: vec![7; 8],
        };
        record.encode(&mut slot);
        let back = DynamicRecord::decode(1, &slot);
        assert_eq!(back.payload().len(), 8);
        assert_eq!(back.capacity(), 8);
    }
}
