//! Findings, the shared reporter and the consistency summary.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::counts::CountsKey;
use crate::error::StoreError;
use crate::store::dynamic::ChainError;
use crate::store::labels::InvalidLabelField;
use crate::store::record::{Direction, Side};
use crate::store::TokenKind;

/// What kind of record a finding is about.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    Node,
    Relationship,
    RelationshipGroup,
    Property,
    StringProperty,
    ArrayProperty,
    NodeDynamicLabel,
    Label,
    RelationshipType,
    PropertyKey,
    LabelName,
    RelationshipTypeName,
    PropertyKeyName,
    Schema,
    Index,
    LabelScanDocument,
    RelationshipTypeScanDocument,
    Counts,
}

impl RecordType {
    pub const ALL: [Self; 18] = [
        Self::Node,
        Self::Relationship,
        Self::RelationshipGroup,
        Self::Property,
        Self::StringProperty,
        Self::ArrayProperty,
        Self::NodeDynamicLabel,
        Self::Label,
        Self::RelationshipType,
        Self::PropertyKey,
        Self::LabelName,
        Self::RelationshipTypeName,
        Self::PropertyKeyName,
        Self::Schema,
        Self::Index,
        Self::LabelScanDocument,
        Self::RelationshipTypeScanDocument,
        Self::Counts,
    ];

    const fn slot(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Node => "NODE",
            Self::Relationship => "RELATIONSHIP",
            Self::RelationshipGroup => "RELATIONSHIP_GROUP",
            Self::Property => "PROPERTY",
            Self::StringProperty => "STRING_PROPERTY",
            Self::ArrayProperty => "ARRAY_PROPERTY",
            Self::NodeDynamicLabel => "NODE_DYNAMIC_LABEL",
            Self::Label => "LABEL",
            Self::RelationshipType => "RELATIONSHIP_TYPE",
            Self::PropertyKey => "PROPERTY_KEY",
            Self::LabelName => "LABEL_NAME",
            Self::RelationshipTypeName => "RELATIONSHIP_TYPE_NAME",
            Self::PropertyKeyName => "PROPERTY_KEY_NAME",
            Self::Schema => "SCHEMA",
            Self::Index => "INDEX",
            Self::LabelScanDocument => "LABEL_SCAN_DOCUMENT",
            Self::RelationshipTypeScanDocument => "RELATIONSHIP_TYPE_SCAN_DOCUMENT",
            Self::Counts => "COUNTS",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rt| rt.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
}

/// The rule a record violates.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    // node
    LabelFieldInvalid { error: InvalidLabelField },
    DynamicLabelChain { error: ChainError },
    DynamicLabelsMalformed { block: u64 },
    DynamicLabelsOtherOwner { block: u64, owner: u64 },
    LabelsUnsorted,
    LabelDuplicate { label: u32 },
    LabelNotInUse { label: u32 },
    RelationshipNotInUse { relationship: u64 },
    RelationshipForOtherNode { relationship: u64 },
    RelationshipChainDegree { declared: u64, observed: u64 },
    GroupNotInUse { group: u64 },
    GroupForOtherNode { group: u64, owner: u64 },
    GroupChainCycle { group: u64 },

    // property chains, reported on the owner
    PropertyNotInUse { property: u64 },
    PropertyNotFirstInChain { property: u64 },
    PropertyChainCycle { property: u64 },
    PropertyKeyNotUnique { key: u32 },
    InternalPropertyKey { key: u32 },

    // relationship
    EndpointNotInUse { side: Side, node: u64 },
    EndpointHasNoRelationships { side: Side, node: u64 },
    EndpointDoesNotReferenceBack { side: Side, node: u64, first: u64 },
    RelationshipTypeNotInUse { rel_type: u32 },
    PrevNotInUse { side: Side, prev: u64 },
    NextNotInUse { side: Side, next: u64 },
    PrevReferencesOtherNodes { side: Side, prev: u64 },
    NextReferencesOtherNodes { side: Side, next: u64 },
    PrevDoesNotReferenceBack { side: Side, prev: u64 },
    NextDoesNotReferenceBack { side: Side, next: u64 },
    MissingPrev { side: Side },
    HeadNotFirstInChain { node: u64 },

    // relationship group
    GroupTypeNotInUse { rel_type: u32 },
    GroupOwnerNotInUse { owner: u64 },
    GroupNextNotInUse { next: u64 },
    GroupNextHasOtherOwner { next: u64, owner: u64 },
    GroupNotSortedByType { next: u64 },
    GroupRelationshipNotInUse { direction: Direction, relationship: u64 },
    GroupRelationshipForOtherNode { direction: Direction, relationship: u64 },
    GroupRelationshipNotFirstInChain { direction: Direction, relationship: u64 },
    GroupRelationshipOfOtherType { direction: Direction, relationship: u64 },

    // property records
    PropertyPrevNotInUse { prev: u64 },
    PropertyNextNotInUse { next: u64 },
    PropertyPrevDoesNotReferenceBack { prev: u64 },
    PropertyNextDoesNotReferenceBack { next: u64 },
    PropertyKeyNotInUse { key: u32 },
    PropertyTypeInvalid { key: u32, type_code: u8 },
    PropertyValueChain { key: u32, error: ChainError },
    PropertyValueMalformed { key: u32 },
    PropertyMultipleOwners,

    // dynamic records
    DynamicInvalidLength { length: u32 },
    DynamicWrongType { found: u8 },
    DynamicSelfReference,
    DynamicNextNotInUse { next: u64 },
    DynamicNextMultipleOwners { next: u64 },
    DynamicEmptyBlock,
    DynamicNotFullReferencesNext,
    DynamicEmptyNextBlock { next: u64 },

    // tokens
    TokenNameChain { error: ChainError },
    TokenNameInvalid,
    TokenEmptyName,
    TokenNameNotUnique { other: u64 },
    TokenNameShared { other: u64 },

    // schema
    SchemaMalformed { reason: String },
    SchemaTokenNotInUse { kind: TokenKind, token: u32 },
    SchemaDuplicate { other: u64 },
    IndexOwnerMissing { constraint: u64 },
    IndexOwnerDoesNotReferenceBack { constraint: u64 },
    ConstraintIndexMissing { index: u64 },
    ConstraintIndexDoesNotReferenceBack { index: u64 },
    ConstraintIndexNotRange { index: u64 },
    ConstraintDuplicateObligation { other: u64 },
    ConstraintMissingObligation,

    // value indexes
    EntityNotIndexed { index: u64 },
    DuplicateUniqueValue { index: u64, other: u64 },
    IndexedEntityNotInUse { index: u64 },
    EntityWronglyIndexed { index: u64 },
    IndexedValuesMismatch { index: u64 },

    // token indexes
    EntityNotInTokenIndex { tokens: Vec<u32> },
    TokenIndexMismatch { indexed: Vec<u32>, actual: Vec<u32> },
    TokenIndexEntityNotInUse,

    // counts
    CountsMismatch { key: CountsKey, stored: i64, observed: i64 },
    CountsUnexpectedEntry { key: CountsKey, stored: i64 },
}

impl Kind {
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::DynamicEmptyBlock
            | Self::DynamicNotFullReferencesNext
            | Self::DynamicEmptyNextBlock { .. }
            | Self::TokenEmptyName => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Kind {
    #[allow(clippy::too_many_lines)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LabelFieldInvalid { error } => write!(f, "{error}"),
            Self::DynamicLabelChain { error } => {
                write!(f, "dynamic label chain is broken: {error}")
            }
            Self::DynamicLabelsMalformed { block } => {
                write!(f, "dynamic label chain starting at {block} has a malformed payload")
            }
            Self::DynamicLabelsOtherOwner { block, owner } => {
                write!(f, "dynamic label chain starting at {block} belongs to node {owner}")
            }
            Self::LabelsUnsorted => write!(f, "label ids are not sorted"),
            Self::LabelDuplicate { label } => write!(f, "label {label} appears more than once"),
            Self::LabelNotInUse { label } => write!(f, "label token {label} is not in use"),
            Self::RelationshipNotInUse { relationship } => {
                write!(f, "first relationship {relationship} is not in use")
            }
            Self::RelationshipForOtherNode { relationship } => {
                write!(f, "first relationship {relationship} does not reference this node")
            }
            Self::RelationshipChainDegree { declared, observed } => write!(
                f,
                "relationship chain declares degree {declared} but holds {observed}"
            ),
            Self::GroupNotInUse { group } => write!(f, "relationship group {group} is not in use"),
            Self::GroupForOtherNode { group, owner } => {
                write!(f, "relationship group {group} is owned by node {owner}")
            }
            Self::GroupChainCycle { group } => {
                write!(f, "relationship group chain cycles back to {group}")
            }
            Self::PropertyNotInUse { property } => {
                write!(f, "property record {property} is not in use")
            }
            Self::PropertyNotFirstInChain { property } => {
                write!(f, "property record {property} is not the head of its chain")
            }
            Self::PropertyChainCycle { property } => {
                write!(f, "property chain cycles back to {property}")
            }
            Self::PropertyKeyNotUnique { key } => {
                write!(f, "property key {key} is set more than once")
            }
            Self::InternalPropertyKey { key } => {
                write!(f, "internal property key {key} is used by a user entity")
            }
            Self::EndpointNotInUse { side, node } => write!(f, "{side} node {node} is not in use"),
            Self::EndpointHasNoRelationships { side, node } => {
                write!(f, "{side} node {node} has no relationships")
            }
            Self::EndpointDoesNotReferenceBack { side, node, first } => write!(
                f,
                "{side} node {node} starts its chain at {first}, not at this relationship"
            ),
            Self::RelationshipTypeNotInUse { rel_type } => {
                write!(f, "relationship type {rel_type} is not in use")
            }
            Self::PrevNotInUse { side, prev } => {
                write!(f, "{side} chain previous relationship {prev} is not in use")
            }
            Self::NextNotInUse { side, next } => {
                write!(f, "{side} chain next relationship {next} is not in use")
            }
            Self::PrevReferencesOtherNodes { side, prev } => {
                write!(f, "{side} chain previous relationship {prev} references other nodes")
            }
            Self::NextReferencesOtherNodes { side, next } => {
                write!(f, "{side} chain next relationship {next} references other nodes")
            }
            Self::PrevDoesNotReferenceBack { side, prev } => write!(
                f,
                "{side} chain previous relationship {prev} does not reference back"
            ),
            Self::NextDoesNotReferenceBack { side, next } => {
                write!(f, "{side} chain next relationship {next} does not reference back")
            }
            Self::MissingPrev { side } => {
                write!(f, "not first in {side} chain but has no previous relationship")
            }
            Self::HeadNotFirstInChain { node } => {
                write!(f, "heads the chain of node {node} but is not marked first in it")
            }
            Self::GroupTypeNotInUse { rel_type } => {
                write!(f, "relationship type {rel_type} is not in use")
            }
            Self::GroupOwnerNotInUse { owner } => write!(f, "owner node {owner} is not in use"),
            Self::GroupNextNotInUse { next } => write!(f, "next group {next} is not in use"),
            Self::GroupNextHasOtherOwner { next, owner } => {
                write!(f, "next group {next} is owned by node {owner}")
            }
            Self::GroupNotSortedByType { next } => {
                write!(f, "next group {next} does not have a greater type")
            }
            Self::GroupRelationshipNotInUse {
                direction,
                relationship,
            } => write!(f, "first {direction} relationship {relationship} is not in use"),
            Self::GroupRelationshipForOtherNode {
                direction,
                relationship,
            } => write!(
                f,
                "first {direction} relationship {relationship} does not start at the owner"
            ),
            Self::GroupRelationshipNotFirstInChain {
                direction,
                relationship,
            } => write!(
                f,
                "first {direction} relationship {relationship} is not marked first in chain"
            ),
            Self::GroupRelationshipOfOtherType {
                direction,
                relationship,
            } => write!(f, "first {direction} relationship {relationship} has another type"),
            Self::PropertyPrevNotInUse { prev } => {
                write!(f, "previous property record {prev} is not in use")
            }
            Self::PropertyNextNotInUse { next } => {
                write!(f, "next property record {next} is not in use")
            }
            Self::PropertyPrevDoesNotReferenceBack { prev } => {
                write!(f, "previous property record {prev} does not reference back")
            }
            Self::PropertyNextDoesNotReferenceBack { next } => {
                write!(f, "next property record {next} does not reference back")
            }
            Self::PropertyKeyNotInUse { key } => write!(f, "property key {key} is not in use"),
            Self::PropertyTypeInvalid { key, type_code } => {
                write!(f, "property key {key} has invalid block type {type_code}")
            }
            Self::PropertyValueChain { key, error } => {
                write!(f, "value of property key {key} is unreadable: {error}")
            }
            Self::PropertyValueMalformed { key } => {
                write!(f, "value of property key {key} is malformed")
            }
            Self::PropertyMultipleOwners => write!(f, "property record has more than one owner"),
            Self::DynamicInvalidLength { length } => {
                write!(f, "block declares invalid length {length}")
            }
            Self::DynamicWrongType { found } => write!(f, "block has foreign type {found}"),
            Self::DynamicSelfReference => write!(f, "block references itself as next"),
            Self::DynamicNextNotInUse { next } => write!(f, "next block {next} is not in use"),
            Self::DynamicNextMultipleOwners { next } => {
                write!(f, "next block {next} is referenced by more than one block")
            }
            Self::DynamicEmptyBlock => write!(f, "block is empty"),
            Self::DynamicNotFullReferencesNext => {
                write!(f, "block is not full but references a next block")
            }
            Self::DynamicEmptyNextBlock { next } => write!(f, "next block {next} is empty"),
            Self::TokenNameChain { error } => write!(f, "name chain is broken: {error}"),
            Self::TokenNameInvalid => write!(f, "name is not valid UTF-8"),
            Self::TokenEmptyName => write!(f, "name is empty"),
            Self::TokenNameNotUnique { other } => {
                write!(f, "name is also used by token {other}")
            }
            Self::TokenNameShared { other } => {
                write!(f, "name chain is shared with token {other}")
            }
            Self::SchemaMalformed { reason } => write!(f, "schema rule is malformed: {reason}"),
            Self::SchemaTokenNotInUse { kind, token } => {
                write!(f, "schema rule references {kind:?} token {token} which is not in use")
            }
            Self::SchemaDuplicate { other } => {
                write!(f, "schema rule duplicates rule {other}")
            }
            Self::IndexOwnerMissing { constraint } => {
                write!(f, "owning constraint {constraint} does not exist")
            }
            Self::IndexOwnerDoesNotReferenceBack { constraint } => {
                write!(f, "owning constraint {constraint} does not own this index")
            }
            Self::ConstraintIndexMissing { index } => {
                write!(f, "owned index {index} does not exist")
            }
            Self::ConstraintIndexDoesNotReferenceBack { index } => {
                write!(f, "owned index {index} is not owned by this constraint")
            }
            Self::ConstraintIndexNotRange { index } => {
                write!(f, "owned index {index} is not a range index")
            }
            Self::ConstraintDuplicateObligation { other } => {
                write!(f, "owned index is also owned by constraint {other}")
            }
            Self::ConstraintMissingObligation => {
                write!(f, "uniqueness constraint does not own an index")
            }
            Self::EntityNotIndexed { index } => write!(f, "entity is missing from index {index}"),
            Self::DuplicateUniqueValue { index, other } => write!(
                f,
                "entity has the same value as entity {other} in unique index {index}"
            ),
            Self::IndexedEntityNotInUse { index } => {
                write!(f, "index {index} references an entity that is not in use")
            }
            Self::EntityWronglyIndexed { index } => {
                write!(f, "index {index} contains an entity that does not match its schema")
            }
            Self::IndexedValuesMismatch { index } => {
                write!(f, "index {index} holds values that differ from the entity")
            }
            Self::EntityNotInTokenIndex { tokens } => {
                write!(f, "tokens {tokens:?} are missing from the token index")
            }
            Self::TokenIndexMismatch { indexed, actual } => {
                write!(f, "token index holds {indexed:?}, entity has {actual:?}")
            }
            Self::TokenIndexEntityNotInUse => {
                write!(f, "token index references an entity that is not in use")
            }
            Self::CountsMismatch {
                key,
                stored,
                observed,
            } => write!(f, "{key} is stored as {stored} but {observed} were counted"),
            Self::CountsUnexpectedEntry { key, stored } => {
                write!(f, "{key} is stored as {stored} but no such entities exist")
            }
        }
    }
}

/// One violated rule on one record.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inconsistency {
    pub record_type: RecordType,
    pub id: Option<u64>,
    pub kind: Kind,
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.kind.severity() {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        match self.id {
            Some(id) => write!(f, "{level}: [{}[{id}]] {}", self.record_type, self.kind),
            None => write!(f, "{level}: [{}] {}", self.record_type, self.kind),
        }
    }
}

/// Thread-safe sink for findings.
///
/// Counters are atomic per record type. Once the fail-fast threshold is met
/// further findings are dropped and [`Reporter::should_stop`] turns true.
#[derive(Debug)]
pub struct Reporter {
    errors: [AtomicU64; RecordType::ALL.len()],
    warnings: [AtomicU64; RecordType::ALL.len()],
    total: AtomicU64,
    threshold: Option<u64>,
    stopped: AtomicBool,
    max_descriptions: usize,
    descriptions: Mutex<Vec<String>>,
    report_file: Option<(PathBuf, Mutex<BufWriter<File>>)>,
    /// First failure writing the report file.
    report_error: Mutex<Option<io::Error>>,
}

impl Reporter {
    /// # Errors
    ///
    /// Fails if the report file cannot be created under `report_dir`.
    pub fn new(
        threshold: Option<u64>,
        max_descriptions: usize,
        report_dir: Option<&Path>,
    ) -> Result<Self, StoreError> {
        let report_file = match report_dir {
            Some(dir) => {
                let name = chrono::Local::now()
                    .format("inconsistencies-%Y-%m-%d.%H.%M.%S.report")
                    .to_string();
                let path = dir.join(name);
                let file = File::create(&path).map_err(|source| StoreError::Io {
                    store: path.display().to_string(),
                    source,
                })?;
                Some((path, file))
            }
            None => None,
        };
        Ok(Self::with_report_file(threshold, max_descriptions, report_file))
    }

    fn with_report_file(
        threshold: Option<u64>,
        max_descriptions: usize,
        report_file: Option<(PathBuf, File)>,
    ) -> Self {
        Self {
            errors: Default::default(),
            warnings: Default::default(),
            total: AtomicU64::new(0),
            threshold: threshold.filter(|&t| t > 0),
            stopped: AtomicBool::new(false),
            max_descriptions,
            descriptions: Mutex::new(Vec::new()),
            report_file: report_file.map(|(path, file)| (path, Mutex::new(BufWriter::new(file)))),
            report_error: Mutex::new(None),
        }
    }

    pub fn report(&self, record_type: RecordType, id: Option<u64>, kind: Kind) {
        if self.should_stop() {
            return;
        }
        let finding = Inconsistency {
            record_type,
            id,
            kind,
        };
        match finding.kind.severity() {
            Severity::Error => {
                tracing::error!(record_type = %record_type, id = ?id, "{}", finding.kind);
                self.errors[record_type.slot()].fetch_add(1, Ordering::Relaxed);
                let total = self.total.fetch_add(1, Ordering::AcqRel) + 1;
                if self.threshold.is_some_and(|t| total >= t) {
                    self.stopped.store(true, Ordering::Release);
                }
            }
            Severity::Warning => {
                tracing::warn!(record_type = %record_type, id = ?id, "{}", finding.kind);
                self.warnings[record_type.slot()].fetch_add(1, Ordering::Relaxed);
            }
        }
        let line = finding.to_string();
        if let Some((path, file)) = &self.report_file {
            if let Err(error) = writeln!(file.lock(), "{line}") {
                self.report_failed(path, error);
            }
        }
        let mut descriptions = self.descriptions.lock();
        if descriptions.len() < self.max_descriptions {
            descriptions.push(line);
        }
    }

    fn report_failed(&self, path: &Path, error: io::Error) {
        let mut first = self.report_error.lock();
        if first.is_none() {
            tracing::warn!(path = %path.display(), %error, "could not write report file");
            *first = Some(error);
        }
    }

    fn flush_report(&self) {
        if let Some((path, file)) = &self.report_file {
            if let Err(error) = file.lock().flush() {
                self.report_failed(path, error);
            }
        }
    }

    /// Flushes the report file.
    ///
    /// # Errors
    ///
    /// Returns the first failure to write or flush the report file.
    pub fn finish(&self) -> Result<(), StoreError> {
        self.flush_report();
        match (&self.report_file, self.report_error.lock().take()) {
            (Some((path, _)), Some(source)) => Err(StoreError::Io {
                store: path.display().to_string(),
                source,
            }),
            _ => Ok(()),
        }
    }

    /// Records on `id` of `record_type`.
    pub fn on(&self, record_type: RecordType, id: u64, kind: Kind) {
        self.report(record_type, Some(id), kind);
    }

    /// Whether the fail-fast threshold has been reached.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Snapshot of everything recorded so far. Descriptions are sorted so
    /// the snapshot does not depend on scheduling.
    #[must_use]
    pub fn summary(&self) -> ConsistencySummary {
        self.flush_report();
        let collect = |counters: &[AtomicU64; RecordType::ALL.len()]| {
            RecordType::ALL
                .into_iter()
                .filter_map(|rt| {
                    let n = counters[rt.slot()].load(Ordering::Acquire);
                    (n > 0).then_some((rt, n))
                })
                .collect::<BTreeMap<_, _>>()
        };
        let inconsistencies = collect(&self.errors);
        ConsistencySummary {
            total: inconsistencies.values().sum(),
            inconsistencies,
            warnings: collect(&self.warnings),
            aborted: self.should_stop(),
            descriptions: {
                let mut descriptions = self.descriptions.lock().clone();
                descriptions.sort_unstable();
                descriptions
            },
            report_path: self.report_file.as_ref().map(|(path, _)| path.clone()),
        }
    }
}

/// Outcome of a check: counts per record type plus readable descriptions.
#[cfg_attr(feature = "serde", derive(::serde::Serialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencySummary {
    inconsistencies: BTreeMap<RecordType, u64>,
    warnings: BTreeMap<RecordType, u64>,
    total: u64,
    /// Whether the fail-fast threshold cut the run short.
    pub aborted: bool,
    pub descriptions: Vec<String>,
    pub report_path: Option<PathBuf>,
}

impl ConsistencySummary {
    #[must_use]
    pub fn inconsistency_count(&self, record_type: RecordType) -> u64 {
        self.inconsistencies.get(&record_type).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn warning_count(&self, record_type: RecordType) -> u64 {
        self.warnings.get(&record_type).copied().unwrap_or(0)
    }

    #[must_use]
    pub const fn total_inconsistency_count(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.total == 0
    }

    /// Non-zero inconsistency counts, ordered by record type.
    pub fn counts(&self) -> impl Iterator<Item = (RecordType, u64)> + '_ {
        self.inconsistencies.iter().map(|(&rt, &n)| (rt, n))
    }
}

impl fmt::Display for ConsistencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Consistency summary")?;
        writeln!(f, "  {:<32} {:>10} {:>10}", "record type", "errors", "warnings")?;
        for rt in RecordType::ALL {
            let (errors, warnings) = (self.inconsistency_count(rt), self.warning_count(rt));
            if errors > 0 || warnings > 0 {
                writeln!(f, "  {:<32} {errors:>10} {warnings:>10}", rt.name())?;
            }
        }
        write!(f, "  total inconsistencies: {}", self.total)?;
        if self.aborted {
            write!(f, " (stopped early)")?;
        }
        Ok(())
    }
}
