use std::fs::File;
use std::io;
use std::marker::PhantomData;
use std::ops::Range;
use std::path::Path;

use memmap2::Mmap;

use super::format::{StoreHeader, HEADER_SIZE};
use super::record::Record;
use crate::error::StoreError;

/// Backing bytes of a store file.
#[derive(Debug)]
pub enum StoreBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl core::ops::Deref for StoreBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(map) => map,
            Self::Owned(bytes) => bytes,
        }
    }
}

/// Read-only random access over one store file.
///
/// Slots at or past `high_id` read as zeroed, not-in-use records.
#[derive(Debug)]
pub struct RecordStore<R> {
    name: String,
    header: StoreHeader,
    bytes: StoreBytes,
    zeroed: Vec<u8>,
    marker: PhantomData<fn() -> R>,
}

impl<R: Record> RecordStore<R> {
    /// Maps the store file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Missing`] if the file does not exist, and a
    /// format error if its header does not describe a store of kind `R`.
    pub fn open(name: &str, path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                StoreError::Missing {
                    store: name.to_owned(),
                    path: path.to_path_buf(),
                }
            } else {
                StoreError::Io {
                    store: name.to_owned(),
                    source,
                }
            }
        })?;
        let len = file
            .metadata()
            .map_err(|source| StoreError::Io {
                store: name.to_owned(),
                source,
            })?
            .len();
        let bytes = if len == 0 {
            StoreBytes::Owned(Vec::new())
        } else {
            // SAFETY: stores are closed to writers for the duration of a check.
            let map = unsafe { Mmap::map(&file) }.map_err(|source| StoreError::Io {
                store: name.to_owned(),
                source,
            })?;
            StoreBytes::Mapped(map)
        };
        Self::from_bytes(name, bytes)
    }

    /// # Errors
    ///
    /// Fails when the header is malformed, names another record kind, declares
    /// an unexpected record size or promises more slots than the file holds.
    pub fn from_bytes(name: &str, bytes: StoreBytes) -> Result<Self, StoreError> {
        let header = StoreHeader::decode(name, &bytes)?;
        if header.kind != R::KIND {
            return Err(StoreError::Format {
                store: name.to_owned(),
                reason: format!("holds {:?} records, expected {:?}", header.kind, R::KIND),
            });
        }
        let record_size = header.record_size as usize;
        match R::SIZE {
            Some(size) if size != record_size => {
                return Err(StoreError::RecordSize {
                    store: name.to_owned(),
                    expected: u32::try_from(size).unwrap_or(u32::MAX),
                    actual: header.record_size,
                });
            }
            None if record_size <= super::record::DynamicRecord::HEADER_SIZE => {
                return Err(StoreError::Format {
                    store: name.to_owned(),
                    reason: format!("record size {record_size} leaves no room for data"),
                });
            }
            _ => {}
        }
        let expected = (HEADER_SIZE as u64)
            .saturating_add(header.high_id.saturating_mul(record_size as u64));
        if (bytes.len() as u64) < expected {
            return Err(StoreError::Truncated {
                store: name.to_owned(),
                expected,
                actual: bytes.len() as u64,
            });
        }
        Ok(Self {
            name: name.to_owned(),
            header,
            bytes,
            zeroed: vec![0; record_size],
            marker: PhantomData,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exclusive upper bound of every id ever allocated.
    #[must_use]
    pub const fn high_id(&self) -> u64 {
        self.header.high_id
    }

    #[must_use]
    pub const fn record_size(&self) -> usize {
        self.header.record_size as usize
    }

    #[must_use]
    pub const fn contains(&self, id: u64) -> bool {
        id < self.header.high_id
    }

    /// Raw slot bytes, including for records not in use.
    #[must_use]
    pub fn raw(&self, id: u64) -> &[u8] {
        if !self.contains(id) {
            return &self.zeroed;
        }
        let size = self.record_size();
        #[allow(clippy::cast_possible_truncation)]
        let at = HEADER_SIZE + id as usize * size;
        &self.bytes[at..at + size]
    }

    #[must_use]
    pub fn read(&self, id: u64) -> R {
        R::decode(id, self.raw(id))
    }

    /// Sequential scan over `range`, clamped to `high_id`.
    pub fn cursor(&self, range: Range<u64>) -> impl Iterator<Item = R> + '_ {
        let end = range.end.min(self.high_id());
        (range.start..end).map(|id| self.read(id))
    }

    /// Sequential scan over every slot.
    pub fn scan(&self) -> impl Iterator<Item = R> + '_ {
        self.cursor(0..self.high_id())
    }
}
