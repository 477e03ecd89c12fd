use std::path::PathBuf;

use tracing::debug;
use xxhash_rust::xxh64::xxh64;

use super::format::{chained_end_at, decode_payload, entries_in, offset_at, PayloadScan};
use super::header::SymbolMapHeader;
use super::options::SymbolMapConfig;
use crate::primitives::io::StdFileIo;
use crate::primitives::mmap::MappedFile;
use crate::types::{Result, SymbolError, SymbolKey};

const HASH_SEED: u64 = 0x5359_4d4f;
const MIN_SLOTS: usize = 16;
const MAX_INDEX_PRESIZE: usize = 1 << 22;

#[derive(Clone, Copy)]
struct Slot {
    hash: u64,
    key: i32,
}

const EMPTY: Slot = Slot { hash: 0, key: -1 };

/// Open-addressing string→key table holding only hashes and keys; values
/// are compared against the mapped value store.
struct KeyIndex {
    slots: Vec<Slot>,
    len: usize,
}

impl KeyIndex {
    fn with_capacity(entries: usize) -> Self {
        let slots = (entries.saturating_mul(2)).max(MIN_SLOTS).next_power_of_two();
        Self {
            slots: vec![EMPTY; slots],
            len: 0,
        }
    }

    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    fn find(&self, hash: u64, mut matches: impl FnMut(i32) -> bool) -> Option<i32> {
        let mask = self.mask();
        let mut pos = hash as usize & mask;
        loop {
            let slot = self.slots[pos];
            if slot.key < 0 {
                return None;
            }
            if slot.hash == hash && matches(slot.key) {
                return Some(slot.key);
            }
            pos = (pos + 1) & mask;
        }
    }

    /// Inserts unless `matches` already accepts a present key, so the first
    /// key assigned to a value wins.
    fn insert(&mut self, hash: u64, key: i32, matches: impl FnMut(i32) -> bool) {
        if self.find(hash, matches).is_some() {
            return;
        }
        if (self.len + 1) * 2 > self.slots.len() {
            self.grow();
        }
        self.place(Slot { hash, key });
        self.len += 1;
    }

    fn place(&mut self, slot: Slot) {
        let mask = self.mask();
        let mut pos = slot.hash as usize & mask;
        while self.slots[pos].key >= 0 {
            pos = (pos + 1) & mask;
        }
        self.slots[pos] = slot;
    }

    fn grow(&mut self) {
        let len = self.slots.len() * 2;
        let old = std::mem::replace(&mut self.slots, vec![EMPTY; len]);
        for slot in old.into_iter().filter(|slot| slot.key >= 0) {
            self.place(slot);
        }
    }
}

fn hash_value(bytes: &[u8]) -> u64 {
    xxh64(bytes, HASH_SEED)
}

fn payload_at<'a>(offsets: &[u8], values: &'a [u8], index: usize) -> Option<&'a [u8]> {
    let off = usize::try_from(offset_at(offsets, index)?).ok()?;
    decode_payload(values, off).map(|(body, _)| body)
}

/// Number of leading entries, capped at `max`, ending in a complete entry
/// that continues the payload chain.
fn visible_count(offsets: &[u8], values: &[u8], max: usize) -> usize {
    let mut count = max.min(entries_in(offsets.len() as u64));
    while count > 0 && chained_end_at(offsets, values, count - 1).is_none() {
        count -= 1;
    }
    count
}

/// Read-only handle on one symbol column.
///
/// Both files are memory mapped; `value_of` borrows straight from the
/// mapping and `key_of` searches a hash index built when the reader opens.
/// The view covers a fixed number of symbols until [`refresh`] extends it.
///
/// [`refresh`]: SymbolMapReader::refresh
pub struct SymbolMapReader {
    name: String,
    offsets_path: PathBuf,
    offsets_io: StdFileIo,
    values_io: StdFileIo,
    offsets: MappedFile,
    values: MappedFile,
    header: SymbolMapHeader,
    count: usize,
    index: KeyIndex,
}

impl SymbolMapReader {
    /// Maps a column, exposing at most `max_known_count` symbols.
    pub fn open(config: &SymbolMapConfig, name: &str, max_known_count: usize) -> Result<Self> {
        let offsets_path = config.offsets_path(name)?;
        let values_path = config.values_path(name)?;
        let offsets_io = StdFileIo::open_read_only(&offsets_path)?;
        let header = SymbolMapHeader::load(&offsets_io, &offsets_path)?;
        let values_io = StdFileIo::open_read_only(&values_path)?;
        let offsets = MappedFile::map(offsets_io.file())?;
        let values = MappedFile::map(values_io.file())?;

        let count = visible_count(offsets.as_bytes(), values.as_bytes(), max_known_count);
        let presize = usize::try_from(header.capacity)
            .unwrap_or(usize::MAX)
            .min(MAX_INDEX_PRESIZE)
            .max(count);
        let mut reader = Self {
            name: name.to_string(),
            offsets_path,
            offsets_io,
            values_io,
            offsets,
            values,
            header,
            count: 0,
            index: KeyIndex::with_capacity(presize),
        };
        reader.index_range(0, 0, count)?;
        debug!(column = %reader.name, count, "symbols.reader.open");
        Ok(reader)
    }

    /// Adds symbols `[from, to)` to the view; `offset` is where payload
    /// `from` starts.
    fn index_range(&mut self, from: usize, offset: u64, to: usize) -> Result<()> {
        let offsets = self.offsets.as_bytes();
        let values = self.values.as_bytes();
        let scan =
            PayloadScan::new(&self.offsets_path, offsets, values, to).starting_at(from, offset);
        for item in scan {
            let (index, value) = item?;
            let bytes = value.as_bytes();
            self.index.insert(hash_value(bytes), index as i32, |key| {
                payload_at(offsets, values, key as usize) == Some(bytes)
            });
        }
        self.count = to;
        Ok(())
    }

    /// Extends the view to newly appended symbols, up to `max_known_count`.
    ///
    /// The view never shrinks. Returns the visible count.
    pub fn refresh(&mut self, max_known_count: usize) -> Result<usize> {
        if max_known_count <= self.count {
            return Ok(self.count);
        }
        self.offsets = MappedFile::map(self.offsets_io.file())?;
        self.values = MappedFile::map(self.values_io.file())?;
        let count = visible_count(self.offsets.as_bytes(), self.values.as_bytes(), max_known_count);
        if count < self.count {
            return Err(SymbolError::corrupt(
                &self.offsets_path,
                format!(
                    "symbol map shrank to {count} symbols under a reader exposing {}",
                    self.count
                ),
            ));
        }
        if count > self.count {
            let from = self.count;
            let start = offset_at(self.offsets.as_bytes(), from).ok_or_else(|| {
                SymbolError::corrupt(&self.offsets_path, format!("offset entry {from} missing"))
            })?;
            self.index_range(from, start, count)?;
            debug!(column = %self.name, from, to = count, "symbols.reader.refresh");
        }
        Ok(self.count)
    }

    /// Returns the value for `key`.
    ///
    /// [`SymbolKey::NULL`] yields `None`; any other key outside
    /// `[0, count)` fails with [`SymbolError::InvalidKey`].
    pub fn value_of(&self, key: impl Into<SymbolKey>) -> Result<Option<&str>> {
        let key = key.into();
        if key.is_null() {
            return Ok(None);
        }
        let index = key
            .index()
            .filter(|&index| index < self.count)
            .ok_or(SymbolError::InvalidKey {
                key: key.0,
                count: self.count,
            })?;
        let body = payload_at(self.offsets.as_bytes(), self.values.as_bytes(), index)
            .ok_or_else(|| {
                SymbolError::corrupt(&self.offsets_path, format!("payload for key {index} truncated"))
            })?;
        std::str::from_utf8(body).map(Some).map_err(|err| {
            SymbolError::corrupt(
                &self.offsets_path,
                format!("payload for key {index} is not valid UTF-8: {err}"),
            )
        })
    }

    /// Returns the key of `value`, [`SymbolKey::NULL`] for `None`, or
    /// [`SymbolKey::NOT_FOUND`] if the value is not in the view.
    pub fn key_of<'a>(&self, value: impl Into<Option<&'a str>>) -> SymbolKey {
        let Some(value) = value.into() else {
            return SymbolKey::NULL;
        };
        let bytes = value.as_bytes();
        let offsets = self.offsets.as_bytes();
        let values = self.values.as_bytes();
        self.index
            .find(hash_value(bytes), |key| {
                payload_at(offsets, values, key as usize) == Some(bytes)
            })
            .map(SymbolKey)
            .unwrap_or(SymbolKey::NOT_FOUND)
    }

    /// Iterates `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = Result<(SymbolKey, &str)>> + '_ {
        PayloadScan::new(
            &self.offsets_path,
            self.offsets.as_bytes(),
            self.values.as_bytes(),
            self.count,
        )
        .map(|item| item.map(|(index, value)| (SymbolKey(index as i32), value)))
    }

    /// Number of visible symbols.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Declared capacity from the header.
    pub fn capacity(&self) -> u64 {
        self.header.capacity
    }

    /// Header as written at creation.
    pub fn header(&self) -> &SymbolMapHeader {
        &self.header
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
