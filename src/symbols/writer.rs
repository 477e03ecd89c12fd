use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use super::format::{
    encode_payload, offset_pos, read_offset, recover_extent, values_len_at, PayloadScan,
};
use super::header::SymbolMapHeader;
use super::metrics::{SymbolMapMetrics, SymbolMapMetricsSnapshot};
use super::options::{SymbolColumnDescriptor, SymbolMapConfig, Synchronous};
use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::{Result, SymbolError, SymbolKey};

/// Upper bound on cache entries reserved up front from the declared capacity.
const MAX_CACHE_PRESIZE: usize = 1 << 22;

/// Append-capable handle on one symbol column.
///
/// At most one writer may be open per column. Every mutation takes
/// `&mut self`; readers opened elsewhere observe appends once they refresh.
pub struct SymbolMapWriter {
    name: String,
    offsets_path: PathBuf,
    offsets: StdFileIo,
    values: StdFileIo,
    header: SymbolMapHeader,
    synchronous: Synchronous,
    count: usize,
    values_len: u64,
    cache: Option<FxHashMap<Box<str>, i32>>,
    scratch: Vec<u8>,
    metrics: Arc<SymbolMapMetrics>,
    over_capacity: bool,
}

impl SymbolMapWriter {
    /// Creates the files for a new, empty symbol column.
    ///
    /// Fails with [`SymbolError::AlreadyExists`] if either file is present.
    /// Files created by a failed call are removed before returning.
    pub fn create(config: &SymbolMapConfig, descriptor: &SymbolColumnDescriptor) -> Result<()> {
        let offsets_path = config.offsets_path(&descriptor.name)?;
        let values_path = config.values_path(&descriptor.name)?;
        if values_path.exists() {
            return Err(SymbolError::AlreadyExists(values_path));
        }
        fs::create_dir_all(&config.root)?;

        let offsets = StdFileIo::create_new(&offsets_path)?;
        let values = match StdFileIo::create_new(&values_path) {
            Ok(values) => values,
            Err(err) => {
                drop(offsets);
                discard(&offsets_path);
                return Err(err);
            }
        };
        let header = SymbolMapHeader::new(u64::from(descriptor.capacity), descriptor.cached);
        let init = || -> Result<()> {
            header.store(&offsets)?;
            if config.synchronous.on_create() {
                offsets.sync_all()?;
                values.sync_all()?;
            }
            Ok(())
        };
        if let Err(err) = init() {
            drop(offsets);
            drop(values);
            discard(&offsets_path);
            discard(&values_path);
            return Err(err);
        }
        debug!(
            column = %descriptor.name,
            capacity = descriptor.capacity,
            cached = descriptor.cached,
            "symbols.writer.create"
        );
        Ok(())
    }

    /// Opens an existing column for appending.
    ///
    /// `initial_count` is the number of symbols the caller knows to be
    /// committed. Symbols on disk beyond it are discarded; a count larger than
    /// what the files hold is reported as [`SymbolError::CorruptFormat`].
    /// With `use_cache` the value store is scanned once to rebuild the dedup
    /// cache.
    pub fn open(
        config: &SymbolMapConfig,
        name: &str,
        use_cache: bool,
        initial_count: usize,
    ) -> Result<Self> {
        Self::open_at(config, name, use_cache, Some(initial_count))
    }

    /// Opens an existing column and resumes after the last complete symbol
    /// found on disk.
    pub fn resume(config: &SymbolMapConfig, name: &str, use_cache: bool) -> Result<Self> {
        Self::open_at(config, name, use_cache, None)
    }

    fn open_at(
        config: &SymbolMapConfig,
        name: &str,
        use_cache: bool,
        initial_count: Option<usize>,
    ) -> Result<Self> {
        let offsets_path = config.offsets_path(name)?;
        let values_path = config.values_path(name)?;
        let offsets = StdFileIo::open_existing(&offsets_path)?;
        let header = SymbolMapHeader::load(&offsets, &offsets_path)?;
        let values = StdFileIo::open_existing(&values_path)?;

        let extent = recover_extent(&offsets, &values, &offsets_path)?;
        let initial_count = initial_count.unwrap_or(extent.count);
        if initial_count > extent.count {
            return Err(SymbolError::corrupt(
                &offsets_path,
                format!(
                    "initial count {initial_count} exceeds the {} symbols on disk",
                    extent.count
                ),
            ));
        }
        let values_len = values_len_at(&offsets, initial_count, extent)?;
        if values_len > extent.values_len {
            return Err(SymbolError::corrupt(
                &offsets_path,
                format!(
                    "offset {values_len} of key {initial_count} lies past the value store end {}",
                    extent.values_len
                ),
            ));
        }
        let mut writer = Self {
            name: name.to_string(),
            offsets_path,
            offsets,
            values,
            header,
            synchronous: config.synchronous,
            count: initial_count,
            values_len,
            cache: None,
            scratch: Vec::with_capacity(64),
            metrics: Arc::new(SymbolMapMetrics::default()),
            over_capacity: false,
        };
        // every check runs before the first truncate
        if use_cache {
            writer.rebuild_cache()?;
        }
        discard_tail(
            &writer.offsets,
            offset_pos(initial_count),
            &writer.offsets_path,
        )?;
        discard_tail(&writer.values, values_len, &values_path)?;
        writer.over_capacity = writer.count as u64 > writer.header.capacity;
        debug!(
            column = %writer.name,
            count = writer.count,
            values_len = writer.values_len,
            cached = use_cache,
            "symbols.writer.open"
        );
        Ok(writer)
    }

    /// Opens a column using the cache setting from its descriptor.
    pub fn open_column(
        config: &SymbolMapConfig,
        descriptor: &SymbolColumnDescriptor,
        initial_count: usize,
    ) -> Result<Self> {
        Self::open(config, &descriptor.name, descriptor.cached, initial_count)
    }

    fn rebuild_cache(&mut self) -> Result<()> {
        let presize = usize::try_from(self.header.capacity)
            .unwrap_or(usize::MAX)
            .min(MAX_CACHE_PRESIZE)
            .max(self.count);
        let mut cache =
            FxHashMap::with_capacity_and_hasher(presize, Default::default());
        if self.count > 0 {
            let mut offsets = vec![0u8; offset_pos(self.count) as usize];
            self.offsets.read_at(0, &mut offsets)?;
            let mut values = vec![0u8; self.values_len as usize];
            self.values.read_at(0, &mut values)?;
            let mut scan = PayloadScan::new(&self.offsets_path, &offsets, &values, self.count);
            for item in scan.by_ref() {
                let (index, value) = item?;
                cache.entry(Box::from(value)).or_insert(index as i32);
            }
            if scan.position() != self.values_len {
                return Err(SymbolError::corrupt(
                    &self.offsets_path,
                    format!(
                        "value store holds {} bytes, symbols cover {}",
                        self.values_len,
                        scan.position()
                    ),
                ));
            }
        }
        trace!(column = %self.name, entries = cache.len(), "symbols.writer.cache_rebuilt");
        self.cache = Some(cache);
        Ok(())
    }

    /// Returns the key for `value`, appending it if it is new.
    ///
    /// `None` yields [`SymbolKey::NULL`] without touching the files. With the
    /// cache enabled a known value returns its original key; without it every
    /// call appends.
    pub fn append<'a>(&mut self, value: impl Into<Option<&'a str>>) -> Result<SymbolKey> {
        self.metrics.append();
        let Some(value) = value.into() else {
            self.metrics.null_append();
            return Ok(SymbolKey::NULL);
        };
        if self.cache.is_none() {
            return self.write_symbol(value);
        }
        if let Some(&key) = self.cache.as_ref().and_then(|cache| cache.get(value)) {
            self.metrics.cache_hit();
            return Ok(SymbolKey(key));
        }
        self.metrics.cache_miss();
        let key = self.write_symbol(value)?;
        if let Some(cache) = self.cache.as_mut() {
            cache.insert(Box::from(value), key.0);
        }
        Ok(key)
    }

    fn write_symbol(&mut self, value: &str) -> Result<SymbolKey> {
        let key =
            SymbolKey::from_index(self.count).ok_or(SymbolError::KeySpaceExhausted(self.count))?;
        self.scratch.clear();
        encode_payload(value, &mut self.scratch);
        // payload first: an offset must never point past the value store end
        self.values.write_at(self.values_len, &self.scratch)?;
        self.offsets
            .write_at(offset_pos(self.count), &self.values_len.to_le_bytes())?;
        trace!(
            column = %self.name,
            key = key.0,
            offset = self.values_len,
            "symbols.writer.append"
        );
        self.values_len += self.scratch.len() as u64;
        self.count += 1;
        if !self.over_capacity && self.count as u64 > self.header.capacity {
            self.over_capacity = true;
            warn!(
                column = %self.name,
                capacity = self.header.capacity,
                "symbols.writer.capacity_exceeded"
            );
        }
        Ok(key)
    }

    /// Discards every symbol with key `>= to_count`.
    ///
    /// Must not run while readers rely on a stable view of the column.
    pub fn rollback(&mut self, to_count: usize) -> Result<()> {
        if to_count > self.count {
            return Err(SymbolError::RollbackBeyondCount {
                requested: to_count,
                count: self.count,
            });
        }
        if to_count == self.count {
            return Ok(());
        }
        let values_len = if to_count == 0 {
            0
        } else {
            read_offset(&self.offsets, to_count)?
        };
        self.offsets.truncate(offset_pos(to_count))?;
        debug!(
            column = %self.name,
            from = self.count,
            to = to_count,
            "symbols.writer.rollback"
        );
        // offsets are authoritative now; value bytes past `values_len` are a
        // dangling tail
        self.count = to_count;
        self.values_len = values_len;
        self.over_capacity = self.count as u64 > self.header.capacity;
        if let Some(cache) = self.cache.as_mut() {
            cache.retain(|_, key| (*key as usize) < to_count);
        }
        self.values.truncate(values_len)?;
        self.metrics.rollback();
        if self.synchronous.on_commit() {
            self.sync()?;
        }
        Ok(())
    }

    /// Discards every symbol.
    pub fn truncate(&mut self) -> Result<()> {
        self.rollback(0)
    }

    /// Marks a transaction boundary, syncing under [`Synchronous::Full`].
    /// Returns the committed symbol count.
    pub fn commit(&mut self) -> Result<usize> {
        if self.synchronous.on_commit() {
            self.sync()?;
        }
        trace!(column = %self.name, count = self.count, "symbols.writer.commit");
        Ok(self.count)
    }

    /// Closes the writer, syncing unless sync is [`Synchronous::Off`].
    pub fn close(self) -> Result<()> {
        if self.synchronous.on_close() {
            self.sync()?;
        }
        debug!(column = %self.name, count = self.count, "symbols.writer.close");
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.values.sync_all()?;
        self.offsets.sync_all()
    }

    /// Number of symbols in the column.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Bytes occupied by symbol payloads.
    pub fn values_len(&self) -> u64 {
        self.values_len
    }

    /// Declared capacity from the header.
    pub fn capacity(&self) -> u64 {
        self.header.capacity
    }

    /// Header as written at creation.
    pub fn header(&self) -> &SymbolMapHeader {
        &self.header
    }

    /// Whether this writer deduplicates through its cache.
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle on the writer's counters.
    pub fn metrics(&self) -> Arc<SymbolMapMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current counter values.
    pub fn metrics_snapshot(&self) -> SymbolMapMetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn discard_tail(io: &dyn FileIo, keep: u64, path: &Path) -> Result<()> {
    let len = io.len()?;
    if len > keep {
        warn!(
            path = %path.display(),
            len,
            keep,
            "symbols.writer.discard_tail"
        );
        io.truncate(keep)?;
    }
    Ok(())
}

fn discard(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "symbols.writer.cleanup_failed");
    }
}
