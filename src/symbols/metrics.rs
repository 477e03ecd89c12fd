use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by a symbol map writer.
#[derive(Default, Debug)]
pub struct SymbolMapMetrics {
    appends: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    null_appends: AtomicU64,
    rollbacks: AtomicU64,
}

/// Point-in-time copy of [`SymbolMapMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SymbolMapMetricsSnapshot {
    /// Calls to `append`, nulls included.
    pub appends: u64,
    /// Appends answered from the dedup cache.
    pub cache_hits: u64,
    /// Cached appends that wrote a new symbol. Uncached writers count neither
    /// hits nor misses.
    pub cache_misses: u64,
    /// Appends of the null symbol.
    pub null_appends: u64,
    /// Rollbacks that discarded at least one symbol.
    pub rollbacks: u64,
}

impl SymbolMapMetricsSnapshot {
    /// Fraction of cache lookups that hit; 0.0 without lookups.
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            return 0.0;
        }
        self.cache_hits as f64 / lookups as f64
    }
}

impl SymbolMapMetrics {
    /// Copies the current counter values.
    pub fn snapshot(&self) -> SymbolMapMetricsSnapshot {
        SymbolMapMetricsSnapshot {
            appends: self.appends.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            null_appends: self.null_appends.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }

    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn append(&self) {
        Self::inc(&self.appends);
    }

    pub(crate) fn cache_hit(&self) {
        Self::inc(&self.cache_hits);
    }

    pub(crate) fn cache_miss(&self) {
        Self::inc(&self.cache_misses);
    }

    pub(crate) fn null_append(&self) {
        Self::inc(&self.null_appends);
    }

    pub(crate) fn rollback(&self) {
        Self::inc(&self.rollbacks);
    }
}
