//! Byte budget accounting, admission and eviction.

use super::FileCacheManager;
use crate::backend::AudioBackend;
use crate::entry::{EntryFlags, EntryStatus, FileEntry};
use bankcache_events::CacheEventKind;
use serde::Serialize;

/// Bytes held by loading and cached entries against the configured budget.
///
/// `current <= max` holds after every public operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    current: u64,
    max: u64,
}

impl Ledger {
    /// An empty ledger with budget `max`.
    #[must_use]
    pub const fn new(max: u64) -> Self {
        Self { current: 0, max }
    }

    /// Bytes in use.
    #[must_use]
    pub const fn current(&self) -> u64 {
        self.current
    }

    /// Budget.
    #[must_use]
    pub const fn max(&self) -> u64 {
        self.max
    }

    /// Bytes still available.
    #[must_use]
    pub const fn free(&self) -> u64 {
        self.max.saturating_sub(self.current)
    }

    pub(crate) fn reserve(&mut self, size: u64) {
        debug_assert!(size <= self.free(), "reserving {size} with {} free", self.free());
        self.current = self.current.saturating_add(size).min(self.max);
    }

    pub(crate) fn release(&mut self, size: u64) {
        debug_assert!(size <= self.current, "releasing {size} of {}", self.current);
        self.current = self.current.saturating_sub(size);
    }
}

fn is_evictable(entry: &FileEntry) -> bool {
    entry.status() == EntryStatus::Cached && entry.flags.contains(EntryFlags::REMOVABLE)
}

impl<B: AudioBackend> FileCacheManager<B> {
    /// Whether `requested` bytes can be admitted, evicting removable entries
    /// if that is what it takes.
    ///
    /// Eviction only runs when the removable entries together would free
    /// enough; admission is then decided on the space actually freed.
    pub fn fits(&mut self, requested: u64) -> bool {
        debug_assert!(self.ledger.current() <= self.ledger.max());

        if requested <= self.ledger.free() {
            return true;
        }

        let gain = self.potential_gain();
        let available = self.ledger.max() - self.ledger.current().saturating_sub(gain);
        if requested > available {
            return false;
        }

        self.evict_all_removable();
        requested <= self.ledger.free()
    }

    /// Bytes an eviction sweep would free right now.
    #[must_use]
    pub fn potential_gain(&self) -> u64 {
        self.registry
            .iter()
            .filter(|e| is_evictable(e))
            .map(FileEntry::size)
            .sum()
    }

    /// Uncache every cached, removable entry in registration order.
    ///
    /// Returns the number of bytes freed.
    pub fn evict_all_removable(&mut self) -> u64 {
        let before = self.ledger.current();
        let victims = self.registry.ids_where(is_evictable);
        let evicted = victims.len();
        for id in victims {
            self.uncache_entry_internal(id, true, false);
        }
        let freed = before.saturating_sub(self.ledger.current());
        if evicted > 0 {
            self.emit(CacheEventKind::EvictionSweep { evicted, freed });
        }
        freed
    }
}
