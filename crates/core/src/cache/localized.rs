//! Re-resolving localized entries after a language switch.

use super::FileCacheManager;
use crate::backend::{AudioBackend, LocationQuery};
use crate::entry::{EntryFlags, EntryState, EntryStatus, FileEntryId, normalize_path};
use bankcache_events::CacheEventKind;

impl<B: AudioBackend> FileCacheManager<B> {
    /// Point every localized entry at the backend's current language.
    ///
    /// Resident or loading entries are released, re-resolved and cached again
    /// with their use count preserved. Other entries only get their path and
    /// size refreshed. Returns the number of entries refreshed.
    ///
    /// Entries keep the id they were registered with.
    pub fn update_localized_entries(&mut self, synchronous: bool) -> usize {
        let localized = self
            .registry
            .ids_where(|e| e.flags.contains(EntryFlags::LOCALIZED));

        for &id in &localized {
            let Some(entry) = self.registry.get_mut(id) else {
                continue;
            };
            if entry.holds_block() {
                let use_count = entry.use_count;
                entry.use_count = 0;
                self.uncache_file(id);
                self.refresh_localized(id);
                self.cache_entry_internal(id, synchronous, Some(use_count));
            } else {
                self.refresh_localized(id);
            }
        }
        localized.len()
    }

    fn refresh_localized(&mut self, id: FileEntryId) {
        let Some(entry) = self.registry.get_mut(id) else {
            return;
        };
        let location = self.backend.file_location(&LocationQuery {
            file_name: &entry.file_name,
            localized: true,
            data: entry.backend_data,
        });
        entry.path = normalize_path(&location, &entry.file_name);
        entry.size = self.fs.file_size(&entry.path);

        let path = entry.display_path();
        let size = entry.size;
        match (size, entry.status()) {
            (0, _) => {
                entry.state = EntryState::NotFound;
                self.emit(CacheEventKind::FileNotFound { path: path.clone() });
            }
            (_, EntryStatus::NotFound) => entry.state = EntryState::NotCached,
            _ => {}
        }
        self.emit(CacheEventKind::LocalizedEntryRefreshed { path, size });
    }
}
