//! File entry registry and scope-based registration.

use super::{FileCacheManager, RequestStatus};
use crate::Result;
use crate::backend::AudioBackend;
use crate::entry::{
    DataScope, EntryFlags, EntryState, EntryStatus, FileEntry, FileEntryId, normalize_path,
};
use crate::manifest::FileNode;
use bankcache_events::CacheEventKind;
use indexmap::IndexMap;

/// Owns every [`FileEntry`], keyed by id, in registration order.
///
/// Registration order is also the eviction order.
#[derive(Debug, Default)]
pub struct FileEntryRegistry {
    entries: IndexMap<FileEntryId, FileEntry>,
}

impl FileEntryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: FileEntryId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Look up an entry.
    #[must_use]
    pub fn get(&self, id: FileEntryId) -> Option<&FileEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: FileEntryId) -> Option<&mut FileEntry> {
        self.entries.get_mut(&id)
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    /// Insert a new entry. The first registration of an id wins.
    pub(crate) fn insert(&mut self, entry: FileEntry) -> bool {
        if self.entries.contains_key(&entry.id) {
            return false;
        }
        self.entries.insert(entry.id, entry);
        true
    }

    pub(crate) fn remove(&mut self, id: FileEntryId) -> Option<FileEntry> {
        self.entries.shift_remove(&id)
    }

    /// Ids of entries matching `predicate`, in registration order.
    pub(crate) fn ids_where(&self, predicate: impl Fn(&FileEntry) -> bool) -> Vec<FileEntryId> {
        self.entries
            .values()
            .filter(|e| predicate(e))
            .map(FileEntry::id)
            .collect()
    }

    /// Whether any entry is waiting on a stream.
    #[must_use]
    pub fn has_loading(&self) -> bool {
        self.entries
            .values()
            .any(|e| e.status() == EntryStatus::Loading)
    }
}

impl<B: AudioBackend> FileCacheManager<B> {
    /// Register a file node under `scope`.
    ///
    /// Entries registered without `auto_load` are use-counted. Registering an
    /// id that already exists keeps the existing entry; an auto-loading
    /// registration upgrades a use-counted entry to auto loading.
    ///
    /// A file that does not exist is still registered, as `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend rejects the node.
    pub fn register(
        &mut self,
        node: &FileNode,
        scope: DataScope,
        auto_load: bool,
    ) -> Result<FileEntryId> {
        let parsed = self.backend.parse_file_entry(node)?;
        let path = normalize_path(&parsed.location, &parsed.file_name);
        let id = FileEntryId::from_path(&path);

        if let Some(existing) = self.registry.get_mut(id) {
            if auto_load && existing.flags.contains(EntryFlags::USE_COUNTED) {
                existing.flags.remove(EntryFlags::USE_COUNTED);
                existing.flags.insert(EntryFlags::NEEDS_RESET_TO_MANUAL_LOADING);
                // A use-counted entry that was cached with no users is no
                // longer evictable once something auto-loads it.
                existing.flags.remove(EntryFlags::REMOVABLE);
                let path = existing.display_path();
                self.emit(CacheEventKind::UpgradedToAutoLoading { path });
            }
            self.backend.delete_file_entry(parsed.data);
            return Ok(id);
        }

        let size = self.fs.file_size(&path);
        let mut flags = EntryFlags::empty();
        flags.set(EntryFlags::LOCALIZED, parsed.localized);
        flags.set(EntryFlags::USE_COUNTED, !auto_load);

        let entry = FileEntry {
            id,
            path,
            file_name: parsed.file_name,
            size,
            alignment: parsed.alignment,
            scope,
            flags,
            use_count: 0,
            backend_data: parsed.data,
            state: if size == 0 {
                EntryState::NotFound
            } else {
                EntryState::NotCached
            },
        };
        let display = entry.display_path();
        self.registry.insert(entry);

        if size == 0 {
            self.emit(CacheEventKind::FileNotFound {
                path: display.clone(),
            });
        }
        self.emit(CacheEventKind::EntryRegistered {
            path: display,
            size,
        });
        Ok(id)
    }

    /// Remove an entry registered under exactly `scope`.
    ///
    /// Returns `true` only when the entry was removed. Unregistering a global
    /// entry that a level upgraded to auto loading with `LevelSpecific`
    /// restores manual loading instead.
    pub fn unregister(&mut self, id: FileEntryId, scope: DataScope) -> bool {
        let Some(entry) = self.registry.get_mut(id) else {
            return false;
        };

        if entry.scope == scope {
            self.remove_entry(id);
            return true;
        }

        if scope == DataScope::LevelSpecific
            && entry
                .flags
                .contains(EntryFlags::NEEDS_RESET_TO_MANUAL_LOADING)
        {
            entry.flags.remove(EntryFlags::NEEDS_RESET_TO_MANUAL_LOADING);
            entry.flags.insert(EntryFlags::USE_COUNTED);
            if entry.status() == EntryStatus::Cached && entry.use_count == 0 {
                entry.flags.insert(EntryFlags::REMOVABLE);
            }
            let path = entry.display_path();
            self.emit(CacheEventKind::DowngradedToManualLoading { path });
        }
        false
    }

    /// Force-uncache and remove every entry registered under `scope`.
    ///
    /// Entries of other scopes are left alone, except that level teardown
    /// restores manual loading on entries a level had upgraded.
    pub fn unload_all_by_scope(&mut self, scope: DataScope) -> RequestStatus {
        for id in self.registry.ids_where(|_| true) {
            self.unregister(id, scope);
        }
        RequestStatus::Success
    }

    fn remove_entry(&mut self, id: FileEntryId) {
        self.uncache_entry_internal(id, true, true);
        if let Some(entry) = self.registry.remove(id) {
            self.backend.delete_file_entry(entry.backend_data);
            self.emit(CacheEventKind::EntryUnregistered {
                path: entry.display_path(),
            });
        }
    }
}
