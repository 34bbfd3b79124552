//! Shared test utilities for bankcache-core tests.
//!
//! [`Fixture`] wires a manager to an in-memory filesystem, a manual stream
//! engine and a recording event sink, and keeps handles to all three.

use crate::arena::BudgetArena;
use crate::backend::{DirectoryBackend, InMemoryFileSystem};
use crate::cache::FileCacheManager;
use crate::config::CacheConfig;
use crate::entry::{DataScope, EntryStatus, FileEntryId, normalize_path};
use crate::manifest::FileNode;
use crate::stream::ManualStreamEngine;
use bankcache_events::RecordingSink;
use std::path::{Path, PathBuf};

/// One KiB.
pub const KIB: u64 = 1024;
/// Root directory of the fixture backend.
pub const ROOT: &str = "/banks";
/// Language the fixture backend starts with.
pub const LANGUAGE: &str = "english";

/// A manager with observable collaborators.
pub struct Fixture {
    pub manager: FileCacheManager<DirectoryBackend>,
    pub fs: InMemoryFileSystem,
    pub engine: ManualStreamEngine,
    pub events: RecordingSink,
}

impl Fixture {
    /// Fixture with a `cache_size_kib` budget and an arena of the same size.
    pub fn new(cache_size_kib: u64) -> Self {
        Self::build(cache_size_kib, None)
    }

    /// Fixture whose arena capacity differs from the ledger budget.
    pub fn with_arena(cache_size_kib: u64, arena_capacity: u64) -> Self {
        Self::build(cache_size_kib, Some(arena_capacity))
    }

    fn build(cache_size_kib: u64, arena_capacity: Option<u64>) -> Self {
        let fs = InMemoryFileSystem::new();
        let engine = ManualStreamEngine::new();
        let events = RecordingSink::new();
        let config = CacheConfig {
            cache_size_kib,
            ..CacheConfig::default()
        };

        let mut builder =
            FileCacheManager::builder(config, DirectoryBackend::new(ROOT, LANGUAGE))
                .with_file_system(fs.clone())
                .with_stream_engine(engine.clone())
                .with_event_sink(events.clone());
        if let Some(capacity) = arena_capacity {
            builder = builder.with_arena(BudgetArena::new(capacity));
        }

        Self {
            manager: builder.build().unwrap(),
            fs,
            engine,
            events,
        }
    }

    /// Put a plain bank of `size` bytes on the filesystem.
    pub fn add_file(&self, name: &str, size: u64) -> PathBuf {
        let path = normalize_path(Path::new(ROOT), name);
        self.fs.insert(path.clone(), size);
        path
    }

    /// Put a localized bank of `size` bytes on the filesystem.
    pub fn add_localized_file(&self, language: &str, name: &str, size: u64) -> PathBuf {
        let location = Path::new(ROOT).join("localized").join(language);
        let path = normalize_path(&location, name);
        self.fs.insert(path.clone(), size);
        path
    }

    /// Create and register a plain bank.
    pub fn register(
        &mut self,
        name: &str,
        size: u64,
        scope: DataScope,
        auto_load: bool,
    ) -> FileEntryId {
        self.add_file(name, size);
        self.manager
            .register(&FileNode::new(name), scope, auto_load)
            .unwrap()
    }

    /// Create and register a global plain bank with a custom alignment.
    pub fn register_aligned(
        &mut self,
        name: &str,
        size: u64,
        alignment: usize,
        auto_load: bool,
    ) -> FileEntryId {
        self.add_file(name, size);
        self.manager
            .register(
                &FileNode::new(name).with_alignment(alignment),
                DataScope::Global,
                auto_load,
            )
            .unwrap()
    }

    /// Finish every pending stream and apply the completions.
    pub fn complete_all(&mut self) -> usize {
        self.engine.complete_all_ok();
        self.manager.process_completions()
    }

    /// Cache an entry and finish its load.
    pub fn cache_now(&mut self, id: FileEntryId) {
        assert!(self.manager.cache_entry(id, false));
        self.complete_all();
        assert_eq!(
            self.manager.entry(id).map(|e| e.status()),
            Some(EntryStatus::Cached)
        );
    }
}
