//! Shared harness for integration tests.

#![allow(dead_code)]

use bankcache_core::backend::{DirectoryBackend, InMemoryFileSystem};
use bankcache_core::entry::normalize_path;
use bankcache_core::manifest::FileNode;
use bankcache_core::stream::ManualStreamEngine;
use bankcache_core::{CacheConfig, DataScope, EntryStatus, FileCacheManager, FileEntryId};
use bankcache_events::RecordingSink;
use std::path::Path;

pub const KIB: u64 = 1024;
pub const ROOT: &str = "/banks";

pub struct Harness {
    pub fcm: FileCacheManager<DirectoryBackend>,
    pub fs: InMemoryFileSystem,
    pub engine: ManualStreamEngine,
    pub events: RecordingSink,
}

impl Harness {
    pub fn new(cache_size_kib: u64) -> Self {
        let fs = InMemoryFileSystem::new();
        let engine = ManualStreamEngine::new();
        let events = RecordingSink::new();
        let config = CacheConfig {
            cache_size_kib,
            ..CacheConfig::default()
        };
        let fcm = FileCacheManager::builder(config, DirectoryBackend::new(ROOT, "english"))
            .with_file_system(fs.clone())
            .with_stream_engine(engine.clone())
            .with_event_sink(events.clone())
            .build()
            .unwrap();
        Self {
            fcm,
            fs,
            engine,
            events,
        }
    }

    pub fn add_file(&self, name: &str, size: u64) {
        self.fs.insert(normalize_path(Path::new(ROOT), name), size);
    }

    pub fn add_localized_file(&self, language: &str, name: &str, size: u64) {
        let location = Path::new(ROOT).join("localized").join(language);
        self.fs.insert(normalize_path(&location, name), size);
    }

    pub fn register(
        &mut self,
        name: &str,
        size: u64,
        scope: DataScope,
        auto_load: bool,
    ) -> FileEntryId {
        self.add_file(name, size);
        self.fcm
            .register(&FileNode::new(name), scope, auto_load)
            .unwrap()
    }

    pub fn complete_all(&mut self) -> usize {
        self.engine.complete_all_ok();
        self.fcm.process_completions()
    }

    pub fn cache_now(&mut self, id: FileEntryId) {
        assert!(self.fcm.cache_entry(id, false));
        self.complete_all();
        assert_eq!(self.status(id), EntryStatus::Cached);
    }

    pub fn status(&self, id: FileEntryId) -> EntryStatus {
        self.fcm.entry(id).unwrap().status()
    }

    pub fn use_count(&self, id: FileEntryId) -> u32 {
        self.fcm.entry(id).unwrap().use_count()
    }
}
