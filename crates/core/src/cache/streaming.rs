//! Per-entry state machine: loading, completion handling and uncaching.
//!
//! ```text
//! NotCached|MemAllocFail --cache--> Loading --ok--> Cached
//!                                      |  \--abort/error--> NotCached
//!                                      \--no memory--> MemAllocFail
//! Cached --uncache--> NotCached
//! ```

use super::FileCacheManager;
use crate::arena::MemoryBlock;
use crate::backend::{AudioBackend, InMemoryFile};
use crate::entry::{EntryFlags, EntryState, EntryStatus, FileEntryId};
use crate::stream::{
    ERROR_SIZE_OUT_OF_RANGE, ReadRequest, StreamCompletion, StreamId, StreamOutcome,
};
use bankcache_events::CacheEventKind;
use chrono::Utc;

impl<B: AudioBackend> FileCacheManager<B> {
    /// Cache an entry, or take another use of it if it is use-counted.
    ///
    /// Returns `true` when the entry is cached or on its way. A synchronous
    /// call blocks until the read finishes and returns `true` only if the
    /// entry ended up cached.
    ///
    /// # Panics
    ///
    /// A synchronous call panics when made from inside an asynchronous
    /// runtime context, see [`FileCacheManager::wait_for_stream`].
    pub fn cache_entry(&mut self, id: FileEntryId, synchronous: bool) -> bool {
        self.cache_entry_internal(id, synchronous, None)
    }

    /// Drop one use of an entry and uncache it once unused.
    ///
    /// Unused use-counted entries stay resident as removable unless `now` is
    /// set. Returns `true` when the entry had no remaining uses.
    pub fn uncache_entry(&mut self, id: FileEntryId, now: bool) -> bool {
        self.uncache_entry_internal(id, now, false)
    }

    /// Uncache an entry regardless of its use count.
    pub fn force_uncache_entry(&mut self, id: FileEntryId) -> bool {
        self.uncache_entry_internal(id, true, true)
    }

    pub(crate) fn cache_entry_internal(
        &mut self,
        id: FileEntryId,
        synchronous: bool,
        use_count_override: Option<u32>,
    ) -> bool {
        let Some(entry) = self.registry.get(id) else {
            return false;
        };
        let path = entry.display_path();

        let success = match entry.status() {
            EntryStatus::NotCached | EntryStatus::MemAllocFail => {
                self.begin_load(id, synchronous)
            }
            EntryStatus::Loading => {
                if cfg!(debug_assertions) {
                    self.emit(CacheEventKind::AlreadyLoading { path });
                }
                true
            }
            EntryStatus::Cached => true,
            EntryStatus::NotFound => {
                self.emit(CacheEventKind::CacheTargetMissing { path });
                false
            }
        };

        if let Some(entry) = self.registry.get_mut(id)
            && entry.is_use_counted()
            && entry.holds_block()
        {
            entry.use_count =
                use_count_override.unwrap_or_else(|| entry.use_count.saturating_add(1));
            entry.flags.set(EntryFlags::REMOVABLE, entry.use_count == 0);
        }

        success
    }

    fn begin_load(&mut self, id: FileEntryId, synchronous: bool) -> bool {
        let Some((size, alignment)) = self.registry.get(id).map(|e| (e.size, e.alignment)) else {
            return false;
        };

        let block = if self.fits(size) {
            self.allocate_block(size, alignment)
        } else {
            None
        };
        let Some(mut block) = block else {
            if let Some(entry) = self.registry.get_mut(id) {
                entry.state = EntryState::MemAllocFail;
                let path = entry.display_path();
                self.emit(CacheEventKind::OutOfMemory { path, size });
            }
            return false;
        };

        let stream = self.next_stream_id();
        let Some(entry) = self.registry.get_mut(id) else {
            self.arena.free(block);
            return false;
        };
        let path = entry.display_path();
        let request = ReadRequest {
            stream,
            entry: id,
            path: entry.path.clone(),
            buffer: block.lend(),
            priority: self.config.stream_priority,
            completions: self.completions_tx.clone(),
        };

        if let Err(err) = self.engine.start_read(request) {
            self.arena.free(block);
            entry.state = EntryState::NotCached;
            self.emit(CacheEventKind::StreamStartFailed {
                path,
                reason: err.to_string(),
            });
            return false;
        }

        entry.state = EntryState::Loading { stream, block };
        self.ledger.reserve(size);
        self.emit(CacheEventKind::StreamStarted { path, size });

        if synchronous {
            self.wait_for_stream(stream);
            return self
                .registry
                .get(id)
                .is_some_and(|e| e.status() == EntryStatus::Cached);
        }
        true
    }

    fn allocate_block(&mut self, size: u64, alignment: usize) -> Option<MemoryBlock> {
        if let Some(block) = self.arena.allocate(size, alignment) {
            return Some(block);
        }
        self.evict_all_removable();
        self.arena.allocate(size, alignment)
    }

    pub(crate) fn uncache_entry_internal(
        &mut self,
        id: FileEntryId,
        now: bool,
        ignore_use_count: bool,
    ) -> bool {
        let Some(entry) = self.registry.get_mut(id) else {
            return false;
        };

        entry.use_count = entry.use_count.saturating_sub(1);
        if entry.use_count >= 1 && !ignore_use_count {
            return false;
        }

        let path = entry.display_path();
        match entry.status() {
            EntryStatus::Cached => {
                if entry.is_use_counted() {
                    entry.flags.insert(EntryFlags::REMOVABLE);
                }
                if now || ignore_use_count {
                    self.uncache_file(id);
                }
            }
            EntryStatus::Loading => {
                self.emit(CacheEventKind::RemovingLoadingEntry { path });
                self.uncache_file(id);
            }
            EntryStatus::MemAllocFail => {
                entry.state = EntryState::NotCached;
                self.emit(CacheEventKind::ResettingMemAllocFail { path });
            }
            EntryStatus::NotCached | EntryStatus::NotFound => {}
        }
        true
    }

    /// Release whatever the entry holds and reset it to `NotCached`.
    ///
    /// An in-flight stream is aborted; its confirming completion is expected
    /// later and only logged.
    pub(crate) fn uncache_file(&mut self, id: FileEntryId) {
        let Some(entry) = self.registry.get_mut(id) else {
            return;
        };
        let path = entry.display_path();
        entry.flags.remove(EntryFlags::REMOVABLE);
        entry.use_count = 0;

        let block = match std::mem::replace(&mut entry.state, EntryState::NotCached) {
            EntryState::Loading { stream, block } => {
                self.engine.abort(stream);
                self.aborted.insert(stream, path.clone());
                block
            }
            EntryState::Cached { block, .. } => {
                self.backend.unregister_in_memory_file(&InMemoryFile {
                    file_name: &entry.file_name,
                    data: block.data(),
                    alignment: block.alignment(),
                    backend_data: entry.backend_data,
                });
                block
            }
            EntryState::NotFound => {
                entry.state = EntryState::NotFound;
                return;
            }
            EntryState::NotCached | EntryState::MemAllocFail => return,
        };

        let size = block.size();
        self.ledger.release(size);
        self.arena.free(block);
        self.emit(CacheEventKind::EntryUncached { path, size });
    }

    /// Apply every completion that has arrived, without blocking.
    ///
    /// Returns the number of completions processed.
    pub fn process_completions(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.finish_stream(completion);
            processed += 1;
        }
        processed
    }

    /// Block until `stream` has completed and been applied.
    ///
    /// Other completions arriving meanwhile are applied too.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an asynchronous runtime context, where
    /// blocking the thread is not allowed. Async callers run synchronous
    /// loads through `tokio::task::spawn_blocking`.
    pub fn wait_for_stream(&mut self, stream: StreamId) {
        if !self
            .registry
            .iter()
            .any(|e| e.pending_stream() == Some(stream))
        {
            return;
        }
        while let Some(completion) = self.completions_rx.blocking_recv() {
            let done = completion.stream == stream;
            self.finish_stream(completion);
            if done {
                break;
            }
        }
    }

    /// Block until no entry is loading and every abort has been confirmed.
    /// Returns the number of completions processed.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an asynchronous runtime context, like
    /// [`FileCacheManager::wait_for_stream`].
    pub fn wait_for_pending(&mut self) -> usize {
        let mut processed = 0;
        while self.registry.has_loading() || !self.aborted.is_empty() {
            let Some(completion) = self.completions_rx.blocking_recv() else {
                break;
            };
            self.finish_stream(completion);
            processed += 1;
        }
        processed + self.process_completions()
    }

    fn finish_stream(&mut self, completion: StreamCompletion) {
        let StreamCompletion {
            stream,
            entry: id,
            outcome,
        } = completion;

        if let Some(path) = self.aborted.remove(&stream) {
            self.emit(CacheEventKind::StreamAborted { path });
            return;
        }

        let Some(entry) = self.registry.get_mut(id) else {
            tracing::trace!(stream = stream.get(), entry = %id, "Completion for removed entry");
            return;
        };
        let path = entry.display_path();
        if entry.pending_stream() != Some(stream) {
            self.emit(CacheEventKind::StaleCompletion {
                path,
                stream: stream.get(),
            });
            return;
        }

        let mut block = match std::mem::replace(&mut entry.state, EntryState::NotCached) {
            EntryState::Loading { block, .. } => block,
            other => {
                entry.state = other;
                return;
            }
        };

        let failure = match outcome {
            StreamOutcome::Completed(buffer) => {
                if block.restore(buffer) {
                    self.backend.register_in_memory_file(&InMemoryFile {
                        file_name: &entry.file_name,
                        data: block.data(),
                        alignment: block.alignment(),
                        backend_data: entry.backend_data,
                    });
                    let size = block.size();
                    entry.state = EntryState::Cached {
                        block,
                        cached_at: Utc::now(),
                    };
                    self.emit(CacheEventKind::EntryCached { path, size });
                    return;
                }
                Some(ERROR_SIZE_OUT_OF_RANGE)
            }
            StreamOutcome::Aborted => None,
            StreamOutcome::Failed { code } => Some(code),
        };

        entry.flags.remove(EntryFlags::REMOVABLE);
        entry.use_count = 0;
        self.ledger.release(block.size());
        self.arena.free(block);
        match failure {
            Some(code) => self.emit(CacheEventKind::StreamFailed { path, code }),
            None => self.emit(CacheEventKind::StreamAborted { path }),
        }
    }
}
