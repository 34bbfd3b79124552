//! Named preload requests and batch loading.

use super::FileCacheManager;
use crate::backend::AudioBackend;
use crate::entry::{DataScope, FileEntryId, PreloadRequestId};
use crate::manifest::{PreloadDefinition, PreloadManifest};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate result of a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    /// Every entry succeeded (or there was nothing to do).
    Success,
    /// Some entries succeeded, some failed.
    PartialSuccess,
    /// Every entry failed, or the request is unknown.
    Failure,
    /// The request was filtered out and nothing was attempted.
    Skipped,
}

impl RequestStatus {
    /// Whether the caller can rely on every entry being handled.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Skipped)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial success",
            Self::Failure => "failure",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
struct BatchOutcome {
    succeeded: usize,
    failed: usize,
}

impl BatchOutcome {
    fn record(&mut self, ok: bool) {
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    const fn status(&self) -> RequestStatus {
        match (self.succeeded, self.failed) {
            (_, 0) => RequestStatus::Success,
            (0, _) => RequestStatus::Failure,
            _ => RequestStatus::PartialSuccess,
        }
    }
}

/// A named, ordered set of file entries loaded and unloaded together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadRequest {
    /// Identifier derived from the name.
    pub id: PreloadRequestId,
    /// Authored name.
    pub name: String,
    /// Scope the request and its entries belong to.
    pub scope: DataScope,
    /// Whether the request loads automatically with its scope.
    pub auto_load: bool,
    /// Entries in authored order.
    pub file_ids: Vec<FileEntryId>,
}

impl<B: AudioBackend> FileCacheManager<B> {
    /// Register every file of `definition` and store the request.
    ///
    /// # Errors
    ///
    /// Returns an error if a request with the same name is already registered
    /// or if the backend rejects one of the files. Files registered before
    /// the failure stay registered under `scope`.
    pub fn register_preload(
        &mut self,
        definition: &PreloadDefinition,
        scope: DataScope,
    ) -> Result<PreloadRequestId> {
        let id = PreloadRequestId::from_name(&definition.name);
        if self.preloads.contains_key(&id) {
            return Err(Error::manifest(format!(
                "preload request {} is already registered",
                definition.name
            )));
        }

        let mut file_ids = Vec::with_capacity(definition.files.len());
        for node in &definition.files {
            file_ids.push(self.register(node, scope, definition.auto_load)?);
        }

        tracing::debug!(
            request = %definition.name,
            files = file_ids.len(),
            %scope,
            "Registered preload request"
        );
        self.preloads.insert(
            id,
            PreloadRequest {
                id,
                name: definition.name.clone(),
                scope,
                auto_load: definition.auto_load,
                file_ids,
            },
        );
        Ok(id)
    }

    /// Register every request of a manifest under `scope`.
    ///
    /// # Errors
    ///
    /// Stops at the first request that fails to register.
    pub fn register_manifest(
        &mut self,
        manifest: &PreloadManifest,
        scope: DataScope,
    ) -> Result<Vec<PreloadRequestId>> {
        manifest
            .requests
            .iter()
            .map(|definition| self.register_preload(definition, scope))
            .collect()
    }

    /// Look up a preload request.
    #[must_use]
    pub fn preload_request(&self, id: PreloadRequestId) -> Option<&PreloadRequest> {
        self.preloads.get(&id)
    }

    /// Look up a preload request by name, ignoring case.
    #[must_use]
    pub fn preload_request_by_name(&self, name: &str) -> Option<&PreloadRequest> {
        self.preload_request(PreloadRequestId::from_name(name))
    }

    /// All preload requests in registration order.
    pub fn preload_requests(&self) -> impl Iterator<Item = &PreloadRequest> {
        self.preloads.values()
    }

    /// Cache every entry of a request.
    ///
    /// With `auto_load_only`, requests that do not auto-load are skipped.
    /// Entries that are no longer registered are not counted.
    pub fn load_request(
        &mut self,
        id: PreloadRequestId,
        synchronous: bool,
        auto_load_only: bool,
    ) -> RequestStatus {
        let Some(request) = self.preloads.get(&id) else {
            return RequestStatus::Failure;
        };
        if auto_load_only && !request.auto_load {
            return RequestStatus::Skipped;
        }

        let file_ids = request.file_ids.clone();
        let mut outcome = BatchOutcome::default();
        for file_id in file_ids {
            if self.registry.contains(file_id) {
                outcome.record(self.cache_entry_internal(file_id, synchronous, None));
            }
        }
        outcome.status()
    }

    /// Drop one use of every entry of a request.
    pub fn unload_request(&mut self, id: PreloadRequestId) -> RequestStatus {
        let Some(request) = self.preloads.get(&id) else {
            return RequestStatus::Failure;
        };

        let file_ids = request.file_ids.clone();
        let mut outcome = BatchOutcome::default();
        for file_id in file_ids {
            if self.registry.contains(file_id) {
                outcome.record(self.uncache_entry_internal(file_id, false, false));
            }
        }
        outcome.status()
    }

    /// Tear down a scope: its entries and its preload requests.
    pub fn unload_by_scope(&mut self, scope: DataScope) -> RequestStatus {
        let status = self.unload_all_by_scope(scope);
        self.preloads.retain(|_, request| request.scope != scope);
        status
    }
}
