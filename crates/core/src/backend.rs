//! Platform capabilities the cache consumes: the audio backend and the filesystem.

use crate::manifest::FileNode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Alignment used when a file node does not ask for one.
pub const DEFAULT_BLOCK_ALIGNMENT: usize = 16;

/// Opaque per-entry handle owned by the backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct BackendData(pub u64);

/// What the backend extracted from a file node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileEntry {
    /// Directory the file lives in.
    pub location: PathBuf,
    /// File name relative to `location`.
    pub file_name: String,
    /// Whether the location depends on the active language.
    pub localized: bool,
    /// Alignment the payload block needs.
    pub alignment: usize,
    /// Backend handle. Must be released through `delete_file_entry`.
    pub data: BackendData,
}

/// Input for re-resolving the directory of an existing entry.
#[derive(Debug, Clone, Copy)]
pub struct LocationQuery<'a> {
    /// File name of the entry.
    pub file_name: &'a str,
    /// Whether the entry is localized.
    pub localized: bool,
    /// Backend handle of the entry.
    pub data: BackendData,
}

/// A resident payload announced to (or withdrawn from) the backend.
#[derive(Debug, Clone, Copy)]
pub struct InMemoryFile<'a> {
    /// File name of the entry.
    pub file_name: &'a str,
    /// Payload bytes.
    pub data: &'a [u8],
    /// Alignment of the payload block.
    pub alignment: usize,
    /// Backend handle of the entry.
    pub backend_data: BackendData,
}

/// Audio middleware integration point.
pub trait AudioBackend: Send {
    /// Extract location and metadata from an authored file node.
    fn parse_file_entry(&mut self, node: &FileNode) -> Result<ParsedFileEntry>;

    /// Directory an entry currently resolves to.
    fn file_location(&self, query: &LocationQuery<'_>) -> PathBuf;

    /// Release the backend handle of an entry.
    fn delete_file_entry(&mut self, data: BackendData);

    /// A payload finished loading and may be used by the middleware.
    fn register_in_memory_file(&mut self, file: &InMemoryFile<'_>);

    /// A payload is about to be released.
    fn unregister_in_memory_file(&mut self, file: &InMemoryFile<'_>);
}

/// Backend for banks laid out in a directory tree.
///
/// Plain banks resolve to `<root>`, localized banks to
/// `<root>/localized/<language>`.
#[derive(Debug)]
pub struct DirectoryBackend {
    root: PathBuf,
    language: String,
    next_data: u64,
    live: BTreeSet<BackendData>,
    in_memory: BTreeMap<BackendData, (String, usize)>,
}

impl DirectoryBackend {
    /// Create a backend rooted at `root` with the given language.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            language: language.into(),
            next_data: 1,
            live: BTreeSet::new(),
            in_memory: BTreeMap::new(),
        }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Active language.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Switch language. Callers refresh localized entries afterwards.
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    /// Number of handles not yet deleted.
    #[must_use]
    pub fn live_entries(&self) -> usize {
        self.live.len()
    }

    /// Names of payloads currently registered as in-memory files.
    #[must_use]
    pub fn in_memory_files(&self) -> Vec<String> {
        let mut names: Vec<String> = self.in_memory.values().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    /// Whether a payload with this file name is registered.
    #[must_use]
    pub fn is_in_memory(&self, file_name: &str) -> bool {
        self.in_memory.values().any(|(n, _)| n == file_name)
    }

    fn localized_dir(&self) -> PathBuf {
        self.root.join("localized").join(&self.language)
    }
}

impl AudioBackend for DirectoryBackend {
    fn parse_file_entry(&mut self, node: &FileNode) -> Result<ParsedFileEntry> {
        if node.name.trim().is_empty() {
            return Err(Error::backend(&node.name, "file node has no name"));
        }
        let alignment = node.alignment.unwrap_or(DEFAULT_BLOCK_ALIGNMENT);
        if !alignment.is_power_of_two() {
            return Err(Error::backend(
                &node.name,
                format!("alignment {alignment} is not a power of two"),
            ));
        }

        let data = BackendData(self.next_data);
        self.next_data += 1;
        self.live.insert(data);

        let location = if node.localized {
            self.localized_dir()
        } else {
            self.root.clone()
        };

        Ok(ParsedFileEntry {
            location,
            file_name: node.name.clone(),
            localized: node.localized,
            alignment,
            data,
        })
    }

    fn file_location(&self, query: &LocationQuery<'_>) -> PathBuf {
        if query.localized {
            self.localized_dir()
        } else {
            self.root.clone()
        }
    }

    fn delete_file_entry(&mut self, data: BackendData) {
        self.live.remove(&data);
        self.in_memory.remove(&data);
    }

    fn register_in_memory_file(&mut self, file: &InMemoryFile<'_>) {
        self.in_memory.insert(
            file.backend_data,
            (file.file_name.to_string(), file.data.len()),
        );
    }

    fn unregister_in_memory_file(&mut self, file: &InMemoryFile<'_>) {
        self.in_memory.remove(&file.backend_data);
    }
}

/// Filesystem queries the cache makes.
pub trait FileSystem: Send + Sync {
    /// Size of the file at `path`. Zero when it does not exist.
    fn file_size(&self, path: &Path) -> u64;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn file_size(&self, path: &Path) -> u64 {
        std::fs::metadata(path)
            .ok()
            .filter(std::fs::Metadata::is_file)
            .map_or(0, |m| m.len())
    }
}

/// A filesystem made of registered sizes. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFileSystem {
    files: Arc<RwLock<HashMap<PathBuf, u64>>>,
}

impl InMemoryFileSystem {
    /// Create an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or resize a file.
    pub fn insert(&self, path: impl Into<PathBuf>, size: u64) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), size);
        }
    }

    /// Delete a file.
    pub fn remove(&self, path: &Path) {
        if let Ok(mut files) = self.files.write() {
            files.remove(path);
        }
    }
}

impl FileSystem for InMemoryFileSystem {
    fn file_size(&self, path: &Path) -> u64 {
        self.files
            .read()
            .ok()
            .and_then(|files| files.get(path).copied())
            .unwrap_or(0)
    }
}
