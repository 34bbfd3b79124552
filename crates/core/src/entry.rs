//! File entry model: identifiers, scopes, flags and the per-entry state machine.

use crate::arena::MemoryBlock;
use crate::backend::BackendData;
use crate::stream::StreamId;
use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

fn string_id(value: &str) -> u64 {
    let digest = Sha256::digest(value.to_lowercase().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Stable identifier of a file entry, derived from its normalized path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileEntryId(u64);

impl FileEntryId {
    /// Derive the id for a normalized path. Case does not matter.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        Self(string_id(&path.to_string_lossy()))
    }

    /// Raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Stable identifier of a preload request, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PreloadRequestId(u64);

impl PreloadRequestId {
    /// Derive the id for a request name. Case does not matter.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(string_id(name))
    }
}

impl fmt::Display for PreloadRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Join a backend location with a file name into the path the cache reads.
///
/// Separators in the file name are made native. Case is kept as authored so
/// the path still resolves on case-sensitive filesystems; only the
/// [`FileEntryId`] derived from it ignores case.
#[must_use]
pub fn normalize_path(location: &Path, file_name: &str) -> PathBuf {
    let name: String = file_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { MAIN_SEPARATOR } else { c })
        .collect();
    location.join(name.trim_start_matches(MAIN_SEPARATOR))
}

/// Lifetime domain of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataScope {
    /// Survives level changes.
    Global,
    /// Torn down when the level unloads.
    LevelSpecific,
}

impl fmt::Display for DataScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::LevelSpecific => f.write_str("level-specific"),
        }
    }
}

bitflags! {
    /// Flags orthogonal to [`EntryStatus`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EntryFlags: u8 {
        /// Path depends on the active language.
        const LOCALIZED = 1 << 0;
        /// Lifetime governed by the use count.
        const USE_COUNTED = 1 << 1;
        /// Cached with zero uses; may be evicted.
        const REMOVABLE = 1 << 2;
        /// Upgraded to auto loading; level teardown restores manual loading.
        const NEEDS_RESET_TO_MANUAL_LOADING = 1 << 3;
    }
}

/// Observable state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryStatus {
    /// Known and present on disk, not resident.
    NotCached,
    /// A read is in flight.
    Loading,
    /// Resident in the cache heap.
    Cached,
    /// The file did not exist when the entry was resolved.
    NotFound,
    /// The last cache attempt could not get memory.
    MemAllocFail,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotCached => "not cached",
            Self::Loading => "loading",
            Self::Cached => "cached",
            Self::NotFound => "not found",
            Self::MemAllocFail => "mem alloc fail",
        };
        f.write_str(s)
    }
}

/// State with the resources each state owns.
///
/// The memory block lives inside `Loading` and `Cached` only, so an entry can
/// never hold a block in any other state.
#[derive(Debug)]
pub(crate) enum EntryState {
    NotCached,
    Loading {
        stream: StreamId,
        block: MemoryBlock,
    },
    Cached {
        block: MemoryBlock,
        cached_at: DateTime<Utc>,
    },
    NotFound,
    MemAllocFail,
}

impl EntryState {
    pub(crate) const fn status(&self) -> EntryStatus {
        match self {
            Self::NotCached => EntryStatus::NotCached,
            Self::Loading { .. } => EntryStatus::Loading,
            Self::Cached { .. } => EntryStatus::Cached,
            Self::NotFound => EntryStatus::NotFound,
            Self::MemAllocFail => EntryStatus::MemAllocFail,
        }
    }
}

/// One cacheable file.
#[derive(Debug)]
pub struct FileEntry {
    pub(crate) id: FileEntryId,
    pub(crate) path: PathBuf,
    pub(crate) file_name: String,
    pub(crate) size: u64,
    pub(crate) alignment: usize,
    pub(crate) scope: DataScope,
    pub(crate) flags: EntryFlags,
    pub(crate) use_count: u32,
    pub(crate) backend_data: BackendData,
    pub(crate) state: EntryState,
}

impl FileEntry {
    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> FileEntryId {
        self.id
    }

    /// Normalized path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name as authored and handed to the backend.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Size on disk. Zero for entries whose file was not found.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Alignment the backend wants for the memory block.
    #[must_use]
    pub const fn alignment(&self) -> usize {
        self.alignment
    }

    /// Scope the entry was registered under.
    #[must_use]
    pub const fn scope(&self) -> DataScope {
        self.scope
    }

    /// Current flags.
    #[must_use]
    pub const fn flags(&self) -> EntryFlags {
        self.flags
    }

    /// Current use count. Only meaningful for use-counted entries.
    #[must_use]
    pub const fn use_count(&self) -> u32 {
        self.use_count
    }

    /// Current state.
    #[must_use]
    pub const fn status(&self) -> EntryStatus {
        self.state.status()
    }

    /// Opaque backend handle.
    #[must_use]
    pub const fn backend_data(&self) -> BackendData {
        self.backend_data
    }

    /// In-flight stream, if loading.
    #[must_use]
    pub const fn pending_stream(&self) -> Option<StreamId> {
        match &self.state {
            EntryState::Loading { stream, .. } => Some(*stream),
            _ => None,
        }
    }

    /// When the entry became resident.
    #[must_use]
    pub const fn cached_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            EntryState::Cached { cached_at, .. } => Some(*cached_at),
            _ => None,
        }
    }

    /// Resident payload.
    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        match &self.state {
            EntryState::Cached { block, .. } => Some(block.data()),
            _ => None,
        }
    }

    /// Whether the entry holds a memory block (loading or cached).
    #[must_use]
    pub const fn holds_block(&self) -> bool {
        matches!(
            self.state,
            EntryState::Loading { .. } | EntryState::Cached { .. }
        )
    }

    pub(crate) fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    pub(crate) const fn is_use_counted(&self) -> bool {
        self.flags.contains(EntryFlags::USE_COUNTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_is_case_insensitive() {
        let a = FileEntryId::from_path(Path::new("banks/SFX/UI.bank"));
        let b = FileEntryId::from_path(Path::new("banks/sfx/ui.bank"));
        assert_eq!(a, b);
        assert_ne!(a, FileEntryId::from_path(Path::new("banks/sfx/music.bank")));
    }

    #[test]
    fn test_request_id_from_name() {
        assert_eq!(
            PreloadRequestId::from_name("Level1"),
            PreloadRequestId::from_name("level1")
        );
        assert_ne!(
            PreloadRequestId::from_name("level1"),
            PreloadRequestId::from_name("level2")
        );
    }

    #[test]
    fn test_normalize_path_keeps_case() {
        let path = normalize_path(Path::new("/Data/Banks"), "SFX/Ui.Bank");
        let expected: PathBuf = ["/Data/Banks", "SFX", "Ui.Bank"].iter().collect();
        assert_eq!(path, expected);
        assert_eq!(
            FileEntryId::from_path(&path),
            FileEntryId::from_path(Path::new("/data/banks/sfx/ui.bank"))
        );
    }

    #[test]
    fn test_normalize_path_converts_separators() {
        let path = normalize_path(Path::new("root"), "a\\b\\c.bank");
        let expected: PathBuf = ["root", "a", "b", "c.bank"].iter().collect();
        assert_eq!(path, expected);
    }

    #[test]
    fn test_id_display_is_fixed_width_hex() {
        let id = FileEntryId::from_path(Path::new("x.bank"));
        assert_eq!(id.to_string().len(), 16);
    }

    #[test]
    fn test_scope_serde_names() {
        let json = serde_json::to_string(&DataScope::LevelSpecific).unwrap();
        assert_eq!(json, "\"level-specific\"");
    }
}
