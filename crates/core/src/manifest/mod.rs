//! Preload manifests
//!
//! A manifest names groups of sound banks that are loaded and unloaded
//! together:
//!
//! ```toml
//! [[request]]
//! name = "global_ui"
//! autoLoad = true
//! files = [{ name = "ui.bank" }, { name = "vo_ui.bank", localized = true }]
//!
//! [[request]]
//! name = "boss_fight"
//! files = [{ name = "boss.bank", alignment = 32 }]
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One authored file reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileNode {
    /// File name relative to the backend location.
    pub name: String,
    /// Whether the file lives in the language specific directory.
    #[serde(default)]
    pub localized: bool,
    /// Alignment of the payload block, if the default does not fit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<usize>,
}

impl FileNode {
    /// A non-localized node with default alignment.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            localized: false,
            alignment: None,
        }
    }

    /// Mark the node localized.
    #[must_use]
    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    /// Override the block alignment.
    #[must_use]
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = Some(alignment);
        self
    }
}

/// A named preload request as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PreloadDefinition {
    /// Request name, unique within a manifest.
    pub name: String,
    /// Loaded automatically with its scope instead of on demand.
    #[serde(default)]
    pub auto_load: bool,
    /// Files in load order.
    #[serde(default)]
    pub files: Vec<FileNode>,
}

/// A parsed manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreloadManifest {
    /// Requests in authored order.
    #[serde(rename = "request", default)]
    pub requests: Vec<PreloadDefinition>,
}

impl PreloadManifest {
    /// Parse a manifest document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content).map_err(|e| Error::manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        Self::from_toml_str(&content)
    }

    /// Find a request by name (case-insensitive).
    #[must_use]
    pub fn request(&self, name: &str) -> Option<&PreloadDefinition> {
        self.requests
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for request in &self.requests {
            if request.name.trim().is_empty() {
                return Err(Error::manifest("request with an empty name"));
            }
            if !seen.insert(request.name.to_lowercase()) {
                return Err(Error::manifest(format!(
                    "request {} is defined twice",
                    request.name
                )));
            }
            if request.files.iter().any(|f| f.name.trim().is_empty()) {
                return Err(Error::manifest(format!(
                    "request {} has a file without a name",
                    request.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
        [[request]]
        name = "global_ui"
        autoLoad = true
        files = [{ name = "ui.bank" }, { name = "vo_ui.bank", localized = true }]

        [[request]]
        name = "boss_fight"
        files = [{ name = "boss.bank", alignment = 32 }]
    "#;

    #[test]
    fn test_parse_manifest() {
        let manifest = PreloadManifest::from_toml_str(MANIFEST).unwrap();
        assert_eq!(manifest.requests.len(), 2);

        let ui = &manifest.requests[0];
        assert!(ui.auto_load);
        assert_eq!(ui.files[0], FileNode::new("ui.bank"));
        assert_eq!(ui.files[1], FileNode::new("vo_ui.bank").localized());

        let boss = manifest.request("BOSS_FIGHT").unwrap();
        assert!(!boss.auto_load);
        assert_eq!(boss.files[0].alignment, Some(32));
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = PreloadManifest::from_toml_str("").unwrap();
        assert!(manifest.requests.is_empty());
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let err = PreloadManifest::from_toml_str(
            r#"
            [[request]]
            name = "a"
            [[request]]
            name = "A"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn test_unnamed_file_rejected() {
        let err = PreloadManifest::from_toml_str(
            r#"
            [[request]]
            name = "a"
            files = [{ name = "" }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = PreloadManifest::from_toml_str(
            r#"
            [[request]]
            name = "a"
            scope = "global"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
    }
}
