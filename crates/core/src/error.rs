//! Error types for the file cache

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for cache setup and bookkeeping.
///
/// Per-entry cache failures (missing file, out of memory, stream errors) are
/// not represented here: they are reported as statuses and events so a batch
/// never aborts half way.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// I/O error while touching the filesystem
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(bankcache::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "metadata")
        operation: String,
    },

    /// Configuration or validation error
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(bankcache::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Preload manifest could not be parsed
    #[error("Invalid preload manifest: {message}")]
    #[diagnostic(
        code(bankcache::manifest),
        help("Manifests are TOML files with one [[request]] table per preload request")
    )]
    Manifest {
        /// Parser message
        message: String,
    },

    /// The audio backend rejected a file entry
    #[error("Audio backend rejected file entry {name}: {message}")]
    #[diagnostic(code(bankcache::backend))]
    Backend {
        /// Name of the file node being parsed
        name: String,
        /// Backend supplied reason
        message: String,
    },

    /// The stream engine refused to start a read
    #[error("Failed to start streaming {path}: {message}")]
    #[diagnostic(code(bankcache::stream))]
    Stream {
        /// Path of the requested file
        path: String,
        /// Engine supplied reason
        message: String,
    },

    /// Preload request id is unknown
    #[error("Unknown preload request: {name}")]
    #[diagnostic(
        code(bankcache::unknown_request),
        help("Register the manifest that defines this request first")
    )]
    UnknownRequest {
        /// Request name as given by the caller
        name: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a manifest error
    #[must_use]
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest {
            message: msg.into(),
        }
    }

    /// Create a backend error
    #[must_use]
    pub fn backend(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Backend {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a stream start error
    #[must_use]
    pub fn stream(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Stream {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Create an unknown request error
    #[must_use]
    pub fn unknown_request(name: impl Into<String>) -> Self {
        Self::UnknownRequest { name: name.into() }
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, Error>;
