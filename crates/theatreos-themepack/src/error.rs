// SPDX-License-Identifier: Apache-2.0
//! Theme-pack loading and binding failures.

use thiserror::Error;

/// A theme-pack failure: loading from disk, parsing, or binding to a theatre.
#[derive(Debug, Error)]
pub enum ThemePackError {
    /// No pack with this id exists under the packs directory.
    #[error("theme pack not found: {0}")]
    NotFound(String),

    /// The pack directory or file exists but isn't a recognized layout
    /// (neither a `manifest.json` directory nor a `.json` file).
    #[error("invalid theme pack format: {0}")]
    InvalidFormat(String),

    /// Reading a pack file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that failed to read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A pack file's JSON didn't parse or didn't match the expected shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// The file that failed to parse.
        path: String,
        /// Underlying JSON failure.
        #[source]
        source: serde_json::Error,
    },

    /// No theatre is bound to any pack yet, and no default pack is set.
    #[error("theatre {0} has no bound theme pack and no default is set")]
    NoBinding(String),
}

/// Shorthand result type for theme-pack operations.
pub type ThemePackResult<T> = Result<T, ThemePackError>;
