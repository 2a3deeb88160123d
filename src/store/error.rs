//! Error types shared by the persistence backends.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result alias returning [`StorageError`] failures.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures that can occur while persisting game data on disk.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A data directory could not be created.
    #[error("failed to create data directory `{}`", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The slot file exists but could not be read.
    #[error("failed to read slot file `{}`", path.display())]
    ReadSlot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The slot file could not be written or replaced.
    #[error("failed to write slot file `{}`", path.display())]
    WriteSlot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The slot file could not be removed.
    #[error("failed to remove slot file `{}`", path.display())]
    RemoveSlot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Serializing the game document before a save failed.
    #[error("failed to encode game document")]
    EncodeDocument {
        #[source]
        source: serde_json::Error,
    },
    /// A photo file could not be written.
    #[error("failed to write photo `{}`", path.display())]
    WritePhoto {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A photo file exists but could not be read.
    #[error("failed to read photo `{}`", path.display())]
    ReadPhoto {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A photo file could not be removed.
    #[error("failed to remove photo `{}`", path.display())]
    RemovePhoto {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A photo directory could not be listed.
    #[error("failed to list photo directory `{}`", path.display())]
    ListPhotos {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
