//! Persistence backends: the shared document slot and the photo store.
//!
//! A [`StateSlot`] holds exactly one serialized game document under the
//! well-known key every context on the machine agrees on. Reads and writes
//! are synchronous so callers observe their own writes immediately.

pub mod error;
pub mod file;
pub mod memory;
pub mod photos;

pub use error::{StorageError, StorageResult};
pub use file::FileSlot;
pub use memory::MemorySlot;

/// Key the replicated game document lives under, shared by every context.
pub const GAME_DOCUMENT_KEY: &str = "gameState";

/// Synchronous single-document storage shared by all contexts on a machine.
///
/// Implementations must make a completed [`save_raw`](Self::save_raw) visible
/// to every subsequent [`load_raw`](Self::load_raw), including loads issued
/// from other contexts backed by the same slot. Torn reads are not allowed:
/// a load returns either a previously completed write or nothing.
pub trait StateSlot: Send + Sync {
    /// Read the raw serialized document, or `None` when the slot is empty.
    fn load_raw(&self) -> StorageResult<Option<String>>;

    /// Replace the slot contents with `raw`.
    fn save_raw(&self, raw: &str) -> StorageResult<()>;

    /// Empty the slot so subsequent loads return `None`.
    fn clear(&self) -> StorageResult<()>;
}
