//! File-backed slot: one JSON file under the data directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::store::StateSlot;
use crate::store::error::{StorageError, StorageResult};

/// Slot persisting the document as `<dir>/<key>.json`.
///
/// Every context on the machine opens the same path, which is what makes the
/// document shared: a save from one process is the next load of another.
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    /// Open a slot for `key` under `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>, key: &str) -> StorageResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| StorageError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: dir.join(format!("{key}.json")),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateSlot for FileSlot {
    fn load_raw(&self) -> StorageResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::ReadSlot {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save_raw(&self, raw: &str) -> StorageResult<()> {
        // Write to a sibling temp file and rename into place so a concurrent
        // load never observes a half-written document.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).map_err(|source| StorageError::WriteSlot {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StorageError::WriteSlot {
            path: self.path.clone(),
            source,
        })
    }

    fn clear(&self) -> StorageResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::RemoveSlot {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_slot_loads_none() {
        let dir = TempDir::new().unwrap();
        let slot = FileSlot::open(dir.path(), "gameState").unwrap();
        assert_eq!(slot.load_raw().unwrap(), None);
    }

    #[test]
    fn save_is_visible_to_a_second_handle_on_the_same_path() {
        let dir = TempDir::new().unwrap();
        let writer = FileSlot::open(dir.path(), "gameState").unwrap();
        let reader = FileSlot::open(dir.path(), "gameState").unwrap();

        writer.save_raw("{\"timerActive\":false}").unwrap();
        assert_eq!(
            reader.load_raw().unwrap().as_deref(),
            Some("{\"timerActive\":false}")
        );
    }

    #[test]
    fn clear_empties_the_slot_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let slot = FileSlot::open(dir.path(), "gameState").unwrap();

        slot.save_raw("{}").unwrap();
        slot.clear().unwrap();
        assert_eq!(slot.load_raw().unwrap(), None);

        // Clearing an already-empty slot is not an error.
        slot.clear().unwrap();
    }

    #[test]
    fn save_replaces_previous_contents_wholesale() {
        let dir = TempDir::new().unwrap();
        let slot = FileSlot::open(dir.path(), "gameState").unwrap();

        slot.save_raw("first").unwrap();
        slot.save_raw("second").unwrap();
        assert_eq!(slot.load_raw().unwrap().as_deref(), Some("second"));
    }
}
