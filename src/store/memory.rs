//! In-memory slot used by tests and demos that run several contexts in one
//! process.

use std::sync::{Arc, Mutex, PoisonError};

use crate::store::StateSlot;
use crate::store::error::StorageResult;

/// Slot backed by a shared in-process cell.
///
/// Clones share the same cell, so handing clones of one `MemorySlot` to
/// several contexts models them living on the same machine.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    cell: Arc<Mutex<Option<String>>>,
}

impl MemorySlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateSlot for MemorySlot {
    fn load_raw(&self) -> StorageResult<Option<String>> {
        let cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cell.clone())
    }

    fn save_raw(&self, raw: &str) -> StorageResult<()> {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        *cell = Some(raw.to_owned());
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        *cell = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_contents() {
        let a = MemorySlot::new();
        let b = a.clone();

        a.save_raw("shared").unwrap();
        assert_eq!(b.load_raw().unwrap().as_deref(), Some("shared"));

        b.clear().unwrap();
        assert_eq!(a.load_raw().unwrap(), None);
    }

    #[test]
    fn fresh_slots_are_independent() {
        let a = MemorySlot::new();
        let b = MemorySlot::new();

        a.save_raw("mine").unwrap();
        assert_eq!(b.load_raw().unwrap(), None);
    }
}
