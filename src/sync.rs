//! Cross-context plumbing for the shared document slot.
//!
//! Several contexts (host console, stage display, spectator view) run against
//! one machine-local slot. A [`SharedSlot`] pairs the slot with a broadcast
//! bus announcing completed writes, tagged with the writer's [`ContextId`] so
//! subscribers can drop their own echoes. Contexts outside the process miss
//! bus traffic, which is why consumers also poll the slot and reconcile.

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::store::{StateSlot, StorageResult};

/// Identity of one running context on this machine.
///
/// Fresh per construction. Two hubs never share one, even inside a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Mint a new context identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Announcement that a context finished writing the slot.
#[derive(Debug, Clone)]
pub struct SlotWrite {
    /// Context that performed the write.
    pub writer: ContextId,
    /// Raw slot contents after the write; `None` when the slot was cleared.
    pub raw: Option<Arc<str>>,
}

/// The document slot plus the bus announcing writes to it.
///
/// Clones share both halves. Every mutation goes through [`save`](Self::save)
/// or [`clear`](Self::clear) so the slot is durably updated before anyone
/// hears about the change.
#[derive(Clone)]
pub struct SharedSlot {
    slot: Arc<dyn StateSlot>,
    bus: broadcast::Sender<SlotWrite>,
}

impl SharedSlot {
    /// Wrap `slot` with a write bus of the given capacity.
    pub fn new(slot: Arc<dyn StateSlot>, bus_capacity: usize) -> Self {
        let (bus, _receiver) = broadcast::channel(bus_capacity);
        Self { slot, bus }
    }

    /// Read the raw document, or `None` when the slot is empty.
    pub fn load(&self) -> StorageResult<Option<String>> {
        self.slot.load_raw()
    }

    /// Persist `raw`, then announce the write as coming from `writer`.
    pub fn save(&self, writer: ContextId, raw: Arc<str>) -> StorageResult<()> {
        self.slot.save_raw(&raw)?;
        self.announce(SlotWrite {
            writer,
            raw: Some(raw),
        });
        Ok(())
    }

    /// Empty the slot, then announce the removal as coming from `writer`.
    pub fn clear(&self, writer: ContextId) -> StorageResult<()> {
        self.slot.clear()?;
        self.announce(SlotWrite { writer, raw: None });
        Ok(())
    }

    /// Register for write announcements made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SlotWrite> {
        self.bus.subscribe()
    }

    /// Send an announcement to all current subscribers, ignoring delivery
    /// errors from contexts that have gone away.
    fn announce(&self, write: SlotWrite) {
        let _ = self.bus.send(write);
    }
}
