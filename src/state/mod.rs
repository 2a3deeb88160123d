//! Per-context state authority: the hub owning the replicated document.

pub mod feed;
pub mod game;
pub mod wheel;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

pub use self::feed::SnapshotFeed;
pub use self::game::{DEFAULT_ROUND_SECS, GamePatch, GameState, PhotoId, Player, PlayerId};
pub use self::wheel::{SpinError, SpinPlan, WheelMachine, WheelPhase};
use crate::store::{StorageError, StorageResult};
use crate::sync::{ContextId, SharedSlot};

/// Hub handle shared across the tasks of one context.
pub type SharedHub = Arc<StateHub>;

/// What the hub currently believes the document to be.
struct HubCache {
    snapshot: GameState,
    /// Raw slot contents the snapshot was parsed from. `None` when the slot
    /// was empty (or never read). Used to skip re-parsing unchanged contents
    /// and to recognize this context's own writes on the poll path.
    last_raw: Option<Arc<str>>,
}

/// Per-context authority over the shared game document.
///
/// All document operations are synchronous: a completed call means the slot
/// already holds the new value, so a context always observes its own writes.
/// Cross-context visibility arrives through the write bus and the poll loop
/// spawned by [`spawn_watcher`](Self::spawn_watcher).
pub struct StateHub {
    context: ContextId,
    shared: SharedSlot,
    cache: Mutex<HubCache>,
    feed: SnapshotFeed,
}

impl StateHub {
    /// Build a hub for one context on top of the shared slot.
    pub fn new(context: ContextId, shared: SharedSlot, feed_capacity: usize) -> SharedHub {
        Arc::new(Self {
            context,
            shared,
            cache: Mutex::new(HubCache {
                snapshot: GameState::initial(),
                last_raw: None,
            }),
            feed: SnapshotFeed::new(feed_capacity),
        })
    }

    /// Identity of the context this hub belongs to.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// The freshest known snapshot.
    ///
    /// Re-reads the slot on every call rather than trusting the cache:
    /// another context may have written since the last notification arrived.
    pub fn current(&self) -> GameState {
        let mut cache = self.lock_cache();
        self.reconcile(&mut cache);
        cache.snapshot.clone()
    }

    /// Merge `patch` over the freshest snapshot and persist the result.
    ///
    /// On persist failure nothing is cached or published; the caller retries
    /// by re-issuing the action. Interleaved writes from other contexts
    /// resolve as last-writer-wins on the whole document.
    pub fn update(&self, patch: GamePatch) -> StorageResult<GameState> {
        self.update_with(|_| patch)
    }

    /// Register `name` as a new player and return the created record.
    pub fn add_player(
        &self,
        name: impl Into<String>,
        city: impl Into<String>,
        question_count: u32,
    ) -> StorageResult<Player> {
        let player = Player {
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            city: city.into(),
            photo_ids: Vec::new(),
            question_count,
        };
        let created = player.clone();
        self.update_with(move |state| {
            let mut players = state.players.clone();
            players.push(player);
            GamePatch::roster(players)
        })?;
        Ok(created)
    }

    /// Replace the roster entry matching `player.id`.
    ///
    /// Leaves the roster unchanged when the id is unknown; the player may
    /// have been deleted by another context in the meantime.
    pub fn update_player(&self, player: Player) -> StorageResult<GameState> {
        self.update_with(move |state| {
            let mut players = state.players.clone();
            match players.iter_mut().find(|p| p.id == player.id) {
                Some(entry) => *entry = player,
                None => {
                    debug!(player = %player.id, "update for unknown player ignored");
                    return GamePatch::default();
                }
            }
            GamePatch::roster(players)
        })
    }

    /// Remove the roster entry with `id`, when present.
    pub fn delete_player(&self, id: PlayerId) -> StorageResult<GameState> {
        self.update_with(move |state| {
            let mut players = state.players.clone();
            players.retain(|p| p.id != id);
            GamePatch::roster(players)
        })
    }

    /// Decrease the player's remaining question count, flooring at zero.
    pub fn decrement_questions(&self, id: PlayerId) -> StorageResult<GameState> {
        self.update_with(move |state| {
            let mut players = state.players.clone();
            if let Some(player) = players.iter_mut().find(|p| p.id == id) {
                player.question_count = player.question_count.saturating_sub(1);
            }
            GamePatch::roster(players)
        })
    }

    /// Write the selection pair as a unit.
    pub fn set_selection(
        &self,
        player: Option<PlayerId>,
        photo: Option<PhotoId>,
    ) -> StorageResult<GameState> {
        self.update(GamePatch::selection(player, photo))
    }

    /// Set both score counters.
    pub fn set_scores(&self, knowledge: u32, viewer: u32) -> StorageResult<GameState> {
        self.update(GamePatch {
            knowledge_score: Some(knowledge),
            viewer_score: Some(viewer),
            ..GamePatch::default()
        })
    }

    /// Erase the durable record and return every context to the initial
    /// state. Other contexts converge through the cleared-slot announcement
    /// or their next poll.
    pub fn reset(&self) -> StorageResult<GameState> {
        let mut cache = self.lock_cache();
        self.shared.clear(self.context)?;
        cache.snapshot = GameState::initial();
        cache.last_raw = None;
        self.feed.publish(cache.snapshot.clone());
        Ok(cache.snapshot.clone())
    }

    /// Register for snapshots published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<GameState> {
        self.feed.subscribe()
    }

    /// Stream of snapshots starting with the current value.
    ///
    /// Subscribes before reading so no change between the two is lost. A
    /// consumer that falls behind skips intermediate snapshots and resumes
    /// with newer ones; every delivered document is complete.
    pub fn snapshots(&self) -> impl Stream<Item = GameState> + Send + 'static {
        let mut rx = self.subscribe();
        let first = self.current();

        // Forwarder task between the broadcast feed and the consumer; ends
        // when either side goes away.
        let (tx, out) = mpsc::channel(8);
        tokio::spawn(async move {
            if tx.send(first).await.is_err() {
                return;
            }
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    event = rx.recv() => match event {
                        Ok(snapshot) => {
                            if tx.send(snapshot).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "snapshot consumer lagged, resuming with newer values");
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
        ReceiverStream::new(out)
    }

    /// Spawn the task keeping this hub in sync with writes made by other
    /// contexts: bus announcements for same-process neighbors, slot polling
    /// for everyone else. The task stops when the hub is dropped.
    pub fn spawn_watcher(self: &Arc<Self>, poll_interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let mut bus = self.shared.subscribe();
        let context = self.context;

        tokio::spawn(async move {
            let mut poll = tokio::time::interval(poll_interval);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    event = bus.recv() => match event {
                        Ok(write) => {
                            // Own writes already went through the local cache.
                            if write.writer == context {
                                continue;
                            }
                            let Some(hub) = weak.upgrade() else { break };
                            hub.absorb_remote(write.raw);
                        }
                        Err(RecvError::Lagged(_)) => {
                            // Missed announcements; the next poll re-reads the
                            // slot, which always holds the latest document.
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = poll.tick() => {
                        let Some(hub) = weak.upgrade() else { break };
                        let mut cache = hub.lock_cache();
                        hub.reconcile(&mut cache);
                    }
                }
            }
            debug!(%context, "slot watcher stopped");
        })
    }

    /// One serialized read-modify-write cycle: reconcile with the slot,
    /// derive a patch from the fresh snapshot, persist, publish.
    ///
    /// Holding the cache lock across the whole cycle gives within-context
    /// atomicity; races with other contexts stay last-writer-wins.
    fn update_with<F>(&self, make_patch: F) -> StorageResult<GameState>
    where
        F: FnOnce(&GameState) -> GamePatch,
    {
        let mut cache = self.lock_cache();
        self.reconcile(&mut cache);

        let next = make_patch(&cache.snapshot).apply(cache.snapshot.clone());
        let raw: Arc<str> = serde_json::to_string(&next)
            .map_err(|source| StorageError::EncodeDocument { source })?
            .into();

        self.shared.save(self.context, Arc::clone(&raw))?;
        cache.snapshot = next.clone();
        cache.last_raw = Some(raw);
        self.feed.publish(next.clone());
        Ok(next)
    }

    /// Take the announced raw document as the new authoritative value.
    fn absorb_remote(&self, raw: Option<Arc<str>>) {
        let mut cache = self.lock_cache();
        self.install(&mut cache, raw);
    }

    /// Re-read the slot and fold any unseen contents into the cache.
    fn reconcile(&self, cache: &mut HubCache) {
        let raw = match self.shared.load() {
            Ok(raw) => raw.map(Arc::<str>::from),
            Err(err) => {
                warn!(error = %err, "slot read failed, serving cached snapshot");
                return;
            }
        };
        if raw.as_deref() == cache.last_raw.as_deref() {
            return;
        }
        self.install(cache, raw);
    }

    /// Replace the cached document with `raw`, publishing when it changed.
    ///
    /// An empty slot yields the initial state. Contents that fail to parse
    /// keep the last good snapshot; the bad value is remembered so it is
    /// logged once, not on every read.
    fn install(&self, cache: &mut HubCache, raw: Option<Arc<str>>) {
        let next = match &raw {
            Some(contents) => match serde_json::from_str::<GameState>(contents) {
                Ok(state) => state,
                Err(err) => {
                    warn!(error = %err, "ignoring unparsable game document");
                    cache.last_raw = raw;
                    return;
                }
            },
            None => GameState::initial(),
        };

        cache.last_raw = raw;
        if cache.snapshot != next {
            cache.snapshot = next.clone();
            self.feed.publish(next);
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HubCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySlot;
    use futures::StreamExt;

    fn hub_pair() -> (SharedHub, SharedHub) {
        let slot = Arc::new(MemorySlot::new());
        let shared = SharedSlot::new(slot, 16);
        let a = StateHub::new(ContextId::new(), shared.clone(), 16);
        let b = StateHub::new(ContextId::new(), shared, 16);
        (a, b)
    }

    fn single_hub() -> SharedHub {
        let shared = SharedSlot::new(Arc::new(MemorySlot::new()), 16);
        StateHub::new(ContextId::new(), shared, 16)
    }

    #[test]
    fn empty_slot_reads_as_initial_state() {
        let hub = single_hub();
        assert_eq!(hub.current(), GameState::initial());
    }

    #[test]
    fn update_is_immediately_visible_to_a_sibling_hub() {
        let (a, b) = hub_pair();

        a.set_scores(3, 1).unwrap();

        // No watcher is running; b still sees the write because current()
        // re-reads the slot.
        let seen = b.current();
        assert_eq!(seen.knowledge_score, 3);
        assert_eq!(seen.viewer_score, 1);
    }

    #[test]
    fn add_player_returns_the_created_record() {
        let hub = single_hub();
        let player = hub.add_player("Anna", "Riga", 3).unwrap();

        let state = hub.current();
        assert_eq!(state.players.len(), 1);
        assert_eq!(state.players[0], player);
        assert_eq!(player.question_count, 3);
        assert!(player.photo_ids.is_empty());
    }

    #[test]
    fn update_player_for_unknown_id_changes_nothing() {
        let hub = single_hub();
        hub.add_player("Anna", "Riga", 3).unwrap();
        let before = hub.current();

        let ghost = Player {
            id: uuid::Uuid::new_v4(),
            name: "Ghost".into(),
            city: String::new(),
            photo_ids: Vec::new(),
            question_count: 1,
        };
        hub.update_player(ghost).unwrap();

        assert_eq!(hub.current(), before);
    }

    #[test]
    fn decrement_questions_floors_at_zero() {
        let hub = single_hub();
        let player = hub.add_player("Anna", "Riga", 1).unwrap();

        hub.decrement_questions(player.id).unwrap();
        hub.decrement_questions(player.id).unwrap();

        let state = hub.current();
        assert_eq!(state.players[0].question_count, 0);
    }

    #[test]
    fn delete_player_tolerates_absent_ids() {
        let hub = single_hub();
        let player = hub.add_player("Anna", "Riga", 2).unwrap();

        hub.delete_player(player.id).unwrap();
        hub.delete_player(player.id).unwrap();
        assert!(hub.current().players.is_empty());
    }

    #[test]
    fn reset_erases_the_durable_record() {
        let (a, b) = hub_pair();
        a.add_player("Anna", "Riga", 2).unwrap();
        a.set_scores(5, 5).unwrap();

        a.reset().unwrap();

        assert_eq!(a.current(), GameState::initial());
        assert_eq!(b.current(), GameState::initial());
    }

    #[test]
    fn unparsable_document_keeps_the_last_good_snapshot() {
        let slot = Arc::new(MemorySlot::new());
        let shared = SharedSlot::new(slot.clone(), 16);
        let hub = StateHub::new(ContextId::new(), shared, 16);

        hub.set_scores(7, 2).unwrap();

        use crate::store::StateSlot;
        slot.save_raw("{ not json").unwrap();

        let state = hub.current();
        assert_eq!(state.knowledge_score, 7);
    }

    #[tokio::test]
    async fn snapshots_yield_the_current_value_first() {
        let hub = single_hub();
        hub.set_scores(4, 0).unwrap();

        let mut stream = Box::pin(hub.snapshots());
        let first = stream.next().await.unwrap();
        assert_eq!(first.knowledge_score, 4);

        hub.set_scores(5, 0).unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(second.knowledge_score, 5);
    }

    #[tokio::test]
    async fn watcher_delivers_remote_writes_without_polling() {
        let (a, b) = hub_pair();
        let _watcher = b.spawn_watcher(Duration::from_secs(3600));
        let mut feed = b.subscribe();

        a.add_player("Alice", "Riga", 3).unwrap();

        let seen = feed.recv().await.unwrap();
        assert_eq!(seen.players.len(), 1);
        assert_eq!(seen.players[0].name, "Alice");
        assert_eq!(seen.players[0].question_count, 3);
    }

    #[tokio::test]
    async fn watcher_suppresses_the_contexts_own_writes() {
        let (a, _b) = hub_pair();
        let _watcher = a.spawn_watcher(Duration::from_secs(3600));
        let mut feed = a.subscribe();

        // The local update publishes exactly once; the bus echo must not
        // produce a second delivery.
        a.set_scores(1, 0).unwrap();
        let first = feed.recv().await.unwrap();
        assert_eq!(first.knowledge_score, 1);

        tokio::task::yield_now().await;
        assert!(matches!(
            feed.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn watcher_poll_catches_writes_that_bypass_the_bus() {
        let slot = Arc::new(MemorySlot::new());
        let shared = SharedSlot::new(slot.clone(), 16);
        let hub = StateHub::new(ContextId::new(), shared, 16);
        let _watcher = hub.spawn_watcher(Duration::from_millis(10));
        let mut feed = hub.subscribe();

        // A write from outside this process touches the slot directly.
        use crate::store::StateSlot;
        let mut doc = GameState::initial();
        doc.viewer_score = 8;
        slot.save_raw(&serde_json::to_string(&doc).unwrap()).unwrap();

        let seen = feed.recv().await.unwrap();
        assert_eq!(seen.viewer_score, 8);
    }
}
