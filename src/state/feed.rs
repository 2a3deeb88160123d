//! Broadcast hub fanning out game snapshots inside one context.

use tokio::sync::broadcast;

use crate::state::game::GameState;

/// Broadcast wrapper carrying whole-document snapshots to view tasks.
///
/// Slow subscribers may miss intermediate snapshots; each delivered value is
/// always a complete document, so skipping is safe.
pub struct SnapshotFeed {
    sender: broadcast::Sender<GameState>,
}

impl SnapshotFeed {
    /// Construct a feed backed by a Tokio broadcast channel with the given
    /// capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a subscriber that will receive subsequent snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<GameState> {
        self.sender.subscribe()
    }

    /// Deliver a snapshot to all current subscribers, ignoring delivery
    /// errors when nobody is listening.
    pub fn publish(&self, snapshot: GameState) {
        let _ = self.sender.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_snapshots() {
        let feed = SnapshotFeed::new(8);
        let mut rx = feed.subscribe();

        let mut snapshot = GameState::initial();
        snapshot.knowledge_score = 3;
        feed.publish(snapshot.clone());

        assert_eq!(rx.recv().await.unwrap(), snapshot);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let feed = SnapshotFeed::new(8);
        feed.publish(GameState::initial());
    }
}
