//! The replicated game document and the partial-update type applied to it.
//!
//! This is the single JSON document every context shares. Field names follow
//! the camelCase shape the host and display views read, so the serialized
//! form is exactly the on-disk record.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a registered contestant.
pub type PlayerId = Uuid;
/// Identifier of a stored contestant photo.
pub type PhotoId = Uuid;

/// Round length seeded into a fresh document before the host picks one.
pub const DEFAULT_ROUND_SECS: u32 = 60;

/// A registered contestant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Stable identity, generated once at creation.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Home city shown next to the name.
    #[serde(default)]
    pub city: String,
    /// Photos owned by this player; bytes live in the photo store.
    #[serde(default)]
    pub photo_ids: Vec<PhotoId>,
    /// Remaining times this player may be selected by the wheel.
    #[serde(default)]
    pub question_count: u32,
}

impl Player {
    /// Whether the wheel may still land on this player.
    pub fn is_active(&self) -> bool {
        self.question_count > 0
    }
}

/// The whole-game document replicated across contexts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    /// Registered contestants, insertion order = display order.
    pub players: Vec<Player>,
    /// Team score.
    pub knowledge_score: u32,
    /// Audience score.
    pub viewer_score: u32,
    /// Player currently selected by the wheel; `None` = no active selection.
    pub current_player_id: Option<PlayerId>,
    /// Which of the selected player's photos to display.
    pub current_photo_id: Option<PhotoId>,
    /// Whether the countdown is running.
    pub timer_active: bool,
    /// Seconds left on the countdown.
    pub timer_remaining: u32,
}

impl Default for GameState {
    fn default() -> Self {
        Self::initial()
    }
}

impl GameState {
    /// The fixed value a fresh (or reset) game starts from.
    pub fn initial() -> Self {
        Self {
            players: Vec::new(),
            knowledge_score: 0,
            viewer_score: 0,
            current_player_id: None,
            current_photo_id: None,
            timer_active: false,
            timer_remaining: DEFAULT_ROUND_SECS,
        }
    }

    /// Look up a player by id.
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Players currently eligible for selection, in display order.
    pub fn active_players(&self) -> Vec<&Player> {
        self.players.iter().filter(|p| p.is_active()).collect()
    }

    /// The selected player, if the selection references a live roster entry.
    ///
    /// A stale `current_player_id` reads as "no selection" rather than an
    /// error: the referenced player may have been deleted by another context.
    pub fn selected_player(&self) -> Option<&Player> {
        self.current_player_id.and_then(|id| self.player(id))
    }
}

/// Partial update merged over the current document by [`StateHub::update`].
///
/// [`StateHub::update`]: crate::state::StateHub::update
#[derive(Debug, Clone, Default)]
pub struct GamePatch {
    /// Replacement roster, when present.
    pub players: Option<Vec<Player>>,
    /// New team score, when present.
    pub knowledge_score: Option<u32>,
    /// New audience score, when present.
    pub viewer_score: Option<u32>,
    /// Outer `None` leaves the selection untouched; `Some(None)` clears it;
    /// `Some(Some(id))` selects that player.
    pub current_player_id: Option<Option<PlayerId>>,
    /// Same double-option convention as `current_player_id`.
    pub current_photo_id: Option<Option<PhotoId>>,
    /// New countdown-running flag, when present.
    pub timer_active: Option<bool>,
    /// New countdown value, when present.
    pub timer_remaining: Option<u32>,
}

impl GamePatch {
    /// Merge this patch over `base`, yielding the next document.
    pub fn apply(self, base: GameState) -> GameState {
        GameState {
            players: self.players.unwrap_or(base.players),
            knowledge_score: self.knowledge_score.unwrap_or(base.knowledge_score),
            viewer_score: self.viewer_score.unwrap_or(base.viewer_score),
            current_player_id: self.current_player_id.unwrap_or(base.current_player_id),
            current_photo_id: self.current_photo_id.unwrap_or(base.current_photo_id),
            timer_active: self.timer_active.unwrap_or(base.timer_active),
            timer_remaining: self.timer_remaining.unwrap_or(base.timer_remaining),
        }
    }

    /// Patch that replaces the roster and nothing else.
    pub fn roster(players: Vec<Player>) -> Self {
        Self {
            players: Some(players),
            ..Self::default()
        }
    }

    /// Patch that sets the `(currentPlayerId, currentPhotoId)` pair as a unit.
    pub fn selection(player: Option<PlayerId>, photo: Option<PhotoId>) -> Self {
        Self {
            current_player_id: Some(player),
            current_photo_id: Some(photo),
            ..Self::default()
        }
    }
}
