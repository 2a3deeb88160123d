//! Roster management: registering contestants, their photos, and the reset.
//!
//! Photo bytes and roster entries live in different stores, so the
//! multi-step operations here pick an order that can be unwound: a failed
//! registration leaves neither a player record nor orphan photo files.

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::context::SharedContext;
use crate::error::ServiceError;
use crate::state::{GameState, PhotoId, Player, PlayerId};

/// Input for registering a new contestant.
#[derive(Debug, Clone)]
pub struct NewPlayer {
    /// Display name; must not be blank.
    pub name: String,
    /// Home city.
    pub city: String,
    /// How many times the wheel may select this player.
    pub question_count: u32,
}

/// Register a contestant with their photos.
///
/// The record is created photo-less first so the photos can be saved
/// against the real id; any failure rolls the whole registration back.
pub async fn add_player(
    context: &SharedContext,
    new_player: NewPlayer,
    photos: Vec<Bytes>,
) -> Result<Player, ServiceError> {
    if new_player.name.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "player name must not be empty".into(),
        ));
    }

    let mut player = context.hub().add_player(
        new_player.name,
        new_player.city,
        new_player.question_count,
    )?;

    let mut saved = Vec::new();
    for bytes in photos {
        match context.photos().save(player.id, bytes).await {
            Ok(id) => saved.push(id),
            Err(err) => {
                rollback_registration(context, player.id).await;
                return Err(err.into());
            }
        }
    }

    player.photo_ids = saved;
    if let Err(err) = context.hub().update_player(player.clone()) {
        rollback_registration(context, player.id).await;
        return Err(err.into());
    }

    info!(
        player = %player.id,
        name = %player.name,
        photos = player.photo_ids.len(),
        "player registered"
    );
    Ok(player)
}

/// Save additional photos for an existing contestant.
///
/// On failure only the newly saved files are removed; the existing record
/// stays untouched.
pub async fn add_photos(
    context: &SharedContext,
    player_id: PlayerId,
    photos: Vec<Bytes>,
) -> Result<Vec<PhotoId>, ServiceError> {
    let Some(mut player) = context.hub().current().player(player_id).cloned() else {
        return Err(ServiceError::NotFound(format!(
            "player `{player_id}` not found"
        )));
    };

    let mut saved = Vec::new();
    for bytes in photos {
        match context.photos().save(player_id, bytes).await {
            Ok(id) => saved.push(id),
            Err(err) => {
                discard_photos(context, &saved).await;
                return Err(err.into());
            }
        }
    }

    player.photo_ids.extend(saved.iter().copied());
    if let Err(err) = context.hub().update_player(player) {
        discard_photos(context, &saved).await;
        return Err(err.into());
    }
    Ok(saved)
}

/// Remove one photo from a contestant.
///
/// The file goes first; if that fails the reference stays so the photo is
/// still reachable.
pub async fn remove_photo(
    context: &SharedContext,
    player_id: PlayerId,
    photo: PhotoId,
) -> Result<(), ServiceError> {
    let Some(mut player) = context.hub().current().player(player_id).cloned() else {
        return Err(ServiceError::NotFound(format!(
            "player `{player_id}` not found"
        )));
    };
    if !player.photo_ids.contains(&photo) {
        return Err(ServiceError::NotFound(format!(
            "photo `{photo}` does not belong to player `{player_id}`"
        )));
    }

    // `false` just means the file is already gone; the reference should be
    // stripped either way.
    context.photos().delete(photo).await?;
    player.photo_ids.retain(|id| *id != photo);
    context.hub().update_player(player)?;
    Ok(())
}

/// Remove a contestant and everything they own.
///
/// A photo-store failure is logged but does not keep the record: removing
/// the player is the operator's intent, stray files only waste disk.
pub async fn delete_player(
    context: &SharedContext,
    id: PlayerId,
) -> Result<GameState, ServiceError> {
    match context.photos().delete_owned_by(id).await {
        Ok(count) => debug!(player = %id, photos = count, "player photos removed"),
        Err(err) => warn!(
            player = %id,
            error = %err,
            "failed to remove player photos; removing the record anyway"
        ),
    }

    let state = context.hub().delete_player(id)?;
    info!(player = %id, "player removed");
    Ok(state)
}

/// Wipe the whole night: photos, document, local wheel.
pub async fn reset_game(context: &SharedContext) -> Result<GameState, ServiceError> {
    if let Err(err) = context.photos().clear().await {
        warn!(error = %err, "failed to clear photo store; resetting state anyway");
    }

    let state = context.hub().reset()?;
    context.wheel().clear();
    context.set_spin_plan(None);
    info!("game reset");
    Ok(state)
}

/// Undo a registration that failed part-way.
async fn rollback_registration(context: &SharedContext, id: PlayerId) {
    if let Err(err) = context.photos().delete_owned_by(id).await {
        warn!(player = %id, error = %err, "rollback could not delete saved photos");
    }
    if let Err(err) = context.hub().delete_player(id) {
        warn!(player = %id, error = %err, "rollback could not delete the player record");
    }
}

/// Best-effort removal of photos that should not survive a failed edit.
async fn discard_photos(context: &SharedContext, photos: &[PhotoId]) {
    for &photo in photos {
        if let Err(err) = context.photos().delete(photo).await {
            warn!(%photo, error = %err, "could not discard photo after failed edit");
        }
    }
}
