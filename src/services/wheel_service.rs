//! Wheel spins: picking a player, replicating the selection, and following
//! spins initiated by other contexts.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use rand::seq::IndexedRandom;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::TRACK_WHEEL;
use crate::context::SharedContext;
use crate::error::ServiceError;
use crate::state::{GameState, PhotoId, Player, PlayerId, SpinPlan, WheelPhase};

/// What a successful spin decided.
#[derive(Debug, Clone)]
pub struct SpinOutcome {
    /// The player the wheel landed on, as of the pre-spin snapshot.
    pub player: Player,
    /// Photo chosen for display, when the player has any.
    pub photo: Option<PhotoId>,
    /// Frozen animation geometry for this spin.
    pub plan: SpinPlan,
}

/// Spin the wheel: pick uniformly among active players, replicate the
/// selection, and start the local reveal.
///
/// Rejected without any state change while a spin is in progress, a result
/// is still displayed, the cooldown has not elapsed, or nobody is eligible.
pub fn spin(context: &SharedContext) -> Result<SpinOutcome, ServiceError> {
    let now = Instant::now();
    let mut wheel = context.wheel();
    wheel.can_spin(now)?;

    let state = context.hub().current();
    let active = state.active_players();
    if active.is_empty() {
        return Err(ServiceError::InvalidState(
            "no players are eligible for selection".into(),
        ));
    }

    let mut rng = rand::rng();
    let chosen = (*active
        .choose(&mut rng)
        .ok_or_else(|| ServiceError::InvalidState("no players are eligible for selection".into()))?)
    .clone();
    let photo = chosen.photo_ids.choose(&mut rng).copied();

    // Freeze the ordering before any write: this is the wheel every context
    // will draw for this spin.
    let ordering: Vec<PlayerId> = active.iter().map(|p| p.id).collect();

    context.hub().set_selection(Some(chosen.id), photo)?;
    if let Err(err) = context.hub().decrement_questions(chosen.id) {
        // Roll the half-applied selection back so a retry starts clean.
        if let Err(rollback) = context.hub().set_selection(None, None) {
            warn!(error = %rollback, "selection rollback failed");
        }
        return Err(err.into());
    }

    // The machine mutates last, after every fallible step; the guard at the
    // top makes this infallible while the lock is held.
    wheel.begin_spin(chosen.id, now)?;
    drop(wheel);

    let plan = SpinPlan::new(
        ordering,
        chosen.id,
        context.config().spin_turns(),
        context.config().spin_duration(),
    )
    .ok_or_else(|| ServiceError::InvalidState("chosen player left the wheel".into()))?;
    context.set_spin_plan(Some(plan.clone()));

    context.audio().play(TRACK_WHEEL, 1.0);
    schedule_reveal(context);

    info!(player = %chosen.id, name = %chosen.name, "wheel spin started");
    Ok(SpinOutcome {
        player: chosen,
        photo,
        plan,
    })
}

/// Dismiss the current selection in every context.
///
/// Also safe when nothing is selected; clearing twice is a no-op.
pub fn clear_selection(context: &SharedContext) -> Result<GameState, ServiceError> {
    let state = context.hub().set_selection(None, None)?;
    context.wheel().clear();
    context.set_spin_plan(None);
    debug!("selection cleared");
    Ok(state)
}

/// Spawn the task that follows selection changes made by other contexts:
/// entering the spin animation on a fresh selection, returning to idle when
/// it is dismissed, and prefetching the display photo.
pub fn spawn_presenter(context: &SharedContext) -> JoinHandle<()> {
    let weak = Arc::downgrade(context);
    let mut snapshots = Box::pin(context.hub().snapshots());

    tokio::spawn(async move {
        // The first snapshot is this context's starting point, not a
        // transition: an existing selection is shown settled, not re-spun.
        let mut previous = match snapshots.next().await {
            Some(first) => {
                let Some(ctx) = weak.upgrade() else { return };
                if let Some(chosen) = first.current_player_id {
                    ctx.wheel().show_revealed(chosen);
                    prefetch_photo(&ctx, first.current_photo_id);
                }
                first.current_player_id
            }
            None => return,
        };

        while let Some(snapshot) = snapshots.next().await {
            let Some(ctx) = weak.upgrade() else { break };
            let current = snapshot.current_player_id;
            match (previous, current) {
                (None, Some(chosen)) => {
                    follow_selection(&ctx, &snapshot, chosen);
                    prefetch_photo(&ctx, snapshot.current_photo_id);
                }
                (Some(_), None) => {
                    ctx.wheel().clear();
                    ctx.set_spin_plan(None);
                    debug!("observed selection dismissal");
                }
                _ => {}
            }
            previous = current;
        }
    })
}

/// Enter the spin animation for a selection some other context wrote.
fn follow_selection(context: &SharedContext, snapshot: &GameState, chosen: PlayerId) {
    let mut wheel = context.wheel();
    match wheel.phase() {
        // This context initiated the spin; it is already animating.
        WheelPhase::Selecting { chosen: local } | WheelPhase::Revealed { chosen: local }
            if local == chosen =>
        {
            return;
        }
        _ => {}
    }

    // The chosen player's count may already be decremented in the observed
    // snapshot; the frozen wheel still includes them.
    let ordering: Vec<PlayerId> = snapshot
        .players
        .iter()
        .filter(|p| p.is_active() || p.id == chosen)
        .map(|p| p.id)
        .collect();

    wheel.follow_spin(chosen, Instant::now());
    drop(wheel);

    match SpinPlan::new(
        ordering,
        chosen,
        context.config().spin_turns(),
        context.config().spin_duration(),
    ) {
        Some(plan) => context.set_spin_plan(Some(plan)),
        None => warn!(player = %chosen, "selection references a player missing from the roster"),
    }

    schedule_reveal(context);
    debug!(player = %chosen, "following a remote spin");
}

/// After the animation duration, move the local wheel to its revealed state.
fn schedule_reveal(context: &SharedContext) {
    let weak = Arc::downgrade(context);
    let delay = context.config().spin_duration();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(ctx) = weak.upgrade() else { return };
        match ctx.wheel().reveal() {
            Ok(player) => info!(player = %player, "wheel revealed"),
            // Cleared mid-animation; nothing to reveal.
            Err(_) => {}
        }
    });
}

/// Pull the selected photo into the display cache.
fn prefetch_photo(context: &SharedContext, photo: Option<PhotoId>) {
    let Some(photo) = photo else { return };
    if context.cached_photo(photo).is_some() {
        return;
    }
    let weak = Arc::downgrade(context);
    tokio::spawn(async move {
        let Some(ctx) = weak.upgrade() else { return };
        match ctx.photos().get(photo).await {
            Ok(Some(stored)) => ctx.cache_photo(photo, stored.bytes),
            Ok(None) => debug!(%photo, "selected photo not in the store"),
            Err(err) => warn!(%photo, error = %err, "photo prefetch failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::audio::NullSink;
    use crate::config::AppConfig;
    use crate::context::Context;
    use crate::state::GamePatch;
    use crate::store::MemorySlot;
    use crate::sync::SharedSlot;

    fn fast_config(dir: &Path) -> AppConfig {
        AppConfig::default()
            .with_data_dir(dir)
            .with_poll_interval(Duration::from_millis(10))
            .with_spin_duration(Duration::from_millis(20))
            .with_spin_cooldown(Duration::ZERO)
    }

    async fn open_context(config: AppConfig, shared: SharedSlot) -> SharedContext {
        Context::open_with(config, shared, Box::new(NullSink))
            .await
            .unwrap()
    }

    async fn single_context(config: AppConfig) -> SharedContext {
        open_context(config, SharedSlot::new(Arc::new(MemorySlot::new()), 32)).await
    }

    /// Two contexts sharing one in-process slot, as two windows on one
    /// machine would.
    async fn context_pair(config: AppConfig) -> (SharedContext, SharedContext) {
        let shared = SharedSlot::new(Arc::new(MemorySlot::new()), 32);
        let a = open_context(config.clone(), shared.clone()).await;
        let b = open_context(config, shared).await;
        (a, b)
    }

    async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check()
    }

    #[tokio::test]
    async fn spin_replicates_the_selection_and_spends_a_question() {
        let dir = TempDir::new().unwrap();
        let (a, b) = context_pair(fast_config(dir.path())).await;
        let anna = a.hub().add_player("Anna", "Riga", 2).unwrap();

        let outcome = spin(&a).unwrap();
        assert_eq!(outcome.player.id, anna.id);
        assert!(outcome.photo.is_none());

        let state = a.hub().current();
        assert_eq!(state.current_player_id, Some(anna.id));
        assert_eq!(state.players[0].question_count, 1);
        // The sibling reads the same document without any waiting.
        assert_eq!(b.hub().current().current_player_id, Some(anna.id));
    }

    #[tokio::test]
    async fn spin_is_rejected_while_the_wheel_is_busy() {
        let dir = TempDir::new().unwrap();
        let a = single_context(fast_config(dir.path())).await;
        a.hub().add_player("Anna", "Riga", 5).unwrap();

        spin(&a).unwrap();
        let err = spin(&a).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        // The rejected spin spent nothing.
        assert_eq!(a.hub().current().players[0].question_count, 4);
    }

    #[tokio::test]
    async fn cooldown_blocks_a_respin_even_after_clearing() {
        let dir = TempDir::new().unwrap();
        let config = fast_config(dir.path()).with_spin_cooldown(Duration::from_secs(60));
        let a = single_context(config).await;
        a.hub().add_player("Anna", "Riga", 5).unwrap();

        spin(&a).unwrap();
        clear_selection(&a).unwrap();

        let err = spin(&a).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(a.hub().current().current_player_id, None);
    }

    #[tokio::test]
    async fn spin_requires_an_eligible_player() {
        let dir = TempDir::new().unwrap();
        let a = single_context(fast_config(dir.path())).await;

        let err = spin(&a).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        // A player with no questions left does not make the wheel spinnable.
        a.hub().add_player("Anna", "Riga", 0).unwrap();
        let err = spin(&a).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert_eq!(a.hub().current().current_player_id, None);
    }

    #[tokio::test]
    async fn exhausted_players_are_never_chosen() {
        let dir = TempDir::new().unwrap();
        let a = single_context(fast_config(dir.path())).await;
        let anna = a.hub().add_player("Anna", "Riga", 50).unwrap();
        a.hub().add_player("Boris", "Tartu", 0).unwrap();

        for _ in 0..10 {
            let outcome = spin(&a).unwrap();
            assert_eq!(outcome.player.id, anna.id);
            clear_selection(&a).unwrap();
        }
    }

    #[tokio::test]
    async fn selection_is_roughly_uniform_across_active_players() {
        let dir = TempDir::new().unwrap();
        let a = single_context(fast_config(dir.path())).await;

        let mut counts = HashMap::new();
        for name in ["Anna", "Boris", "Clara"] {
            counts.insert(a.hub().add_player(name, "Riga", 1000).unwrap().id, 0u32);
        }

        for _ in 0..300 {
            *counts.get_mut(&spin(&a).unwrap().player.id).unwrap() += 1;
            clear_selection(&a).unwrap();
        }

        // 100 expected per player; the band is many deviations wide so a
        // fair generator cannot realistically land outside it.
        for (player, count) in counts {
            assert!(
                (40..=180).contains(&count),
                "player {player} chosen {count} times out of 300"
            );
        }
    }

    #[tokio::test]
    async fn spin_picks_a_photo_of_the_chosen_player() {
        let dir = TempDir::new().unwrap();
        let a = single_context(fast_config(dir.path())).await;
        let mut anna = a.hub().add_player("Anna", "Riga", 3).unwrap();
        let photo = uuid::Uuid::new_v4();
        anna.photo_ids = vec![photo];
        a.hub().update_player(anna).unwrap();

        let outcome = spin(&a).unwrap();
        assert_eq!(outcome.photo, Some(photo));
        assert_eq!(a.hub().current().current_photo_id, Some(photo));
    }

    #[tokio::test]
    async fn sibling_contexts_follow_a_spin_and_its_dismissal() {
        let dir = TempDir::new().unwrap();
        let config = fast_config(dir.path()).with_spin_cooldown(Duration::from_secs(60));
        let (a, b) = context_pair(config).await;
        let anna = a.hub().add_player("Anna", "Riga", 3).unwrap();

        spin(&a).unwrap();

        let followed = wait_for(|| {
            matches!(
                b.wheel().phase(),
                WheelPhase::Selecting { chosen } | WheelPhase::Revealed { chosen }
                    if chosen == anna.id
            )
        })
        .await;
        assert!(followed, "the sibling never entered the spin");
        let plan = b.spin_plan().unwrap();
        assert_eq!(plan.ordering, vec![anna.id]);

        clear_selection(&a).unwrap();
        let idled =
            wait_for(|| b.wheel().phase() == WheelPhase::Idle && b.spin_plan().is_none()).await;
        assert!(idled, "the sibling never saw the dismissal");

        // Following the spin anchored the sibling's cooldown too.
        let err = spin(&b).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn followed_spin_keeps_the_exhausted_chosen_player_on_the_wheel() {
        let dir = TempDir::new().unwrap();
        let (a, b) = context_pair(fast_config(dir.path())).await;
        let anna = a.hub().add_player("Anna", "Riga", 1).unwrap();
        let boris = a.hub().add_player("Boris", "Tartu", 5).unwrap();

        // One write carrying both the selection and the spent question count,
        // the way an observer may see an initiator's back-to-back writes.
        let mut players = a.hub().current().players.clone();
        players[0].question_count = 0;
        a.hub()
            .update(GamePatch {
                players: Some(players),
                current_player_id: Some(Some(anna.id)),
                current_photo_id: Some(None),
                ..GamePatch::default()
            })
            .unwrap();

        let followed = wait_for(|| b.spin_plan().is_some()).await;
        assert!(followed, "the sibling never planned the spin");

        let plan = b.spin_plan().unwrap();
        assert_eq!(plan.ordering, vec![anna.id, boris.id]);
        assert_eq!(plan.chosen_index, 0);
        assert_eq!(plan.segment_angle(), 180.0);
    }

    #[tokio::test]
    async fn joining_context_shows_an_existing_selection_without_spinning() {
        let dir = TempDir::new().unwrap();
        let shared = SharedSlot::new(Arc::new(MemorySlot::new()), 32);
        let a = open_context(fast_config(dir.path()), shared.clone()).await;
        let anna = a.hub().add_player("Anna", "Riga", 3).unwrap();
        a.hub().set_selection(Some(anna.id), None).unwrap();

        let b = open_context(fast_config(dir.path()), shared).await;
        let settled = wait_for(|| {
            matches!(b.wheel().phase(), WheelPhase::Revealed { chosen } if chosen == anna.id)
        })
        .await;
        assert!(settled, "the joining context never settled on the selection");
        assert!(b.spin_plan().is_none());
    }
}
