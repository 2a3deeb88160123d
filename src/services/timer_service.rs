//! The replicated answer countdown.
//!
//! Exactly one context ticks: the one that started the countdown. Everyone
//! else just displays the replicated `timerRemaining`, and any context may
//! stop the countdown by deactivating it in the shared document.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::audio::{TRACK_TIMER_FINISHED, TRACK_TIMER_START, TRACK_TIMER_WARNING};
use crate::context::{RunningTimer, SharedContext};
use crate::error::ServiceError;
use crate::state::GamePatch;

/// Seconds remaining at which the warning cue fires.
const WARNING_AT_SECS: u32 = 10;

/// Start a countdown of `total_seconds` and spawn the tick loop here.
///
/// Rejected, without touching shared state, when the document already shows
/// a running countdown, wherever it was started.
pub fn start(context: &SharedContext, total_seconds: u32) -> Result<(), ServiceError> {
    if total_seconds == 0 {
        return Err(ServiceError::InvalidInput(
            "countdown must be at least one second".into(),
        ));
    }

    let mut slot = context.timer_slot();
    let state = context.hub().current();
    if state.timer_active {
        return Err(ServiceError::InvalidState(
            "a countdown is already running".into(),
        ));
    }
    if let Some(stale) = slot.take() {
        stale.task.abort();
    }

    context.hub().update(GamePatch {
        timer_active: Some(true),
        timer_remaining: Some(total_seconds),
        ..GamePatch::default()
    })?;
    context.audio().play(TRACK_TIMER_START, 1.0);

    let (stop_tx, stop_rx) = watch::channel(false);
    let task = spawn_tick_loop(context, stop_rx);
    *slot = Some(RunningTimer {
        stop: stop_tx,
        task,
    });

    info!(total_seconds, "countdown started");
    Ok(())
}

/// Force the countdown to zero and inactive, silencing audio.
///
/// Works from any context: if the loop runs elsewhere, it notices the
/// deactivated document on its next tick and exits silently.
pub fn stop(context: &SharedContext) -> Result<(), ServiceError> {
    let mut slot = context.timer_slot();
    let state = context.hub().current();
    let owns_running_loop = slot
        .as_ref()
        .is_some_and(|timer| !timer.task.is_finished());
    if !state.timer_active && !owns_running_loop {
        return Err(ServiceError::InvalidState(
            "no countdown is running".into(),
        ));
    }

    if let Some(timer) = slot.take() {
        let _ = timer.stop.send(true);
    }
    context.hub().update(GamePatch {
        timer_active: Some(false),
        timer_remaining: Some(0),
        ..GamePatch::default()
    })?;
    context.audio().stop();

    info!("countdown stopped");
    Ok(())
}

/// One decrement per tick period, re-reading the shared document each time
/// so a stop or reset issued anywhere ends the loop.
fn spawn_tick_loop(context: &SharedContext, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
    let weak = Arc::downgrade(context);
    let tick = context.config().timer_tick();
    let hold = context.config().timer_expiry_hold();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The interval's first tick completes immediately; consume it so the
        // first decrement lands one full period after start.
        interval.tick().await;

        let mut warned = false;
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    debug!("countdown loop stopped");
                    return;
                }
                _ = interval.tick() => {}
            }

            let Some(ctx) = weak.upgrade() else { return };
            let state = ctx.hub().current();
            if !state.timer_active {
                debug!("countdown deactivated elsewhere");
                return;
            }

            let remaining = state.timer_remaining.saturating_sub(1);
            if let Err(err) = ctx.hub().update(GamePatch {
                timer_remaining: Some(remaining),
                ..GamePatch::default()
            }) {
                // Skip this tick; the next one recomputes from shared state.
                warn!(error = %err, "failed to persist countdown tick");
                continue;
            }

            if remaining == WARNING_AT_SECS && !warned {
                warned = true;
                ctx.audio().play(TRACK_TIMER_WARNING, 1.0);
            }

            if remaining == 0 {
                ctx.audio().play(TRACK_TIMER_FINISHED, 1.0);
                drop(ctx);

                // Keep the zero on display briefly before deactivating,
                // unless a stop lands in the meantime.
                tokio::select! {
                    _ = stop.changed() => return,
                    _ = tokio::time::sleep(hold) => {}
                }

                let Some(ctx) = weak.upgrade() else { return };
                if let Err(err) = ctx.hub().update(GamePatch {
                    timer_active: Some(false),
                    ..GamePatch::default()
                }) {
                    warn!(error = %err, "failed to deactivate finished countdown");
                }
                info!("countdown finished");
                return;
            }
        }
    })
}
