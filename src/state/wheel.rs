//! Per-context wheel state machine and the geometry of a spin.
//!
//! Every context runs its own copy of this machine. The shared document only
//! carries the outcome (the selection pair); whether this context is
//! currently animating, revealing, or idle is local and never replicated.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::state::game::PlayerId;

/// Local presentation phase of the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelPhase {
    /// Nothing selected; a spin may start once the cooldown allows.
    Idle,
    /// The wheel is turning; the outcome is decided but not yet shown.
    Selecting {
        /// Player the wheel will land on.
        chosen: PlayerId,
    },
    /// The outcome is on display until the selection is cleared.
    Revealed {
        /// Player the wheel landed on.
        chosen: PlayerId,
    },
}

/// Error returned when a spin request cannot be honored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpinError {
    /// The wheel is still turning from a previous spin.
    #[error("a spin is already in progress")]
    SpinInProgress,
    /// A previous result is still displayed; clear the selection first.
    #[error("previous selection is still displayed")]
    SelectionDisplayed,
    /// Too soon after the previous spin was initiated.
    #[error("wheel is cooling down for another {remaining:?}")]
    CooldownActive {
        /// Time left until the next spin is allowed.
        remaining: Duration,
    },
    /// Reveal requested while the wheel is not turning.
    #[error("the wheel is not spinning")]
    NotSpinning,
}

/// State machine gating spins and tracking the local reveal.
///
/// The cooldown window is anchored at spin *initiation*, not at the moment
/// the animation finishes, and is enforced independently by every context
/// that can initiate spins.
#[derive(Debug, Clone)]
pub struct WheelMachine {
    phase: WheelPhase,
    cooldown: Duration,
    last_spin_at: Option<Instant>,
}

impl WheelMachine {
    /// Create an idle machine with the given spin cooldown.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            phase: WheelPhase::Idle,
            cooldown,
            last_spin_at: None,
        }
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> WheelPhase {
        self.phase
    }

    /// Time left before another spin may start, if any.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_spin_at?;
        let elapsed = now.saturating_duration_since(last);
        let remaining = self.cooldown.checked_sub(elapsed)?;
        (!remaining.is_zero()).then_some(remaining)
    }

    /// Check whether a spin could start at `now` without mutating anything.
    pub fn can_spin(&self, now: Instant) -> Result<(), SpinError> {
        match self.phase {
            WheelPhase::Selecting { .. } => return Err(SpinError::SpinInProgress),
            WheelPhase::Revealed { .. } => return Err(SpinError::SelectionDisplayed),
            WheelPhase::Idle => {}
        }
        if let Some(remaining) = self.cooldown_remaining(now) {
            return Err(SpinError::CooldownActive { remaining });
        }
        Ok(())
    }

    /// Start a spin landing on `chosen`, recording `now` as the cooldown
    /// anchor. Rejects without mutating when the machine is not idle or the
    /// cooldown has not elapsed.
    pub fn begin_spin(&mut self, chosen: PlayerId, now: Instant) -> Result<(), SpinError> {
        self.can_spin(now)?;
        self.phase = WheelPhase::Selecting { chosen };
        self.last_spin_at = Some(now);
        Ok(())
    }

    /// Enter `Selecting` for a spin another context initiated.
    ///
    /// Not gated: the initiating context already enforced its guards, and
    /// the observed selection is final. Still anchors the cooldown so a spin
    /// initiated *here* right after respects the shared rhythm.
    pub fn follow_spin(&mut self, chosen: PlayerId, now: Instant) {
        self.phase = WheelPhase::Selecting { chosen };
        self.last_spin_at = Some(now);
    }

    /// Jump straight to `Revealed`, for a context joining while a selection
    /// is already on display.
    pub fn show_revealed(&mut self, chosen: PlayerId) {
        self.phase = WheelPhase::Revealed { chosen };
    }

    /// Finish the animation, moving `Selecting` to `Revealed`.
    pub fn reveal(&mut self) -> Result<PlayerId, SpinError> {
        match self.phase {
            WheelPhase::Selecting { chosen } => {
                self.phase = WheelPhase::Revealed { chosen };
                Ok(chosen)
            }
            _ => Err(SpinError::NotSpinning),
        }
    }

    /// Return to `Idle`. Valid from any phase: a remote context may clear the
    /// selection while this one is still mid-animation.
    pub fn clear(&mut self) {
        self.phase = WheelPhase::Idle;
    }
}

/// Frozen geometry for animating one spin.
///
/// Computed once when the spin starts and never recomputed: if the active
/// set changes mid-spin, the wheel keeps the ordering it started with.
#[derive(Debug, Clone, PartialEq)]
pub struct SpinPlan {
    /// Active players in display order at the moment the spin started.
    pub ordering: Vec<PlayerId>,
    /// Index of the chosen player within `ordering`.
    pub chosen_index: usize,
    /// Final pointer rotation in degrees, including the full turns.
    pub target_angle: f64,
    /// How long the animation runs.
    pub duration: Duration,
}

impl SpinPlan {
    /// Build the plan for landing on `chosen` given the frozen `ordering`.
    ///
    /// Returns `None` when `chosen` is not part of the ordering, which means
    /// the observed snapshot is too stale to animate against.
    pub fn new(
        ordering: Vec<PlayerId>,
        chosen: PlayerId,
        turns: u32,
        duration: Duration,
    ) -> Option<Self> {
        let chosen_index = ordering.iter().position(|id| *id == chosen)?;
        let segment = 360.0 / ordering.len() as f64;
        // Land in the middle of the chosen segment after the full turns.
        let target_angle = f64::from(turns) * 360.0 + chosen_index as f64 * segment + segment / 2.0;
        Some(Self {
            ordering,
            chosen_index,
            target_angle,
            duration,
        })
    }

    /// Arc width of one player segment, in degrees.
    pub fn segment_angle(&self) -> f64 {
        360.0 / self.ordering.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const COOLDOWN: Duration = Duration::from_secs(6);

    fn machine() -> WheelMachine {
        WheelMachine::new(COOLDOWN)
    }

    #[test]
    fn initial_phase_is_idle() {
        assert_eq!(machine().phase(), WheelPhase::Idle);
    }

    #[test]
    fn spin_reveal_clear_cycle() {
        let mut wheel = machine();
        let chosen = Uuid::new_v4();
        let t0 = Instant::now();

        wheel.begin_spin(chosen, t0).unwrap();
        assert_eq!(wheel.phase(), WheelPhase::Selecting { chosen });

        assert_eq!(wheel.reveal().unwrap(), chosen);
        assert_eq!(wheel.phase(), WheelPhase::Revealed { chosen });

        wheel.clear();
        assert_eq!(wheel.phase(), WheelPhase::Idle);
    }

    #[test]
    fn spin_while_selecting_is_rejected() {
        let mut wheel = machine();
        let first = Uuid::new_v4();
        let t0 = Instant::now();
        wheel.begin_spin(first, t0).unwrap();

        let err = wheel.begin_spin(Uuid::new_v4(), t0).unwrap_err();
        assert_eq!(err, SpinError::SpinInProgress);
        // The rejected spin must not replace the outcome.
        assert_eq!(wheel.phase(), WheelPhase::Selecting { chosen: first });
    }

    #[test]
    fn spin_while_revealed_is_rejected() {
        let mut wheel = machine();
        let t0 = Instant::now();
        wheel.begin_spin(Uuid::new_v4(), t0).unwrap();
        wheel.reveal().unwrap();

        let err = wheel
            .begin_spin(Uuid::new_v4(), t0 + COOLDOWN * 2)
            .unwrap_err();
        assert_eq!(err, SpinError::SelectionDisplayed);
    }

    #[test]
    fn cooldown_runs_from_initiation_not_from_clear() {
        let mut wheel = machine();
        let t0 = Instant::now();
        wheel.begin_spin(Uuid::new_v4(), t0).unwrap();
        wheel.reveal().unwrap();
        wheel.clear();

        // Cleared immediately, but the cooldown anchored at t0 still holds.
        let err = wheel
            .begin_spin(Uuid::new_v4(), t0 + Duration::from_secs(2))
            .unwrap_err();
        match err {
            SpinError::CooldownActive { remaining } => {
                assert!(remaining <= Duration::from_secs(4));
                assert!(remaining > Duration::from_secs(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Past the cooldown the spin goes through.
        wheel.begin_spin(Uuid::new_v4(), t0 + COOLDOWN).unwrap();
    }

    #[test]
    fn remote_clear_interrupts_a_running_spin() {
        let mut wheel = machine();
        wheel.begin_spin(Uuid::new_v4(), Instant::now()).unwrap();
        wheel.clear();
        assert_eq!(wheel.phase(), WheelPhase::Idle);
        assert_eq!(wheel.reveal().unwrap_err(), SpinError::NotSpinning);
    }

    #[test]
    fn followed_spin_bypasses_guards_but_anchors_the_cooldown() {
        let mut wheel = machine();
        let remote = Uuid::new_v4();
        let t0 = Instant::now();

        // A remote spin lands regardless of local cooldown state.
        wheel.follow_spin(remote, t0);
        assert_eq!(wheel.phase(), WheelPhase::Selecting { chosen: remote });

        wheel.reveal().unwrap();
        wheel.clear();

        // A local spin right after still honors the shared rhythm.
        let err = wheel
            .begin_spin(Uuid::new_v4(), t0 + Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SpinError::CooldownActive { .. }));
    }

    #[test]
    fn show_revealed_skips_the_animation() {
        let mut wheel = machine();
        let chosen = Uuid::new_v4();
        wheel.show_revealed(chosen);
        assert_eq!(wheel.phase(), WheelPhase::Revealed { chosen });
    }

    #[test]
    fn plan_lands_mid_segment_after_full_turns() {
        let players: Vec<PlayerId> = (0..4).map(|_| Uuid::new_v4()).collect();
        let plan = SpinPlan::new(players.clone(), players[2], 4, Duration::from_secs(5)).unwrap();

        assert_eq!(plan.chosen_index, 2);
        assert_eq!(plan.segment_angle(), 90.0);
        // 4 turns, then two full segments, then half a segment.
        assert_eq!(plan.target_angle, 4.0 * 360.0 + 2.0 * 90.0 + 45.0);
    }

    #[test]
    fn plan_requires_the_chosen_player_in_the_ordering() {
        let players: Vec<PlayerId> = (0..3).map(|_| Uuid::new_v4()).collect();
        let plan = SpinPlan::new(players, Uuid::new_v4(), 4, Duration::from_secs(5));
        assert!(plan.is_none());
    }
}
