/// Roster management and photo orchestration.
pub mod roster_service;
/// Countdown start/stop and the replicated tick loop.
pub mod timer_service;
/// Wheel spins, selection handling, and the presenter task.
pub mod wheel_service;
