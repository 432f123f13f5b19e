//! Platform abstraction traits for runtime services.
//!
//! The runtime delegates two decisions to the host: when to drive a batch
//! of queued re-renders, and when the last committed tree has been
//! presented so passive effects may run.

use std::time::Duration;

/// Work to run once the host has presented a frame.
pub type PresentTask = Box<dyn FnOnce() + 'static>;

/// Schedules work for the runtime.
///
/// All calls happen on the thread that owns the runtime.
pub trait RuntimeScheduler {
    /// Request that the host process queued re-renders soon. Called once per
    /// batch; further updates in the same batch coalesce.
    fn schedule_render(&self);

    /// Run `task` after the next presentation, or after `timeout` if no
    /// presentation is signalled first. The task must run exactly once.
    fn schedule_after_present(&self, task: PresentTask, timeout: Duration);
}

/// Provides timing information for the runtime.
pub trait Clock {
    /// Instant type produced by this clock implementation.
    type Instant: Copy;

    /// Returns the current instant.
    fn now(&self) -> Self::Instant;

    /// Returns the number of milliseconds elapsed since `since`.
    fn elapsed_millis(&self, since: Self::Instant) -> u64;
}
