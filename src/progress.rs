//! Progress reporting for long batch operations.
//!
//! Batch operations call [`ProgressSink::on_progress`] after each unit of
//! work (a date bucket, a candidate day) and consult
//! [`ProgressSink::should_stop`] before starting the next one. Stopping is
//! cooperative and only happens at those boundaries.

/// Receiver of coarse progress updates.
pub trait ProgressSink {
    /// Called after a unit of work finished.
    fn on_progress(&self, completed: u32, total: u32);

    /// Return true to stop before the next unit of work.
    fn should_stop(&self) -> bool {
        false
    }
}

/// Sink that ignores all updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _completed: u32, _total: u32) {}
}

impl<F> ProgressSink for F
where
    F: Fn(u32, u32),
{
    fn on_progress(&self, completed: u32, total: u32) {
        self(completed, total)
    }
}
