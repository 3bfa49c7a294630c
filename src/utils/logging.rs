use log::{log_enabled, warn, Level};
use std::time::{Duration, Instant};

/// Scoped timer for profiling critical sections; logs at trace level.
pub struct ScopedTimer<'a> {
    label: &'a str,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(label: &'a str) -> Self {
        if log_enabled!(Level::Trace) {
            log::trace!("begin {label}");
        }
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<'a> Drop for ScopedTimer<'a> {
    fn drop(&mut self) {
        if log_enabled!(Level::Trace) {
            let elapsed = self.start.elapsed();
            log::trace!("end {} ({} µs)", self.label, elapsed.as_micros());
        }
    }
}

/// Emits a warning when a step exceeds its frame budget.
pub fn warn_if_frame_budget_exceeded(duration: Duration, budget_ms: f64) {
    if duration.as_secs_f64() * 1000.0 > budget_ms {
        warn!(
            "step exceeded budget: {:.2} ms > {:.2} ms",
            duration.as_secs_f64() * 1000.0,
            budget_ms
        );
    }
}
