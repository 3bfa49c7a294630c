use std::time::Duration;

use log::debug;

/// Per-step timing and count data, attached to the world and filled during
/// `World::step`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepProfiler {
    pub broad_phase_time: Duration,
    pub narrow_phase_time: Duration,
    pub solver_time: Duration,
    pub total_step_time: Duration,

    pub body_count: usize,
    pub contact_count: usize,
    pub island_count: usize,
}

impl StepProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn report(&self) {
        let total_us = self.total_step_time.as_micros() as f64;
        if total_us < 1.0 {
            return;
        }
        debug!(
            "step profile: bodies={} contacts={} islands={} total={:.2}ms broad={:.2}ms narrow={:.2}ms solve={:.2}ms",
            self.body_count,
            self.contact_count,
            self.island_count,
            self.total_step_time.as_secs_f64() * 1000.0,
            self.broad_phase_time.as_secs_f64() * 1000.0,
            self.narrow_phase_time.as_secs_f64() * 1000.0,
            self.solver_time.as_secs_f64() * 1000.0,
        );
    }
}
