use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::clock::{ClockState, step_duration_ms};
use crate::events::STEPS_PER_CYCLE;

/// Snaps an arrival time onto the step grid that started at `epoch`.
///
/// Arrivals before the epoch land on step 0. A tempo at or below zero is
/// clamped to `MIN_BPM`.
pub fn quantize(arrival: Instant, epoch: Instant, bpm: f32, steps_per_cycle: u32) -> u8 {
    let steps_per_cycle = steps_per_cycle.max(1) as u64;
    let elapsed_ms = arrival.saturating_duration_since(epoch).as_secs_f64() * 1000.0;
    let step = (elapsed_ms / step_duration_ms(bpm) as f64).floor() as u64;
    (step % steps_per_cycle) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuantizeMode {
    /// Step derived from elapsed time since the clock epoch.
    #[default]
    Grid,
    /// Whatever step the clock last announced.
    CurrentStep,
}

impl QuantizeMode {
    pub fn from_flag(quantize: bool) -> Self {
        if quantize {
            QuantizeMode::Grid
        } else {
            QuantizeMode::CurrentStep
        }
    }
}

pub struct StepQuantizer {
    clock: Arc<ClockState>,
    mode: parking_lot::RwLock<QuantizeMode>,
}

impl StepQuantizer {
    pub fn new(clock: Arc<ClockState>, mode: QuantizeMode) -> Self {
        Self {
            clock,
            mode: parking_lot::RwLock::new(mode),
        }
    }

    pub fn mode(&self) -> QuantizeMode {
        *self.mode.read()
    }

    pub fn set_mode(&self, mode: QuantizeMode) {
        *self.mode.write() = mode;
    }

    pub fn step_for(&self, arrival: Instant) -> u8 {
        match self.mode() {
            QuantizeMode::Grid => quantize(
                arrival,
                self.clock.epoch(),
                self.clock.bpm(),
                STEPS_PER_CYCLE as u32,
            ),
            QuantizeMode::CurrentStep => self.clock.current_step(),
        }
    }
}
