use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::events::STEPS_PER_CYCLE;

pub const MIN_BPM: f32 = 1.0;
pub const DEFAULT_BPM: f32 = 120.0;

/// Clamps a tempo into the range the step math can divide by.
pub fn clamp_bpm(bpm: f32) -> f32 {
    if bpm.is_finite() { bpm.max(MIN_BPM) } else { MIN_BPM }
}

/// Length of one 16th-note step in milliseconds.
pub fn step_duration_ms(bpm: f32) -> f32 {
    60_000.0 / (clamp_bpm(bpm) * 4.0)
}

/// Tempo and transport state shared by handle between the clock thread,
/// the MIDI input thread and the dispatcher.
///
/// Every field is an atomic so readers on the real-time thread never wait.
/// `current_step` is only as fresh as the last tick that was observed.
#[derive(Debug)]
pub struct ClockState {
    base: Instant,
    epoch_offset_ns: AtomicU64,
    bpm: AtomicU32,
    running: AtomicBool,
    current_step: AtomicU8,
}

impl ClockState {
    pub fn new(bpm: f32) -> Self {
        Self {
            base: Instant::now(),
            epoch_offset_ns: AtomicU64::new(0),
            bpm: AtomicU32::new(clamp_bpm(bpm).to_bits()),
            running: AtomicBool::new(false),
            current_step: AtomicU8::new(0),
        }
    }

    pub fn bpm(&self) -> f32 {
        f32::from_bits(self.bpm.load(Ordering::Relaxed))
    }

    pub fn set_bpm(&self, bpm: f32) {
        let clamped = clamp_bpm(bpm);
        if clamped != bpm {
            tracing::warn!(requested = bpm, clamped, "tempo out of range");
        }
        self.bpm.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub fn current_step(&self) -> u8 {
        self.current_step.load(Ordering::Relaxed)
    }

    pub fn epoch(&self) -> Instant {
        self.base + Duration::from_nanos(self.epoch_offset_ns.load(Ordering::Acquire))
    }

    /// Moves the quantizer reference point, usually when the clock starts.
    pub fn restart(&self, now: Instant) {
        let offset = now.saturating_duration_since(self.base).as_nanos() as u64;
        self.epoch_offset_ns.store(offset, Ordering::Release);
        self.current_step.store(0, Ordering::Relaxed);
    }

    /// Records what the clock source just announced.
    pub fn observe_tick(&self, step: u8, bpm: f32) {
        self.current_step
            .store(step % STEPS_PER_CYCLE, Ordering::Relaxed);
        self.bpm.store(clamp_bpm(bpm).to_bits(), Ordering::Relaxed);
    }
}

impl Default for ClockState {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempo_is_clamped() {
        let clock = ClockState::new(0.0);
        assert_eq!(clock.bpm(), MIN_BPM);
        clock.set_bpm(-30.0);
        assert_eq!(clock.bpm(), MIN_BPM);
        clock.set_bpm(f32::NAN);
        assert_eq!(clock.bpm(), MIN_BPM);
        clock.set_bpm(140.0);
        assert_eq!(clock.bpm(), 140.0);
    }

    #[test]
    fn step_duration_at_120_bpm() {
        assert_eq!(step_duration_ms(120.0), 125.0);
    }

    #[test]
    fn observed_tick_updates_step_and_tempo() {
        let clock = ClockState::default();
        clock.observe_tick(21, 90.0);
        assert_eq!(clock.current_step(), 5);
        assert_eq!(clock.bpm(), 90.0);
    }

    #[test]
    fn restart_moves_epoch_forward() {
        let clock = ClockState::default();
        let later = Instant::now() + Duration::from_millis(250);
        clock.restart(later);
        assert_eq!(clock.epoch(), later);
    }
}
