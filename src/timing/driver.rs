use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::clock::{ClockState, step_duration_ms};
use crate::events::STEPS_PER_CYCLE;

/// Receiver of step boundaries, called by whatever owns the clock.
pub trait TickHandler: Send + Sync {
    fn on_tick(&self, step: u8, bpm: f32);
}

/// Stand-in clock source for running without an external one. Ticks the
/// handler once per 16th note at the tempo held in `ClockState`.
pub struct InternalClock {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl InternalClock {
    pub fn start(clock: Arc<ClockState>, handler: Arc<dyn TickHandler>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let start = Instant::now();
        clock.restart(start);
        clock.set_running(true);

        let thread = std::thread::Builder::new()
            .name("stepwire-clock".into())
            .spawn(move || clock_thread(clock, handler, stop_flag, start))
            .map_err(|e| tracing::error!("failed to spawn clock thread: {e}"))
            .ok();

        tracing::info!("internal clock started");
        Self { stop, thread }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("clock thread panicked");
            }
            tracing::info!("internal clock stopped");
        }
    }
}

impl Drop for InternalClock {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn clock_thread(
    clock: Arc<ClockState>,
    handler: Arc<dyn TickHandler>,
    stop: Arc<AtomicBool>,
    start: Instant,
) {
    let mut step: u8 = 0;
    let mut deadline = start;

    while !stop.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < deadline {
            // Short naps so a stop request is noticed quickly at slow tempos.
            std::thread::sleep((deadline - now).min(Duration::from_millis(10)));
            continue;
        }

        let bpm = clock.bpm();
        handler.on_tick(step, bpm);

        step = (step + 1) % STEPS_PER_CYCLE;
        deadline += Duration::from_secs_f32(step_duration_ms(bpm) / 1000.0);
        // Fell more than a step behind: resync instead of bursting ticks.
        if deadline < Instant::now() {
            deadline = Instant::now();
        }
    }

    clock.set_running(false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        steps: Mutex<Vec<u8>>,
    }

    impl TickHandler for Recorder {
        fn on_tick(&self, step: u8, _bpm: f32) {
            self.steps.lock().push(step);
        }
    }

    #[test]
    fn ticks_steps_in_order_and_stops() {
        let clock = Arc::new(ClockState::new(600.0));
        let recorder = Arc::new(Recorder::default());
        let driver = InternalClock::start(clock.clone(), recorder.clone());
        assert!(clock.is_running());

        std::thread::sleep(Duration::from_millis(120));
        driver.stop();
        assert!(!clock.is_running());

        let steps = recorder.steps.lock().clone();
        assert!(steps.len() >= 2, "got {steps:?}");
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(*step as usize, i % 16);
        }
    }
}
