use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::resolve::{Dispatch, resolve_step};
use super::sound::SoundEngineControl;
use crate::events::STEPS_PER_CYCLE;
use crate::notify::Subscription;

/// One slot of the on-screen step sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: u8,
    pub is_on: bool,
    pub note_pitch: u8,
    /// 0.0 -> 1.0
    pub velocity: f32,
    /// Free parameter lane, 0.0 -> 1.0
    pub free_value: f32,
}

impl Step {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            is_on: false,
            note_pitch: 60,
            velocity: 0.8,
            free_value: 0.5,
        }
    }

    pub fn midi_velocity(&self) -> u8 {
        (self.velocity * 127.0).clamp(0.0, 127.0) as u8
    }
}

/// A full cycle of steps, always exactly `STEPS_PER_CYCLE` long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Step>", into = "Vec<Step>")]
pub struct Pattern {
    steps: Vec<Step>,
}

impl Pattern {
    pub fn from_steps(mut steps: Vec<Step>) -> Self {
        steps.truncate(STEPS_PER_CYCLE as usize);
        while steps.len() < STEPS_PER_CYCLE as usize {
            steps.push(Step::new(steps.len() as u8));
        }
        for (id, step) in steps.iter_mut().enumerate() {
            step.id = id as u8;
        }
        Self { steps }
    }

    pub fn step(&self, index: u8) -> &Step {
        &self.steps[(index % STEPS_PER_CYCLE) as usize]
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::from_steps(Vec::new())
    }
}

impl From<Vec<Step>> for Pattern {
    fn from(steps: Vec<Step>) -> Self {
        Self::from_steps(steps)
    }
}

impl From<Pattern> for Vec<Step> {
    fn from(pattern: Pattern) -> Self {
        pattern.steps
    }
}

/// The sequencer's notes, triggered by step number.
///
/// The pattern is swapped wholesale on edit so the tick thread reads it
/// without locking.
pub struct SequencerTrack {
    pattern: ArcSwap<Pattern>,
    last_note: Mutex<Option<u8>>,
}

impl SequencerTrack {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern: ArcSwap::from_pointee(pattern),
            last_note: Mutex::new(None),
        }
    }

    pub fn pattern(&self) -> Arc<Pattern> {
        self.pattern.load_full()
    }

    pub fn set_step(&self, index: u8, step: Step) {
        let index = (index % STEPS_PER_CYCLE) as usize;
        self.pattern.rcu(|current| {
            let mut steps = current.steps.clone();
            steps[index] = Step {
                id: index as u8,
                ..step.clone()
            };
            Pattern { steps }
        });
    }

    pub fn toggle(&self, index: u8) {
        let mut step = self.pattern().step(index).clone();
        step.is_on = !step.is_on;
        self.set_step(index, step);
    }

    pub fn step(&self, index: u8) -> Step {
        self.pattern.load().step(index).clone()
    }

    /// Plays the step's note if it is switched on.
    pub fn handle_tick(&self, index: u8, sound: &dyn SoundEngineControl) -> Dispatch {
        let dispatch = resolve_step(self.pattern.load().step(index));
        dispatch.apply(sound);
        self.note_played(&dispatch);
        dispatch
    }

    pub(crate) fn note_played(&self, dispatch: &Dispatch) {
        if let Dispatch::PlayNote { note, .. } = dispatch {
            *self.last_note.lock() = Some(*note);
        }
    }

    pub fn last_note(&self) -> Option<u8> {
        *self.last_note.lock()
    }

    /// All notes off.
    pub fn panic(&self, sound: &dyn SoundEngineControl) {
        self.last_note.lock().take();
        sound.stop_all_notes();
        tracing::debug!("panic: all notes off");
    }
}

impl Default for SequencerTrack {
    fn default() -> Self {
        Self::new(Pattern::default())
    }
}

/// Drives a `SequencerTrack` from the tick broadcast, outside the pool.
///
/// Being a broadcast consumer, a follower that stalls skips to the newest
/// step instead of replaying the ones it missed.
pub struct SequencerFollower {
    stop: Arc<AtomicBool>,
    gate: Arc<Mutex<Gate>>,
    ticks: Arc<Subscription<u8>>,
    thread: Option<JoinHandle<()>>,
}

/// Held by the follower thread while it plays a step.
struct Gate {
    playing: bool,
    /// Bumped on every pause; a tick received in an older generation is stale.
    generation: u64,
}

impl SequencerFollower {
    pub fn spawn(
        ticks: Subscription<u8>,
        track: Arc<SequencerTrack>,
        sound: Arc<dyn SoundEngineControl>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(Mutex::new(Gate {
            playing: true,
            generation: 0,
        }));
        let ticks = Arc::new(ticks);

        let thread = {
            let stop = stop.clone();
            let gate = gate.clone();
            let ticks = ticks.clone();
            std::thread::Builder::new()
                .name("stepwire-sequencer".into())
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        let generation = gate.lock().generation;
                        let Some(step) = ticks.recv_timeout(Duration::from_millis(50)) else {
                            continue;
                        };
                        let gate = gate.lock();
                        if gate.playing && gate.generation == generation {
                            track.handle_tick(step, sound.as_ref());
                        }
                    }
                })
                .map_err(|e| tracing::error!("failed to spawn sequencer thread: {e}"))
                .ok()
        };

        Self {
            stop,
            gate,
            ticks,
            thread,
        }
    }

    /// Returns once no step is being played. Pending and in-flight ticks
    /// are dropped, so nothing reaches the sound engine until `resume`.
    pub fn pause(&self) {
        let mut gate = self.gate.lock();
        gate.playing = false;
        gate.generation += 1;
        let _ = self.ticks.try_recv();
    }

    pub fn resume(&self) {
        self.gate.lock().playing = true;
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("sequencer thread panicked");
            }
        }
    }
}

impl Drop for SequencerFollower {
    fn drop(&mut self) {
        self.shutdown();
    }
}
