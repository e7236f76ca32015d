use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::resolve::resolve;
use super::sequencer::SequencerTrack;
use super::sound::SoundEngineControl;
use crate::events::{EventOrigin, STEPS_PER_CYCLE};
use crate::notify::Observers;
use crate::timing::{ClockState, EventPool, TickHandler};

/// Ticks slower than this get a warning; a 16th at 300 BPM is 50 ms.
const TICK_BUDGET: Duration = Duration::from_millis(1);

/// How sequencer steps reach the sound engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SequencerRouting {
    /// A follower thread reacts to the tick broadcast.
    #[default]
    Observer,
    /// The dispatcher resolves the step together with pool events.
    Unified,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub step: u8,
    /// Events taken out of the pool.
    pub drained: usize,
    /// Events handed to the sound engine, including failed ones.
    pub dispatched: usize,
    pub failed: usize,
}

/// The only consumer of the event pool. Called once per step boundary on
/// the clock's thread.
pub struct ClockTickDispatcher {
    pool: Arc<EventPool>,
    clock: Arc<ClockState>,
    sound: Arc<dyn SoundEngineControl>,
    observers: Arc<Observers>,
    sequencer: Option<Arc<SequencerTrack>>,
}

impl ClockTickDispatcher {
    pub fn new(
        pool: Arc<EventPool>,
        clock: Arc<ClockState>,
        sound: Arc<dyn SoundEngineControl>,
        observers: Arc<Observers>,
    ) -> Self {
        Self {
            pool,
            clock,
            sound,
            observers,
            sequencer: None,
        }
    }

    /// Resolves `track`'s steps inside `on_tick` alongside pool events.
    pub fn with_unified_sequencer(mut self, track: Arc<SequencerTrack>) -> Self {
        self.sequencer = Some(track);
        self
    }

    /// Drains the pool for `step`, plays what was drained and announces the
    /// tick. Steps are taken as given; no ordering between calls is assumed.
    pub fn on_tick(&self, step: u8, bpm: f32) -> TickReport {
        let started = Instant::now();
        let step = step % STEPS_PER_CYCLE;
        self.clock.observe_tick(step, bpm);

        let events = self.pool.drain_for_step(step);
        let mut report = TickReport {
            step,
            drained: events.len(),
            ..TickReport::default()
        };

        let mut batch: Vec<EventOrigin> = events.into_iter().map(EventOrigin::Hardware).collect();
        if let Some(track) = &self.sequencer {
            batch.push(EventOrigin::SequencerStep(track.step(step)));
        }

        let mut pool_activity = false;
        for origin in &batch {
            let dispatch = resolve(origin);
            if dispatch.is_rest() {
                continue;
            }
            report.dispatched += 1;
            pool_activity |= matches!(origin, EventOrigin::Hardware(_));

            let sound = self.sound.as_ref();
            match catch_unwind(AssertUnwindSafe(|| dispatch.apply(sound))) {
                Ok(()) => {
                    if let (EventOrigin::SequencerStep(_), Some(track)) =
                        (origin, &self.sequencer)
                    {
                        track.note_played(&dispatch);
                    }
                }
                Err(payload) => {
                    report.failed += 1;
                    tracing::error!(
                        step,
                        ?dispatch,
                        "sound engine failed: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        if pool_activity {
            self.observers.activity.publish(true);
        }
        self.observers.ticks.publish(step);

        let elapsed = started.elapsed();
        if elapsed > TICK_BUDGET {
            tracing::warn!(step, ?elapsed, "tick over budget");
        }
        tracing::trace!(step, drained = report.drained, dispatched = report.dispatched, "tick");
        report
    }
}

impl TickHandler for ClockTickDispatcher {
    fn on_tick(&self, step: u8, bpm: f32) {
        // Nothing may unwind into the clock source.
        if catch_unwind(AssertUnwindSafe(|| ClockTickDispatcher::on_tick(self, step, bpm))).is_err()
        {
            tracing::error!(step, "tick handler panicked");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::super::sequencer::Step;
    use super::super::sound::testing::{Call, RecordingEngine};
    use super::*;
    use crate::events::{MidiEvent, MidiEventType, MidiSource};

    struct Fixture {
        pool: Arc<EventPool>,
        clock: Arc<ClockState>,
        engine: Arc<RecordingEngine>,
        observers: Arc<Observers>,
        dispatcher: ClockTickDispatcher,
    }

    fn fixture_with(engine: RecordingEngine) -> Fixture {
        let pool = Arc::new(EventPool::new());
        let clock = Arc::new(ClockState::default());
        let engine = Arc::new(engine);
        let observers = Arc::new(Observers::new());
        let dispatcher = ClockTickDispatcher::new(
            pool.clone(),
            clock.clone(),
            engine.clone(),
            observers.clone(),
        );
        Fixture {
            pool,
            clock,
            engine,
            observers,
            dispatcher,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingEngine::default())
    }

    #[test]
    fn scenario_drain_then_tick() {
        let f = fixture();
        let a = MidiEvent::note_on(60, 100, 3);
        let b = MidiEvent::note_on(62, 90, 3);
        let off = MidiEvent::note_off(60, 5);
        f.pool.enqueue(a);
        f.pool.enqueue(b);
        f.pool.enqueue(off);

        let before = f.pool.size();
        assert_eq!(f.pool.drain_for_step(3), vec![a, b]);
        assert_eq!(f.pool.size(), before - 2);

        let report = f.dispatcher.on_tick(5, 120.0);
        assert_eq!(report.dispatched, 1);
        assert_eq!(f.engine.calls(), vec![Call::Stop(60)]);
    }

    #[test]
    fn events_dispatch_in_enqueue_order() {
        let f = fixture();
        f.pool.enqueue(MidiEvent::note_on(60, 100, 0));
        f.pool.enqueue(MidiEvent::control_change(7, 127, 0));
        f.pool.enqueue(MidiEvent::note_off(60, 0));
        f.dispatcher.on_tick(0, 120.0);
        assert_eq!(
            f.engine.calls(),
            vec![Call::Play(60, 100), Call::MainVolume(1.0), Call::Stop(60)]
        );
        assert!(f.pool.is_empty());
    }

    #[test]
    fn unmapped_controller_makes_no_call() {
        let f = fixture();
        f.pool.enqueue(MidiEvent::control_change(64, 127, 1));
        let report = f.dispatcher.on_tick(1, 120.0);
        assert_eq!(report.dispatched, 1);
        assert!(f.engine.calls().is_empty());
    }

    #[test]
    fn tick_is_published_even_when_empty() {
        let f = fixture();
        let ticks = f.observers.ticks.subscribe();
        let activity = f.observers.activity.subscribe();

        f.dispatcher.on_tick(7, 120.0);
        assert_eq!(ticks.try_recv(), Some(7));
        assert_eq!(activity.try_recv(), None);

        f.pool.enqueue(MidiEvent::note_on(60, 100, 8));
        f.dispatcher.on_tick(8, 120.0);
        assert_eq!(ticks.try_recv(), Some(8));
        assert_eq!(activity.try_recv(), Some(true));
    }

    #[test]
    fn failing_event_does_not_stop_the_batch() {
        let f = fixture_with(RecordingEngine::failing_on(61));
        f.pool.enqueue(MidiEvent::note_on(60, 100, 2));
        f.pool.enqueue(MidiEvent::note_on(61, 100, 2));
        f.pool.enqueue(MidiEvent::note_on(62, 100, 2));
        let ticks = f.observers.ticks.subscribe();

        let report = f.dispatcher.on_tick(2, 120.0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 3);
        assert_eq!(f.engine.calls(), vec![Call::Play(60, 100), Call::Play(62, 100)]);
        assert_eq!(ticks.try_recv(), Some(2));
    }

    #[test]
    fn out_of_order_ticks_use_given_step() {
        let f = fixture();
        f.pool.enqueue(MidiEvent::note_on(60, 100, 9));
        f.pool.enqueue(MidiEvent::note_on(61, 100, 2));

        f.dispatcher.on_tick(9, 120.0);
        f.dispatcher.on_tick(2, 120.0);
        assert_eq!(f.engine.calls(), vec![Call::Play(60, 100), Call::Play(61, 100)]);
        assert_eq!(f.clock.current_step(), 2);
    }

    #[test]
    fn out_of_range_step_wraps() {
        let f = fixture();
        f.pool.enqueue(MidiEvent::note_on(60, 100, 1));
        let report = f.dispatcher.on_tick(17, 120.0);
        assert_eq!(report.step, 1);
        assert_eq!(report.drained, 1);
    }

    #[test]
    fn tick_records_tempo_on_clock() {
        let f = fixture();
        f.dispatcher.on_tick(4, 0.0);
        assert_eq!(f.clock.bpm(), crate::timing::MIN_BPM);
        f.dispatcher.on_tick(5, 98.0);
        assert_eq!(f.clock.bpm(), 98.0);
    }

    #[test]
    fn zero_velocity_note_on_from_hardware_stops() {
        let f = fixture();
        f.pool.enqueue(MidiEvent::new(
            MidiEventType::NoteOn,
            64,
            0,
            6,
            0,
            MidiSource::ExternalUsb,
            Instant::now(),
        ));
        f.dispatcher.on_tick(6, 120.0);
        assert_eq!(f.engine.calls(), vec![Call::Stop(64)]);
    }

    #[test]
    fn unified_routing_plays_sequencer_after_pool_events() {
        let f = fixture();
        let track = Arc::new(SequencerTrack::default());
        track.set_step(
            3,
            Step {
                is_on: true,
                note_pitch: 48,
                velocity: 1.0,
                ..Step::new(3)
            },
        );
        let dispatcher = ClockTickDispatcher::new(
            f.pool.clone(),
            f.clock.clone(),
            f.engine.clone(),
            f.observers.clone(),
        )
        .with_unified_sequencer(track.clone());
        let activity = f.observers.activity.subscribe();

        f.pool.enqueue(MidiEvent::note_on(60, 100, 3));
        let report = dispatcher.on_tick(3, 120.0);
        assert_eq!(report.dispatched, 2);
        assert_eq!(f.engine.calls(), vec![Call::Play(60, 100), Call::Play(48, 127)]);
        assert_eq!(track.last_note(), Some(48));
        assert_eq!(activity.try_recv(), Some(true));

        // Off steps are rests, not activity.
        let report = dispatcher.on_tick(4, 120.0);
        assert_eq!(report.dispatched, 0);
        assert_eq!(activity.try_recv(), None);

        // Neither is a sequencer note on its own.
        let report = dispatcher.on_tick(3, 120.0);
        assert_eq!(report.dispatched, 1);
        assert_eq!(f.engine.calls().last(), Some(&Call::Play(48, 127)));
        assert_eq!(activity.try_recv(), None);
    }

    #[test]
    fn unified_sequencer_failure_is_isolated() {
        let f = fixture_with(RecordingEngine::failing_on(48));
        let track = Arc::new(SequencerTrack::default());
        track.set_step(
            0,
            Step {
                is_on: true,
                note_pitch: 48,
                ..Step::new(0)
            },
        );
        let dispatcher = ClockTickDispatcher::new(
            f.pool.clone(),
            f.clock.clone(),
            f.engine.clone(),
            f.observers.clone(),
        )
        .with_unified_sequencer(track.clone());
        let ticks = f.observers.ticks.subscribe();

        let report = dispatcher.on_tick(0, 120.0);
        assert_eq!(report.failed, 1);
        assert_eq!(track.last_note(), None);
        assert_eq!(ticks.try_recv(), Some(0));
    }

    #[test]
    fn trait_entry_point_swallows_everything() {
        let f = fixture_with(RecordingEngine::failing_on(60));
        f.pool.enqueue(MidiEvent::note_on(60, 100, 0));
        let handler: &dyn TickHandler = &f.dispatcher;
        handler.on_tick(0, 120.0);
        assert!(f.pool.is_empty());
    }

    #[test]
    fn clear_then_ticks_deliver_nothing() {
        let f = fixture();
        for step in 0..STEPS_PER_CYCLE {
            f.pool.enqueue(MidiEvent::note_on(60 + step, 100, step));
        }
        f.pool.clear();
        for step in 0..STEPS_PER_CYCLE {
            assert_eq!(f.dispatcher.on_tick(step, 120.0).drained, 0);
        }
        assert!(f.engine.calls().is_empty());
    }
}
