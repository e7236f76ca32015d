use crate::{
    dispatch::{
        ClockTickDispatcher, SequencerFollower, SequencerRouting, SequencerTrack,
        SoundEngineControl, Step,
    },
    midi::{DeviceState, HardwareIngest, MidiDeviceInterface},
    notify::Observers,
    settings::Settings,
    timing::{ClockState, EventPool, InternalClock, QuantizeMode, StepQuantizer},
};
use crossbeam::channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

#[derive(Debug, Clone)]
pub enum EngineCommand {
    Start,
    /// Stops the clock, drops pending events and silences the engine.
    Stop,
    SetBpm(f32),
    SetQuantize(bool),
    Clear,
    Panic,
    ConnectMidi,
    ReleaseMidi,
    SetStep { index: u8, step: Step },
    ToggleStep(u8),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineUpdate {
    PlaybackState { playing: bool },
    MidiState { state: DeviceState, device: Option<String> },
    Tempo { bpm: f32 },
    Error { message: String },
}

pub type DeviceFactory = Box<dyn Fn() -> Box<dyn MidiDeviceInterface + Send> + Send>;

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
    pub observers: Arc<Observers>,
    pub pool: Arc<EventPool>,
    pub clock: Arc<ClockState>,
    thread: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn send(&self, command: EngineCommand) {
        if self.command_tx.send(command).is_err() {
            tracing::error!("engine thread is gone");
        }
    }

    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let _ = self.command_tx.send(EngineCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("engine thread panicked");
            }
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.join();
    }
}

pub fn spawn_engine(
    settings: Settings,
    sound: Arc<dyn SoundEngineControl>,
    devices: DeviceFactory,
) -> EngineHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    let pool = Arc::new(EventPool::new());
    let clock = Arc::new(ClockState::new(settings.bpm));
    let observers = Arc::new(Observers::new());

    let shared = Shared {
        pool: pool.clone(),
        clock: clock.clone(),
        observers: observers.clone(),
        sound,
    };

    let thread = std::thread::Builder::new()
        .name("stepwire-engine".into())
        .spawn(move || engine_thread(settings, shared, devices, command_rx, update_tx))
        .map_err(|e| tracing::error!("failed to spawn engine thread: {e}"))
        .ok();

    EngineHandle {
        command_tx,
        update_rx,
        observers,
        pool,
        clock,
        thread,
    }
}

struct Shared {
    pool: Arc<EventPool>,
    clock: Arc<ClockState>,
    observers: Arc<Observers>,
    sound: Arc<dyn SoundEngineControl>,
}

struct EngineState {
    shared: Shared,
    devices: DeviceFactory,
    settings: Settings,
    quantizer: Arc<StepQuantizer>,
    track: Arc<SequencerTrack>,
    dispatcher: Arc<ClockTickDispatcher>,
    ingest: HardwareIngest,
    internal_clock: Option<InternalClock>,
    follower: Option<SequencerFollower>,
}

impl EngineState {
    fn new(settings: Settings, shared: Shared, devices: DeviceFactory) -> Self {
        let quantizer = Arc::new(StepQuantizer::new(
            shared.clock.clone(),
            settings.quantize_mode(),
        ));
        let track = Arc::new(SequencerTrack::new(settings.pattern.clone()));

        let mut dispatcher = ClockTickDispatcher::new(
            shared.pool.clone(),
            shared.clock.clone(),
            shared.sound.clone(),
            shared.observers.clone(),
        );
        let follower = match settings.sequencer_routing {
            SequencerRouting::Unified => {
                dispatcher = dispatcher.with_unified_sequencer(track.clone());
                None
            }
            SequencerRouting::Observer => Some(SequencerFollower::spawn(
                shared.observers.ticks.subscribe(),
                track.clone(),
                shared.sound.clone(),
            )),
        };

        let ingest = build_ingest(&devices, &settings, &shared.pool, &quantizer);

        Self {
            shared,
            devices,
            settings,
            quantizer,
            track,
            dispatcher: Arc::new(dispatcher),
            ingest,
            internal_clock: None,
            follower,
        }
    }

    fn midi_update(&self) -> EngineUpdate {
        EngineUpdate::MidiState {
            state: self.ingest.state(),
            device: self.ingest.device().map(|d| d.name.clone()),
        }
    }

    fn stop_clock(&mut self) {
        if let Some(clock) = self.internal_clock.take() {
            clock.stop();
        }
    }

    /// Stops every source of notes before silencing, so no note-on can
    /// land after the all-notes-off.
    fn silence(&mut self) {
        self.stop_clock();
        if let Some(follower) = &self.follower {
            follower.pause();
        }
        self.shared.pool.clear();
        self.shared.sound.stop_all_notes();
    }

    fn teardown(&mut self) {
        self.ingest.release();
        self.silence();
        if let Some(follower) = self.follower.take() {
            follower.stop();
        }
    }
}

fn build_ingest(
    devices: &DeviceFactory,
    settings: &Settings,
    pool: &Arc<EventPool>,
    quantizer: &Arc<StepQuantizer>,
) -> HardwareIngest {
    HardwareIngest::new(devices(), pool.clone(), quantizer.clone())
        .with_enabled(settings.usb_midi_enabled)
        .with_preferred_device(settings.midi_device.clone())
}

fn engine_thread(
    settings: Settings,
    shared: Shared,
    devices: DeviceFactory,
    command_rx: Receiver<EngineCommand>,
    update_tx: Sender<EngineUpdate>,
) {
    let mut state = EngineState::new(settings, shared, devices);

    loop {
        match command_rx.recv() {
            Ok(EngineCommand::Start) => {
                if let Some(follower) = &state.follower {
                    follower.resume();
                }
                if state.internal_clock.is_none() {
                    let handler = state.dispatcher.clone();
                    state.internal_clock =
                        Some(InternalClock::start(state.shared.clock.clone(), handler));
                }
                let _ = update_tx.send(EngineUpdate::PlaybackState { playing: true });
            }
            Ok(EngineCommand::Stop) => {
                state.silence();
                let _ = update_tx.send(EngineUpdate::PlaybackState { playing: false });
            }
            Ok(EngineCommand::SetBpm(bpm)) => {
                state.shared.clock.set_bpm(bpm);
                let _ = update_tx.send(EngineUpdate::Tempo {
                    bpm: state.shared.clock.bpm(),
                });
            }
            Ok(EngineCommand::SetQuantize(quantize)) => {
                state.quantizer.set_mode(QuantizeMode::from_flag(quantize));
            }
            Ok(EngineCommand::Clear) => state.shared.pool.clear(),
            Ok(EngineCommand::Panic) => {
                state.shared.pool.clear();
                state.track.panic(state.shared.sound.as_ref());
            }
            Ok(EngineCommand::ConnectMidi) => {
                if state.ingest.state() == DeviceState::Closed {
                    state.ingest = build_ingest(
                        &state.devices,
                        &state.settings,
                        &state.shared.pool,
                        &state.quantizer,
                    );
                }
                state.ingest.connect();
                let _ = update_tx.send(state.midi_update());
            }
            Ok(EngineCommand::ReleaseMidi) => {
                state.ingest.release();
                let _ = update_tx.send(state.midi_update());
            }
            Ok(EngineCommand::SetStep { index, step }) => state.track.set_step(index, step),
            Ok(EngineCommand::ToggleStep(index)) => state.track.toggle(index),
            Ok(EngineCommand::Shutdown) | Err(crossbeam::channel::RecvError) => break,
        }
    }

    state.teardown();
    tracing::info!("engine stopped");
}
