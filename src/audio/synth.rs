use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};

use super::voice::{ADSRConfig, Voice};
use crate::dispatch::SoundEngineControl;

const COMMAND_CAPACITY: usize = 1024;
const MAX_VOICES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SynthCommand {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    AllNotesOff,
}

struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

/// Normalized 0.0 -> 1.0 parameters shared with the audio callback.
pub struct SynthParams {
    cutoff: AtomicF32,
    resonance: AtomicF32,
    main_volume: AtomicF32,
}

impl SynthParams {
    pub fn cutoff(&self) -> f32 {
        self.cutoff.load()
    }

    pub fn resonance(&self) -> f32 {
        self.resonance.load()
    }

    pub fn main_volume(&self) -> f32 {
        self.main_volume.load()
    }
}

/// Control half of the reference synth. Note calls are queued for the
/// audio callback; a full queue drops the call.
pub struct Synth {
    commands: Mutex<HeapProd<SynthCommand>>,
    params: Arc<SynthParams>,
}

impl Synth {
    pub fn new(adsr: ADSRConfig, main_volume: f32) -> (Self, SynthRenderer) {
        let (producer, consumer) = HeapRb::<SynthCommand>::new(COMMAND_CAPACITY).split();
        let params = Arc::new(SynthParams {
            cutoff: AtomicF32::new(1.0),
            resonance: AtomicF32::new(0.0),
            main_volume: AtomicF32::new(main_volume.clamp(0.0, 1.0)),
        });

        let synth = Self {
            commands: Mutex::new(producer),
            params: params.clone(),
        };
        let renderer = SynthRenderer {
            commands: consumer,
            params,
            adsr,
            voices: Vec::with_capacity(MAX_VOICES),
            filter: SvfState::default(),
        };
        (synth, renderer)
    }

    pub fn params(&self) -> &SynthParams {
        &self.params
    }

    fn send(&self, command: SynthCommand) {
        if self.commands.lock().try_push(command).is_err() {
            tracing::warn!(?command, "synth command queue full, dropped");
        }
    }
}

impl SoundEngineControl for Synth {
    fn play_note(&self, note: u8, velocity: u8) {
        self.send(SynthCommand::NoteOn { note, velocity });
    }

    fn stop_note(&self, note: u8) {
        self.send(SynthCommand::NoteOff { note });
    }

    fn set_cutoff(&self, value: f32) {
        self.params.cutoff.store(value);
    }

    fn set_resonance(&self, value: f32) {
        self.params.resonance.store(value);
    }

    fn set_main_volume(&self, value: f32) {
        self.params.main_volume.store(value);
    }

    fn stop_all_notes(&self) {
        self.send(SynthCommand::AllNotesOff);
    }
}

#[derive(Default)]
struct SvfState {
    low: f32,
    band: f32,
}

/// Audio-thread half of the synth, owned by the output callback.
pub struct SynthRenderer {
    commands: HeapCons<SynthCommand>,
    params: Arc<SynthParams>,
    adsr: ADSRConfig,
    voices: Vec<Voice>,
    filter: SvfState,
}

impl SynthRenderer {
    /// Fills an interleaved buffer with `channels` channels.
    pub fn render(&mut self, data: &mut [f32], channels: usize, sample_rate: f32) {
        self.apply_commands();

        let channels = channels.max(1);
        let volume = self.params.main_volume();
        let (f, damping) = filter_coefficients(
            self.params.cutoff(),
            self.params.resonance(),
            sample_rate,
        );

        for frame in data.chunks_mut(channels) {
            let mut dry = 0.0;
            for voice in self.voices.iter_mut() {
                dry += voice.next_sample(&self.adsr, sample_rate);
            }

            // Chamberlin state-variable filter, low-pass output.
            let high = dry - self.filter.low - damping * self.filter.band;
            self.filter.band += f * high;
            self.filter.low += f * self.filter.band;

            let out = (self.filter.low * volume * 0.25).clamp(-1.0, 1.0);
            frame.fill(out);
        }

        let adsr = &self.adsr;
        self.voices.retain(|v| !v.is_finished(adsr));
    }

    fn apply_commands(&mut self) {
        while let Some(command) = self.commands.try_pop() {
            match command {
                SynthCommand::NoteOn { note, velocity } => {
                    if let Some(voice) = self.voices.iter_mut().find(|v| v.note == note) {
                        *voice = Voice::new(note, velocity);
                    } else if self.voices.len() < MAX_VOICES {
                        self.voices.push(Voice::new(note, velocity));
                    }
                }
                SynthCommand::NoteOff { note } => {
                    for voice in self.voices.iter_mut().filter(|v| v.note == note) {
                        voice.release();
                    }
                }
                SynthCommand::AllNotesOff => {
                    for voice in self.voices.iter_mut() {
                        voice.release();
                    }
                }
            }
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }
}

/// Maps normalized cutoff onto 40 Hz .. 20 kHz (kept below a sixth of the
/// sample rate for stability) and resonance onto damping.
fn filter_coefficients(cutoff: f32, resonance: f32, sample_rate: f32) -> (f32, f32) {
    let hz = (40.0 * 2.0_f32.powf(cutoff * 9.0)).min(sample_rate / 6.0);
    let f = 2.0 * (std::f32::consts::PI * hz / sample_rate).sin();
    let damping = 2.0 * (1.0 - resonance * 0.95);
    (f, damping)
}
