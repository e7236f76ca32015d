use super::sequencer::Step;
use super::sound::SoundEngineControl;
use crate::events::{EventOrigin, MidiEvent, MidiEventType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTarget {
    Cutoff,
    Resonance,
    MainVolume,
}

impl ControlTarget {
    /// Fixed controller map: modwheel, brightness, channel volume.
    pub fn from_cc(controller: u8) -> Option<Self> {
        match controller {
            1 => Some(ControlTarget::Cutoff),
            74 => Some(ControlTarget::Resonance),
            7 => Some(ControlTarget::MainVolume),
            _ => None,
        }
    }
}

/// What a scheduled event does to the sound engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    PlayNote { note: u8, velocity: u8 },
    StopNote { note: u8 },
    Control { target: ControlTarget, value: f32 },
    UnmappedControl { controller: u8 },
    PitchBend { value: u16 },
    ProgramChange { program: u16 },
    /// Sequencer step that is switched off.
    Rest,
}

impl Dispatch {
    pub fn apply(&self, sound: &dyn SoundEngineControl) {
        match *self {
            Dispatch::PlayNote { note, velocity } => sound.play_note(note, velocity),
            Dispatch::StopNote { note } => sound.stop_note(note),
            Dispatch::Control { target, value } => match target {
                ControlTarget::Cutoff => sound.set_cutoff(value),
                ControlTarget::Resonance => sound.set_resonance(value),
                ControlTarget::MainVolume => sound.set_main_volume(value),
            },
            Dispatch::UnmappedControl { controller } => {
                tracing::trace!(controller, "unmapped CC");
            }
            // Reserved: the engine has no pitch bend input yet.
            Dispatch::PitchBend { value } => tracing::trace!(value, "pitch bend"),
            Dispatch::ProgramChange { program } => tracing::debug!(program, "program change"),
            Dispatch::Rest => {}
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Dispatch::Rest)
    }
}

/// Classifies a pool event. Note-off wins over everything, so a zero
/// velocity stops the note whatever type was declared.
pub fn resolve_event(event: &MidiEvent) -> Dispatch {
    if event.is_note_off() {
        return Dispatch::StopNote {
            note: event.note_number,
        };
    }
    match event.event_type {
        MidiEventType::NoteOn => Dispatch::PlayNote {
            note: event.note_number,
            velocity: event.velocity.min(127) as u8,
        },
        MidiEventType::ControlChange => match ControlTarget::from_cc(event.note_number) {
            Some(target) => Dispatch::Control {
                target,
                value: (event.velocity as f32 / 127.0).min(1.0),
            },
            None => Dispatch::UnmappedControl {
                controller: event.note_number,
            },
        },
        MidiEventType::PitchBend => Dispatch::PitchBend {
            value: event.velocity,
        },
        MidiEventType::ProgramChange => Dispatch::ProgramChange {
            program: event.velocity,
        },
        MidiEventType::NoteOff => Dispatch::StopNote {
            note: event.note_number,
        },
    }
}

pub fn resolve_step(step: &Step) -> Dispatch {
    if step.is_on {
        Dispatch::PlayNote {
            note: step.note_pitch.min(127),
            velocity: step.midi_velocity(),
        }
    } else {
        Dispatch::Rest
    }
}

pub fn resolve(origin: &EventOrigin) -> Dispatch {
    match origin {
        EventOrigin::Hardware(event) => resolve_event(event),
        EventOrigin::SequencerStep(step) => resolve_step(step),
    }
}
