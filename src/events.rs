use std::time::Instant;

use crate::dispatch::Step;

/// Number of steps in one sequencer cycle.
pub const STEPS_PER_CYCLE: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MidiEventType {
    NoteOn,
    NoteOff,
    ControlChange,
    PitchBend,
    ProgramChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MidiSource {
    Internal,
    ExternalUsb,
    ExternalBle,
}

/// One musical event waiting for its step.
///
/// For control change the controller number travels in `note_number` and
/// the value in `velocity`; pitch bend and program change carry their
/// value in `velocity` with `note_number` set to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiEvent {
    pub note_number: u8,
    pub velocity: u16,
    pub step_index: u8,
    pub timestamp: Instant,
    pub event_type: MidiEventType,
    pub channel: u8,
    pub source: MidiSource,
}

impl MidiEvent {
    pub fn new(
        event_type: MidiEventType,
        note_number: u8,
        velocity: u16,
        step_index: u8,
        channel: u8,
        source: MidiSource,
        timestamp: Instant,
    ) -> Self {
        Self {
            note_number: note_number & 0x7F,
            velocity: velocity & 0x3FFF,
            step_index: step_index % STEPS_PER_CYCLE,
            timestamp,
            event_type,
            channel: channel & 0x0F,
            source,
        }
    }

    pub fn note_on(note: u8, velocity: u8, step: u8) -> Self {
        Self::new(
            MidiEventType::NoteOn,
            note,
            velocity as u16,
            step,
            0,
            MidiSource::Internal,
            Instant::now(),
        )
    }

    pub fn note_off(note: u8, step: u8) -> Self {
        Self::new(
            MidiEventType::NoteOff,
            note,
            0,
            step,
            0,
            MidiSource::Internal,
            Instant::now(),
        )
    }

    pub fn control_change(controller: u8, value: u8, step: u8) -> Self {
        Self::new(
            MidiEventType::ControlChange,
            controller,
            value as u16,
            step,
            0,
            MidiSource::Internal,
            Instant::now(),
        )
    }

    /// Zero velocity stops a note whatever the declared type says.
    pub fn is_note_off(&self) -> bool {
        self.velocity == 0 || self.event_type == MidiEventType::NoteOff
    }

    pub fn is_note_on(&self) -> bool {
        self.velocity > 0 && self.event_type == MidiEventType::NoteOn
    }
}

/// Anything that can be scheduled on a step, whichever path it came from.
#[derive(Debug, Clone)]
pub enum EventOrigin {
    Hardware(MidiEvent),
    SequencerStep(Step),
}
