use crate::events::MidiEventType;

/// A channel message decoded from raw bytes, before it has a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedMessage {
    pub event_type: MidiEventType,
    pub channel: u8,
    pub note_number: u8,
    pub value: u16,
}

/// Decodes the first channel message in `bytes`.
///
/// Returns `None` for empty or truncated packets and for status bytes this
/// subsystem does not schedule (sysex, clock, aftertouch).
pub fn parse_message(bytes: &[u8]) -> Option<ParsedMessage> {
    let status = *bytes.first()?;
    let channel = status & 0x0F;
    let data = |i: usize| bytes.get(i).map(|b| b & 0x7F);

    let (event_type, note_number, value) = match status & 0xF0 {
        0x90 => (MidiEventType::NoteOn, data(1)?, data(2)? as u16),
        0x80 => {
            data(2)?;
            (MidiEventType::NoteOff, data(1)?, 0)
        }
        0xB0 => (MidiEventType::ControlChange, data(1)?, data(2)? as u16),
        0xE0 => {
            let lsb = data(1)? as u16;
            let msb = data(2)? as u16;
            (MidiEventType::PitchBend, 0, (msb << 7) | lsb)
        }
        0xC0 => (MidiEventType::ProgramChange, 0, data(1)? as u16),
        _ => return None,
    };

    Some(ParsedMessage {
        event_type,
        channel,
        note_number,
        value,
    })
}

/// Like [`parse_message`] but on the `offset..offset + count` window of a
/// larger buffer. A window that does not fit the buffer yields `None`.
pub fn parse_packet(bytes: &[u8], offset: usize, count: usize) -> Option<ParsedMessage> {
    let end = offset.checked_add(count)?;
    parse_message(bytes.get(offset..end)?)
}
