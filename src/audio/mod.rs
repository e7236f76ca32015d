mod output;
mod synth;
mod voice;

pub use output::start_output;
pub use synth::{Synth, SynthCommand, SynthParams, SynthRenderer};
pub use voice::{ADSRConfig, EnvelopeState, Voice, midi_to_freq};
