mod dispatcher;
mod resolve;
mod sequencer;
mod sound;

pub use dispatcher::{ClockTickDispatcher, SequencerRouting, TickReport};
pub use resolve::{ControlTarget, Dispatch, resolve, resolve_event, resolve_step};
pub use sequencer::{Pattern, SequencerFollower, SequencerTrack, Step};
pub use sound::{LoggingEngine, SoundEngineControl};

#[cfg(test)]
pub(crate) use sound::testing;
