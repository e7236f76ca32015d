pub mod audio;
pub mod dispatch;
mod engine;
pub mod error;
pub mod events;
pub mod midi;
pub mod notify;
mod settings;
pub mod timing;

pub use dispatch::{ClockTickDispatcher, SoundEngineControl};
pub use engine::{DeviceFactory, EngineCommand, EngineHandle, EngineUpdate, spawn_engine};
pub use events::{EventOrigin, MidiEvent, MidiEventType, MidiSource, STEPS_PER_CYCLE};
pub use settings::Settings;
pub use timing::{ClockState, EventPool, StepQuantizer};
