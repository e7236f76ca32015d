mod clock;
mod driver;
mod pool;
mod quantizer;

pub use clock::{ClockState, DEFAULT_BPM, MIN_BPM, clamp_bpm, step_duration_ms};
pub use driver::{InternalClock, TickHandler};
pub use pool::EventPool;
pub use quantizer::{QuantizeMode, StepQuantizer, quantize};
