/// Control surface of the sound engine.
///
/// Calls are fire-and-forget. Implementations are invoked from the tick
/// thread and must not block.
pub trait SoundEngineControl: Send + Sync {
    fn play_note(&self, note: u8, velocity: u8);
    fn stop_note(&self, note: u8);
    fn set_cutoff(&self, value: f32);
    fn set_resonance(&self, value: f32);
    fn set_main_volume(&self, value: f32);

    fn stop_all_notes(&self) {
        for note in 0..=127 {
            self.stop_note(note);
        }
    }
}

/// Engine that only logs, for running without audio output.
pub struct LoggingEngine;

impl SoundEngineControl for LoggingEngine {
    fn play_note(&self, note: u8, velocity: u8) {
        tracing::debug!(note, velocity, "play");
    }

    fn stop_note(&self, note: u8) {
        tracing::trace!(note, "stop");
    }

    fn set_cutoff(&self, value: f32) {
        tracing::debug!(value, "cutoff");
    }

    fn set_resonance(&self, value: f32) {
        tracing::debug!(value, "resonance");
    }

    fn set_main_volume(&self, value: f32) {
        tracing::debug!(value, "main volume");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::SoundEngineControl;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Play(u8, u8),
        Stop(u8),
        Cutoff(f32),
        Resonance(f32),
        MainVolume(f32),
    }

    /// Records every call; optionally panics when asked to play `fail_on`.
    #[derive(Default)]
    pub struct RecordingEngine {
        pub calls: Mutex<Vec<Call>>,
        pub fail_on: Option<u8>,
        /// Time spent inside `play_note` before the call is recorded.
        pub play_delay: Duration,
    }

    impl RecordingEngine {
        pub fn failing_on(note: u8) -> Self {
            Self {
                fail_on: Some(note),
                ..Self::default()
            }
        }

        pub fn slow(play_delay: Duration) -> Self {
            Self {
                play_delay,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    impl SoundEngineControl for RecordingEngine {
        fn play_note(&self, note: u8, velocity: u8) {
            if self.fail_on == Some(note) {
                panic!("engine rejected note {note}");
            }
            if !self.play_delay.is_zero() {
                std::thread::sleep(self.play_delay);
            }
            self.calls.lock().push(Call::Play(note, velocity));
        }

        fn stop_note(&self, note: u8) {
            self.calls.lock().push(Call::Stop(note));
        }

        fn set_cutoff(&self, value: f32) {
            self.calls.lock().push(Call::Cutoff(value));
        }

        fn set_resonance(&self, value: f32) {
            self.calls.lock().push(Call::Resonance(value));
        }

        fn set_main_volume(&self, value: f32) {
            self.calls.lock().push(Call::MainVolume(value));
        }
    }
}
