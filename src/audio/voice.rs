use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ADSRConfig {
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub decay: f32,
    /// 0.0 -> 1.0
    pub sustain: f32,
    /// Seconds
    pub release: f32,
}

impl Default for ADSRConfig {
    fn default() -> Self {
        Self {
            attack: 0.005,
            decay: 0.12,
            sustain: 0.6,
            release: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvelopeState {
    Attack { time: f32 },
    Decay { time: f32 },
    Sustain,
    Release { time: f32 },
}

#[derive(Debug, Clone)]
pub struct Voice {
    pub note: u8,
    pub velocity: u8,
    pub envelope_state: EnvelopeState,
    pub envelope_level: f32,
    /// Level when the release started.
    pub release_from: f32,
    pub phase: f32,
}

impl Voice {
    pub fn new(note: u8, velocity: u8) -> Self {
        Self {
            note,
            velocity,
            envelope_state: EnvelopeState::Attack { time: 0.0 },
            envelope_level: 0.0,
            release_from: 0.0,
            phase: 0.0,
        }
    }

    pub fn release(&mut self) {
        if !matches!(self.envelope_state, EnvelopeState::Release { .. }) {
            self.release_from = self.envelope_level;
            self.envelope_state = EnvelopeState::Release { time: 0.0 };
        }
    }

    pub fn is_finished(&self, adsr: &ADSRConfig) -> bool {
        matches!(self.envelope_state, EnvelopeState::Release { time } if time >= adsr.release)
    }

    /// One naive sawtooth sample, scaled by envelope and velocity.
    pub fn next_sample(&mut self, adsr: &ADSRConfig, sample_rate: f32) -> f32 {
        let out = (self.phase * 2.0 - 1.0) * self.envelope_level * (self.velocity as f32 / 127.0);

        self.phase += midi_to_freq(self.note) / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        advance_envelope(self, adsr, 1.0 / sample_rate);
        out
    }
}

pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

pub fn calculate_envelope(voice: &Voice, adsr: &ADSRConfig) -> f32 {
    match voice.envelope_state {
        EnvelopeState::Attack { time } => {
            if adsr.attack == 0.0 {
                1.0
            } else {
                (time / adsr.attack).min(1.0)
            }
        }
        EnvelopeState::Decay { time } => {
            let decay_progress = if adsr.decay == 0.0 {
                1.0
            } else {
                (time / adsr.decay).min(1.0)
            };
            1.0 - (1.0 - adsr.sustain) * decay_progress
        }
        EnvelopeState::Sustain => adsr.sustain,
        EnvelopeState::Release { time } => {
            let release_progress = if adsr.release == 0.0 {
                1.0
            } else {
                (time / adsr.release).min(1.0)
            };
            voice.release_from * (1.0 - release_progress)
        }
    }
}

pub fn advance_envelope(voice: &mut Voice, adsr: &ADSRConfig, dt: f32) {
    match &mut voice.envelope_state {
        EnvelopeState::Attack { time } => {
            *time += dt;
            if *time >= adsr.attack {
                voice.envelope_state = EnvelopeState::Decay { time: 0.0 };
                voice.envelope_level = 1.0;
                return;
            }
        }
        EnvelopeState::Decay { time } => {
            *time += dt;
            if *time >= adsr.decay {
                voice.envelope_state = EnvelopeState::Sustain;
                voice.envelope_level = adsr.sustain;
                return;
            }
        }
        EnvelopeState::Sustain => {}
        EnvelopeState::Release { time } => {
            *time += dt;
        }
    }
    voice.envelope_level = calculate_envelope(voice, adsr);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adsr() -> ADSRConfig {
        ADSRConfig {
            attack: 0.1,
            decay: 0.1,
            sustain: 0.5,
            release: 0.2,
        }
    }

    #[test]
    fn a4_is_440() {
        assert_eq!(midi_to_freq(69), 440.0);
        assert!((midi_to_freq(81) - 880.0).abs() < 0.01);
    }

    #[test]
    fn envelope_walks_through_stages() {
        let adsr = adsr();
        let mut voice = Voice::new(60, 127);

        advance_envelope(&mut voice, &adsr, 0.05);
        assert!((voice.envelope_level - 0.5).abs() < 1e-6);

        advance_envelope(&mut voice, &adsr, 0.06);
        assert_eq!(voice.envelope_state, EnvelopeState::Decay { time: 0.0 });
        assert_eq!(voice.envelope_level, 1.0);

        advance_envelope(&mut voice, &adsr, 0.1);
        assert_eq!(voice.envelope_state, EnvelopeState::Sustain);
        assert_eq!(voice.envelope_level, 0.5);
    }

    #[test]
    fn release_fades_from_current_level() {
        let adsr = adsr();
        let mut voice = Voice::new(60, 127);
        voice.envelope_state = EnvelopeState::Sustain;
        voice.envelope_level = 0.5;

        voice.release();
        advance_envelope(&mut voice, &adsr, 0.1);
        assert!((voice.envelope_level - 0.25).abs() < 1e-6);
        assert!(!voice.is_finished(&adsr));

        advance_envelope(&mut voice, &adsr, 0.1);
        assert!(voice.is_finished(&adsr));
        assert_eq!(voice.envelope_level, 0.0);
    }
}
