use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{
    audio::ADSRConfig,
    dispatch::{Pattern, SequencerRouting},
    error::SettingsError,
    timing::{DEFAULT_BPM, QuantizeMode},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bpm: f32,
    pub sample_rate: u32,
    pub output_volume: f32,
    /// Snap external MIDI to the step grid instead of the current step.
    pub quantize_midi: bool,
    pub usb_midi_enabled: bool,
    /// Substring of the preferred input's name.
    pub midi_device: Option<String>,
    pub sequencer_routing: SequencerRouting,
    pub adsr: ADSRConfig,
    pub pattern: Pattern,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            sample_rate: 44_100,
            output_volume: 0.8,
            quantize_midi: true,
            usb_midi_enabled: true,
            midi_device: None,
            sequencer_routing: SequencerRouting::default(),
            adsr: ADSRConfig::default(),
            pattern: Pattern::default(),
        }
    }
}

impl Settings {
    pub fn quantize_mode(&self) -> QuantizeMode {
        QuantizeMode::from_flag(self.quantize_midi)
    }

    pub fn from_ron(text: &str) -> Result<Self, SettingsError> {
        Ok(ron::from_str(text)?)
    }

    pub fn to_ron(&self) -> Result<String, SettingsError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// A missing file gives the defaults; a broken one is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        match Self::load(path) {
            Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no settings file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_in_defaults() {
        let settings = Settings::from_ron("(bpm: 96.0, quantize_midi: false)").unwrap();
        assert_eq!(settings.bpm, 96.0);
        assert_eq!(settings.quantize_mode(), QuantizeMode::CurrentStep);
        assert!(settings.usb_midi_enabled);
        assert_eq!(settings.pattern.steps().len(), 16);
    }

    #[test]
    fn routing_and_pattern_parse() {
        let settings = Settings::from_ron(
            r#"(
                sequencer_routing: Unified,
                midi_device: Some("APC"),
                pattern: [(id: 0, is_on: true, note_pitch: 48, velocity: 1.0, free_value: 0.5)],
            )"#,
        )
        .unwrap();
        assert_eq!(settings.sequencer_routing, SequencerRouting::Unified);
        assert_eq!(settings.midi_device.as_deref(), Some("APC"));
        assert!(settings.pattern.step(0).is_on);
        assert_eq!(settings.pattern.step(0).note_pitch, 48);
        assert_eq!(settings.pattern.steps().len(), 16);
    }

    #[test]
    fn serialized_settings_parse_back() {
        let mut settings = Settings::default();
        settings.bpm = 133.0;
        settings.midi_device = Some("Launchkey".into());
        let text = settings.to_ron().unwrap();
        assert_eq!(Settings::from_ron(&text).unwrap(), settings);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            Settings::from_ron("(bpm: \"fast\")"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("stepwire-definitely-missing/settings.ron");
        assert_eq!(Settings::load_or_default(&path).unwrap(), Settings::default());
    }
}
