use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("MIDI subsystem unavailable: {0}")]
    Init(String),
    #[error("no MIDI input devices found")]
    NoDevices,
    #[error("MIDI device {0} is no longer present")]
    Missing(String),
    #[error("failed to open MIDI device {name}: {reason}")]
    Open { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] ron::Error),
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device")]
    NoOutputDevice,
    #[error("output config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("building output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("starting output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
}
