use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::synth::SynthRenderer;
use crate::error::AudioError;

/// Opens the default output device and renders `renderer` into it until
/// the returned stream is dropped. The device's own rate wins over
/// `requested_rate`.
pub fn start_output(
    mut renderer: SynthRenderer,
    requested_rate: u32,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(AudioError::NoOutputDevice)?;
    let config = device.default_output_config()?;
    let stream_config: cpal::StreamConfig = config.into();

    let channels = stream_config.channels as usize;
    let sample_rate = render_rate(requested_rate, stream_config.sample_rate) as f32;
    tracing::info!(channels, sample_rate, "audio output");

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            renderer.render(data, channels, sample_rate);
        },
        |err| tracing::error!("audio stream error: {err}"),
        None,
    )?;

    stream.play()?;
    Ok(stream)
}

fn render_rate(requested: u32, device: cpal::SampleRate) -> u32 {
    if requested != device {
        tracing::warn!(requested, device, "output device runs at a different sample rate");
    }
    device
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_rate_drives_rendering() {
        assert_eq!(render_rate(44_100, 48_000), 48_000);
        assert_eq!(render_rate(48_000, 48_000), 48_000);
    }
}
