//! # Audio Capture Module
//!
//! Streams the default input device into a [`SampleSink`] using CPAL
//! (Cross-Platform Audio Library). Multi-channel input is averaged down to
//! mono inside the callback before it is handed on.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use log::{error, info};
use tuner_core::SampleSink;

/// Samples reserved for the mono mix-down, enough for typical callback sizes.
const MIX_CAPACITY: usize = 8192;

/// Starts audio capture from the default input device.
///
/// Every callback block is forwarded to `sink`, which must not block.
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Audio stream handle and actual sample rate
/// * `Err(e)` - No input device or no 32-bit float format available
pub fn start_audio_capture<S>(sink: Arc<S>, target_rate: u32) -> Result<(cpal::Stream, u32)>
where
    S: SampleSink + 'static,
{
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, target_rate)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = target_rate.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
    let sample_rate = config.sample_rate().0;
    let channels = usize::from(config.channels()).max(1);
    let config: cpal::StreamConfig = config.into();

    info!("Selected sample rate: {sample_rate} Hz, {channels} channel(s)");

    let err_fn = |err| error!("An error occurred on the audio stream: {err}");

    // Reused across callbacks; only grows if a callback exceeds MIX_CAPACITY.
    let mut mono = Vec::with_capacity(MIX_CAPACITY);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if channels == 1 {
                sink.feed(data, sample_rate);
                return;
            }
            mono.clear();
            mono.extend(
                data.chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
            sink.feed(&mono, sample_rate);
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Picks the 32-bit float configuration closest to `target_rate`,
/// preferring mono over multi-channel input.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let rate_diff = if (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate) {
                0
            } else {
                let min_diff = c.min_sample_rate().0.abs_diff(target_rate);
                let max_diff = c.max_sample_rate().0.abs_diff(target_rate);
                min_diff.min(max_diff)
            };
            (c.channels() != 1, rate_diff)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleFormat, SampleRate, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn test_prefers_mono_f32() {
        let configs = vec![
            range(2, 44100, 48000, SampleFormat::F32),
            range(1, 44100, 48000, SampleFormat::I16),
            range(1, 8000, 96000, SampleFormat::F32),
        ];
        let picked = find_supported_config(configs, 44100).unwrap();
        assert_eq!(picked.channels(), 1);
        assert_eq!(picked.sample_format(), SampleFormat::F32);
    }

    #[test]
    fn test_falls_back_to_stereo_and_nearest_rate() {
        let configs = vec![
            range(2, 96000, 96000, SampleFormat::F32),
            range(2, 48000, 48000, SampleFormat::F32),
            range(1, 44100, 44100, SampleFormat::I16),
        ];
        let picked = find_supported_config(configs, 44100).unwrap();
        assert_eq!(picked.channels(), 2);
        assert_eq!(picked.max_sample_rate().0, 48000);
    }

    #[test]
    fn test_no_float_format() {
        let configs = vec![range(1, 44100, 44100, SampleFormat::I16)];
        assert!(find_supported_config(configs, 44100).is_none());
    }
}
