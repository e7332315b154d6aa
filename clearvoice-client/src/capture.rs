/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Local audio acquisition.
//!
//! [`CaptureProfile`] is the constraint set a call hands to whatever produces
//! its microphone track (the `getUserMedia` analog). [`TrackProvider`] is the
//! seam: the toggle flow re-acquires capture through it every time denoising
//! flips, so tests drive a [`SyntheticTrackProvider`] while binaries use the
//! cpal-backed [`MicrophoneTrackProvider`].

use crate::error::Result;
use clearvoice_engine::constants::DEFAULT_SAMPLE_RATE;
use clearvoice_engine::graph::MediaStreamTrack;

#[cfg(not(target_arch = "wasm32"))]
use crate::error::ClientError;
#[cfg(not(target_arch = "wasm32"))]
use clearvoice_engine::graph::AudioTrackWriter;
#[cfg(not(target_arch = "wasm32"))]
use clearvoice_engine::quantum::AudioQuantum;

/// Constraints for acquiring a local audio track.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureProfile {
    /// Requested channel count. The engine pipeline is mono-first.
    pub channel_count: u16,
    pub echo_cancellation: bool,
    pub auto_gain_control: bool,
    pub sample_rate: u32,
    /// Platform noise suppression. Disabled while the engine denoiser owns
    /// the track, on otherwise.
    pub noise_suppression: bool,
    /// Exact device to open; `None` picks the system default.
    pub device_id: Option<String>,
}

impl CaptureProfile {
    /// Profile for a call whose engine denoiser is on (`engine_denoise =
    /// true`) or off. Only `noise_suppression` varies between the two.
    pub fn for_engine_denoise(engine_denoise: bool) -> Self {
        Self {
            channel_count: 1,
            echo_cancellation: true,
            auto_gain_control: false,
            sample_rate: DEFAULT_SAMPLE_RATE,
            noise_suppression: !engine_denoise,
            device_id: None,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

impl Default for CaptureProfile {
    fn default() -> Self {
        Self::for_engine_denoise(false)
    }
}

/// Produces live local audio tracks for a given [`CaptureProfile`].
///
/// Each call returns a fresh track; the provider keeps whatever producer
/// backs it alive until the track is stopped.
pub trait TrackProvider {
    fn acquire(&mut self, profile: &CaptureProfile) -> Result<MediaStreamTrack>;
}

impl<T: TrackProvider + ?Sized> TrackProvider for Box<T> {
    fn acquire(&mut self, profile: &CaptureProfile) -> Result<MediaStreamTrack> {
        (**self).acquire(profile)
    }
}

/// Deterministic sine-tone capture source.
///
/// Stands in for a microphone in tests and demos: every acquired track stays
/// silent until [`pump`](Self::pump) pushes quanta into it, and every
/// requested profile is recorded for inspection.
#[cfg(not(target_arch = "wasm32"))]
pub struct SyntheticTrackProvider {
    frequency_hz: f32,
    amplitude: f32,
    sample_rate: u32,
    phase: f32,
    writers: Vec<AudioTrackWriter>,
    requested: Vec<CaptureProfile>,
}

#[cfg(not(target_arch = "wasm32"))]
impl SyntheticTrackProvider {
    pub fn new(frequency_hz: f32) -> Self {
        Self {
            frequency_hz,
            amplitude: 0.5,
            sample_rate: DEFAULT_SAMPLE_RATE,
            phase: 0.0,
            writers: Vec::new(),
            requested: Vec::new(),
        }
    }

    /// Peak amplitude of the generated tone. Demos drop this near zero to
    /// watch the gate close.
    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude;
    }

    /// Every profile passed to [`acquire`](TrackProvider::acquire), oldest
    /// first.
    pub fn requested_profiles(&self) -> &[CaptureProfile] {
        &self.requested
    }

    /// Pushes `quanta` tone quanta into the most recently acquired track.
    pub fn pump(&mut self, quanta: usize) -> Result<()> {
        let writer = self
            .writers
            .last()
            .ok_or_else(|| ClientError::Capture("no track acquired yet".to_string()))?;
        let step = std::f32::consts::TAU * self.frequency_hz / self.sample_rate as f32;
        let mut phase = self.phase;
        for _ in 0..quanta {
            let mut quantum = AudioQuantum::new(1);
            for sample in quantum.channel_mut(0).iter_mut() {
                *sample = phase.sin() * self.amplitude;
                phase = (phase + step) % std::f32::consts::TAU;
            }
            writer.push(quantum)?;
        }
        self.phase = phase;
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl TrackProvider for SyntheticTrackProvider {
    fn acquire(&mut self, profile: &CaptureProfile) -> Result<MediaStreamTrack> {
        let (writer, track) = MediaStreamTrack::audio();
        self.sample_rate = profile.sample_rate;
        self.requested.push(profile.clone());
        self.writers.push(writer);
        log::debug!(
            "capture: synthetic track {} at {} Hz, platform suppression {}",
            track.id(),
            profile.sample_rate,
            profile.noise_suppression
        );
        Ok(track)
    }
}

#[cfg(all(not(target_arch = "wasm32"), feature = "cpal"))]
pub use self::microphone::MicrophoneTrackProvider;

#[cfg(all(not(target_arch = "wasm32"), feature = "cpal"))]
mod microphone {
    use super::{CaptureProfile, TrackProvider};
    use crate::error::{ClientError, Result};
    use clearvoice_engine::constants::RENDER_QUANTUM_FRAMES;
    use clearvoice_engine::graph::MediaStreamTrack;
    use clearvoice_engine::quantum::AudioQuantum;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    /// cpal-backed microphone capture.
    ///
    /// Opens an input stream per acquired track, downmixes the device's
    /// native channel layout to mono and re-chunks the callback buffers into
    /// render quanta. Streams stay open until [`release`](Self::release) or
    /// drop.
    pub struct MicrophoneTrackProvider {
        device_pattern: Option<String>,
        streams: Vec<cpal::Stream>,
    }

    impl MicrophoneTrackProvider {
        /// `device_pattern` is a case-insensitive substring match against
        /// device names; `None` uses the system default input.
        pub fn new(device_pattern: Option<String>) -> Self {
            Self {
                device_pattern,
                streams: Vec::new(),
            }
        }

        /// Stops every input stream this provider opened.
        pub fn release(&mut self) {
            self.streams.clear();
        }

        pub fn list_input_devices() -> Result<Vec<String>> {
            let host = cpal::default_host();
            let devices = host
                .input_devices()
                .map_err(|e| ClientError::Capture(format!("enumerate input devices: {e}")))?;
            Ok(devices.filter_map(|d| d.name().ok()).collect())
        }
    }

    impl TrackProvider for MicrophoneTrackProvider {
        fn acquire(&mut self, profile: &CaptureProfile) -> Result<MediaStreamTrack> {
            let host = cpal::default_host();
            let pattern = profile
                .device_id
                .as_deref()
                .or(self.device_pattern.as_deref());
            let device = resolve_input_device(&host, pattern)?;
            let config = resolve_input_config(&device, profile.sample_rate)?;
            let channels = usize::from(config.channels()).max(1);
            log::info!(
                "capture: opening {:?} at {} Hz, {} channel(s)",
                device.name().unwrap_or_else(|_| "unknown".to_string()),
                config.sample_rate().0,
                channels
            );

            let (writer, track) = MediaStreamTrack::audio();
            let mut pending: Vec<f32> = Vec::with_capacity(RENDER_QUANTUM_FRAMES * 4);
            let stream = device
                .build_input_stream(
                    &config.into(),
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        for frame in data.chunks_exact(channels) {
                            pending.push(frame.iter().sum::<f32>() / channels as f32);
                        }
                        while pending.len() >= RENDER_QUANTUM_FRAMES {
                            let quantum =
                                AudioQuantum::from_planar(1, &pending[..RENDER_QUANTUM_FRAMES]);
                            pending.drain(..RENDER_QUANTUM_FRAMES);
                            if writer.push(quantum).is_err() {
                                // Track stopped; drop the rest of this buffer.
                                return;
                            }
                        }
                    },
                    |err| log::error!("capture: input stream error: {err}"),
                    None,
                )
                .map_err(|e| ClientError::Capture(format!("build input stream: {e}")))?;
            stream
                .play()
                .map_err(|e| ClientError::Capture(format!("start input stream: {e}")))?;
            self.streams.push(stream);
            Ok(track)
        }
    }

    fn resolve_input_device(host: &cpal::Host, pattern: Option<&str>) -> Result<cpal::Device> {
        let Some(pattern) = pattern else {
            return host
                .default_input_device()
                .ok_or_else(|| ClientError::Capture("no default input device".to_string()));
        };
        let needle = pattern.to_lowercase();
        let devices = host
            .input_devices()
            .map_err(|e| ClientError::Capture(format!("enumerate input devices: {e}")))?;
        for device in devices {
            let matches = device
                .name()
                .map(|name| name.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if matches {
                return Ok(device);
            }
        }
        Err(ClientError::Capture(format!(
            "no input device matches {pattern:?}"
        )))
    }

    fn resolve_input_config(
        device: &cpal::Device,
        desired_rate: u32,
    ) -> Result<cpal::SupportedStreamConfig> {
        let ranges = device
            .supported_input_configs()
            .map_err(|e| ClientError::Capture(format!("query input configs: {e}")))?;
        for range in ranges {
            if range.sample_format() == cpal::SampleFormat::F32
                && range.min_sample_rate().0 <= desired_rate
                && desired_rate <= range.max_sample_rate().0
            {
                return Ok(range.with_sample_rate(cpal::SampleRate(desired_rate)));
            }
        }
        let fallback = device
            .default_input_config()
            .map_err(|e| ClientError::Capture(format!("query default input config: {e}")))?;
        log::warn!(
            "capture: no f32 input config at {desired_rate} Hz, falling back to {} Hz",
            fallback.sample_rate().0
        );
        Ok(fallback)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use clearvoice_engine::graph::TrackKind;

    #[test]
    fn engine_denoise_turns_platform_suppression_off() {
        let engine_on = CaptureProfile::for_engine_denoise(true);
        assert!(!engine_on.noise_suppression);

        let engine_off = CaptureProfile::for_engine_denoise(false);
        assert!(engine_off.noise_suppression);

        // Everything else is shared between the two profiles.
        assert_eq!(engine_on.channel_count, 1);
        assert!(engine_on.echo_cancellation);
        assert!(!engine_on.auto_gain_control);
        assert_eq!(engine_on.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(engine_on.device_id, None);
        assert_eq!(engine_on.channel_count, engine_off.channel_count);
        assert_eq!(engine_on.sample_rate, engine_off.sample_rate);
    }

    #[test]
    fn with_device_requests_an_exact_device() {
        let profile = CaptureProfile::default().with_device("usb-mic");
        assert_eq!(profile.device_id.as_deref(), Some("usb-mic"));
    }

    #[test]
    fn synthetic_provider_streams_tone_quanta() {
        let mut provider = SyntheticTrackProvider::new(440.0);
        let track = provider
            .acquire(&CaptureProfile::for_engine_denoise(true))
            .unwrap();
        assert_eq!(track.kind(), TrackKind::Audio);
        assert!(track.is_live());
        assert_eq!(provider.requested_profiles().len(), 1);
        assert!(!provider.requested_profiles()[0].noise_suppression);

        let quanta = track.quanta().unwrap();
        provider.pump(3).unwrap();
        for _ in 0..3 {
            let quantum = quanta.recv().unwrap();
            assert_eq!(quantum.channels(), 1);
            assert!(quantum.channel(0).iter().any(|s| s.abs() > 0.01));
        }
    }

    #[test]
    fn pump_without_a_track_is_an_error() {
        let mut provider = SyntheticTrackProvider::new(440.0);
        assert!(matches!(provider.pump(1), Err(ClientError::Capture(_))));
    }

    #[test]
    fn pump_fails_once_the_track_stops() {
        let mut provider = SyntheticTrackProvider::new(440.0);
        let track = provider.acquire(&CaptureProfile::default()).unwrap();
        provider.pump(1).unwrap();
        track.stop();
        assert!(provider.pump(1).is_err());
    }
}
