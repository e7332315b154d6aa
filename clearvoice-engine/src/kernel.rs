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

//! The DSP seam of the render pipeline.
//!
//! The actual suppression algorithm is a vendor concern; the engine only
//! requires the [`AudioKernel`] lifecycle (load weights, open a session at a
//! sample rate, process one staged quantum at a time, close). [`GateKernel`]
//! is the built-in stand-in: an RMS noise gate with attack/release smoothing
//! whose voice-activity mode reports smoothed quantum energy. [`MockKernel`]
//! exists for tests that need to observe invocations or script VAD scores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::quantum::StagingBuffer;

/// What the kernel session was opened for. Mirrors the processor's
/// NC / VAD split: noise cancellation rewrites audio, voice activity only
/// scores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelMode {
    NoiseCancellation,
    VoiceActivity,
}

impl KernelMode {
    pub fn is_vad(self) -> bool {
        matches!(self, KernelMode::VoiceActivity)
    }
}

/// Render-thread resident DSP kernel.
///
/// Calls arrive in lifecycle order: `init_weights`, `open_session`, then
/// `process` once per quantum until `close_session`. `process` must never
/// fail; a stalled render callback would take the whole media session down,
/// so kernels degrade to pass-through instead of erroring.
pub trait AudioKernel: Send {
    /// Loads the opaque model payload.
    fn init_weights(&mut self, weights: &[u8]) -> Result<()>;

    /// Opens a processing session at the given rate.
    fn open_session(&mut self, sample_rate: u32) -> Result<()>;

    /// Processes one staged quantum. The output buffer is adapted to the
    /// input's active channel count. Returns a voice-activity score in
    /// `[0, 1]` when the session was opened in VAD mode, `None` otherwise.
    fn process(&mut self, input: &StagingBuffer, output: &mut StagingBuffer) -> Option<f32>;

    fn close_session(&mut self);

    fn set_logging(&mut self, enabled: bool);
}

/// Builds kernels for the render context. Injected through the session
/// options so tests and embedders can swap the DSP without touching the
/// pipeline.
pub trait KernelFactory: Send + Sync {
    fn create(&self, mode: KernelMode) -> Box<dyn AudioKernel>;
}

const OPEN_RATIO: f32 = 2.0;
const FLOOR_GAIN: f32 = 0.05;
const ATTACK: f32 = 0.2;
const RELEASE: f32 = 0.05;
const FLOOR_RISE: f32 = 0.02;
const VAD_SMOOTHING: f32 = 0.8;
const EPS: f32 = 1e-10;

/// Per-quantum RMS noise gate.
///
/// Tracks a slowly rising noise floor per channel and opens the gate when
/// quantum energy clears the floor by [`OPEN_RATIO`]; the gain ramps with
/// separate attack and release coefficients so the gate never clicks. This
/// is a deliberately small stand-in for the vendor DSP, not a competitor to
/// it.
pub struct GateKernel {
    mode: KernelMode,
    sample_rate: u32,
    opened: bool,
    weights_len: usize,
    logging: bool,
    quantum_count: u64,
    floors: Vec<f32>,
    gains: Vec<f32>,
    vad_score: f32,
}

impl GateKernel {
    pub fn new(mode: KernelMode) -> Self {
        Self {
            mode,
            sample_rate: 0,
            opened: false,
            weights_len: 0,
            logging: false,
            quantum_count: 0,
            floors: Vec::new(),
            gains: Vec::new(),
            vad_score: 0.0,
        }
    }

    fn channel_rms(samples: &[f32]) -> f32 {
        let sum: f32 = samples.iter().map(|s| s * s).sum();
        (sum / samples.len() as f32).sqrt()
    }
}

impl AudioKernel for GateKernel {
    fn init_weights(&mut self, weights: &[u8]) -> Result<()> {
        if weights.is_empty() {
            return Err(EngineError::InvalidState("model payload is empty"));
        }
        self.weights_len = weights.len();
        Ok(())
    }

    fn open_session(&mut self, sample_rate: u32) -> Result<()> {
        if self.weights_len == 0 {
            return Err(EngineError::InvalidState("weights not loaded"));
        }
        self.sample_rate = sample_rate;
        self.opened = true;
        self.floors.clear();
        self.gains.clear();
        self.vad_score = 0.0;
        self.quantum_count = 0;
        Ok(())
    }

    fn process(&mut self, input: &StagingBuffer, output: &mut StagingBuffer) -> Option<f32> {
        let channels = input.active_channels();
        output.adapt_channels(channels);
        if !self.opened || channels == 0 {
            for ch in 0..channels {
                output.channel_mut(ch).copy_from_slice(input.channel(ch));
            }
            return None;
        }

        if self.floors.len() < channels {
            self.floors.resize(channels, 0.0);
            self.gains.resize(channels, 0.0);
        }

        let mut quantum_rms = 0.0f32;
        for ch in 0..channels {
            let rms = Self::channel_rms(input.channel(ch));
            quantum_rms = quantum_rms.max(rms);

            let floor = self.floors[ch];
            self.floors[ch] = if rms < floor {
                rms
            } else {
                floor + (rms - floor) * FLOOR_RISE
            };

            let open = rms > self.floors[ch] * OPEN_RATIO;
            let target = if open { 1.0 } else { FLOOR_GAIN };
            let coeff = if target > self.gains[ch] { ATTACK } else { RELEASE };

            let mut gain = self.gains[ch];
            let input_samples = input.channel(ch);
            let output_samples = output.channel_mut(ch);
            for (out, sample) in output_samples.iter_mut().zip(input_samples.iter()) {
                gain += coeff * (target - gain);
                *out = sample * gain;
            }
            self.gains[ch] = gain;
        }

        self.quantum_count += 1;
        if self.logging && self.quantum_count % 256 == 0 {
            log::debug!(
                "gate: quantum {} rms {:.6} floor {:.6} gain {:.3}",
                self.quantum_count,
                quantum_rms,
                self.floors[0],
                self.gains[0]
            );
        }

        if self.mode.is_vad() {
            let floor = self.floors[0];
            let instant = 1.0 - (floor + EPS) / (quantum_rms + EPS);
            let instant = instant.clamp(0.0, 1.0);
            self.vad_score = VAD_SMOOTHING * self.vad_score + (1.0 - VAD_SMOOTHING) * instant;
            Some(self.vad_score)
        } else {
            None
        }
    }

    fn close_session(&mut self) {
        self.opened = false;
        self.floors.clear();
        self.gains.clear();
    }

    fn set_logging(&mut self, enabled: bool) {
        self.logging = enabled;
    }
}

/// Default factory producing [`GateKernel`]s.
#[derive(Debug, Default, Clone)]
pub struct GateKernelFactory;

impl KernelFactory for GateKernelFactory {
    fn create(&self, mode: KernelMode) -> Box<dyn AudioKernel> {
        Box::new(GateKernel::new(mode))
    }
}

/// Test kernel: applies a flat gain and replays scripted VAD scores, while
/// counting lifecycle calls on shared atomics so tests can observe what the
/// render thread did.
pub struct MockKernel {
    mode: KernelMode,
    gain: f32,
    vad_scores: Vec<f32>,
    next_score: usize,
    counters: MockCounters,
}

impl AudioKernel for MockKernel {
    fn init_weights(&mut self, weights: &[u8]) -> Result<()> {
        if weights.is_empty() {
            return Err(EngineError::InvalidState("model payload is empty"));
        }
        self.counters.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn open_session(&mut self, _sample_rate: u32) -> Result<()> {
        self.counters.open_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn process(&mut self, input: &StagingBuffer, output: &mut StagingBuffer) -> Option<f32> {
        self.counters.process_calls.fetch_add(1, Ordering::SeqCst);
        let channels = input.active_channels();
        output.adapt_channels(channels);
        for ch in 0..channels {
            for (out, sample) in output
                .channel_mut(ch)
                .iter_mut()
                .zip(input.channel(ch).iter())
            {
                *out = sample * self.gain;
            }
        }
        if self.mode.is_vad() {
            let score = if self.vad_scores.is_empty() {
                0.0
            } else {
                let score = self.vad_scores[self.next_score % self.vad_scores.len()];
                self.next_score += 1;
                score
            };
            Some(score)
        } else {
            None
        }
    }

    fn close_session(&mut self) {
        self.counters.close_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn set_logging(&mut self, _enabled: bool) {}
}

#[derive(Debug, Default, Clone)]
pub struct MockCounters {
    pub init_calls: Arc<AtomicUsize>,
    pub open_calls: Arc<AtomicUsize>,
    pub process_calls: Arc<AtomicUsize>,
    pub close_calls: Arc<AtomicUsize>,
}

/// Factory for [`MockKernel`]s. All kernels it creates share one counter
/// set, so multi-lane tests see aggregate call counts.
#[derive(Clone, Default)]
pub struct MockKernelFactory {
    pub gain: f32,
    pub vad_scores: Vec<f32>,
    pub counters: MockCounters,
    created: Arc<AtomicUsize>,
}

impl MockKernelFactory {
    pub fn passthrough() -> Self {
        Self {
            gain: 1.0,
            ..Default::default()
        }
    }

    pub fn with_gain(gain: f32) -> Self {
        Self {
            gain,
            ..Default::default()
        }
    }

    pub fn with_vad_scores(scores: Vec<f32>) -> Self {
        Self {
            gain: 1.0,
            vad_scores: scores,
            ..Default::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl KernelFactory for MockKernelFactory {
    fn create(&self, mode: KernelMode) -> Box<dyn AudioKernel> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockKernel {
            mode,
            gain: self.gain,
            vad_scores: self.vad_scores.clone(),
            next_score: 0,
            counters: self.counters.clone(),
        })
    }
}
