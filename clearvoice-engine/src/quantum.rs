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

//! Fixed-size audio blocks exchanged with the render pipeline.
//!
//! [`AudioQuantum`] is one render quantum of planar f32 audio
//! ([`RENDER_QUANTUM_FRAMES`] frames per channel). [`StagingBuffer`] is the
//! renderer-side scratch area the kernel reads and writes; it is allocated
//! once for [`MAX_CHANNEL_COUNT`] channels and only its active prefix is
//! touched afterwards, so a channel-layout change mid-stream never
//! reallocates on the render path.

use crate::constants::{MAX_CHANNEL_COUNT, RENDER_QUANTUM_FRAMES};

/// One render quantum of planar audio: `channels` runs of
/// [`RENDER_QUANTUM_FRAMES`] samples, channel-major.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioQuantum {
    channels: usize,
    samples: Vec<f32>,
}

impl AudioQuantum {
    /// Silent quantum with the given channel count.
    pub fn new(channels: usize) -> Self {
        assert!(channels > 0 && channels <= MAX_CHANNEL_COUNT);
        Self {
            channels,
            samples: vec![0.0; channels * RENDER_QUANTUM_FRAMES],
        }
    }

    /// Builds a quantum from channel-major samples. The slice length must be
    /// a whole number of channels.
    pub fn from_planar(channels: usize, samples: &[f32]) -> Self {
        assert_eq!(samples.len(), channels * RENDER_QUANTUM_FRAMES);
        let mut q = Self::new(channels);
        q.samples.copy_from_slice(samples);
        q
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        RENDER_QUANTUM_FRAMES
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        assert!(channel < self.channels);
        let start = channel * RENDER_QUANTUM_FRAMES;
        &self.samples[start..start + RENDER_QUANTUM_FRAMES]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        assert!(channel < self.channels);
        let start = channel * RENDER_QUANTUM_FRAMES;
        &mut self.samples[start..start + RENDER_QUANTUM_FRAMES]
    }

    /// Overwrites every sample with the other quantum's. Channel counts must
    /// match; the pass-through path relies on this being bit-exact.
    pub fn copy_from(&mut self, other: &AudioQuantum) {
        assert_eq!(self.channels, other.channels);
        self.samples.copy_from_slice(&other.samples);
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(0.0);
    }
}

/// Pre-allocated renderer scratch buffer.
///
/// Capacity is fixed at [`MAX_CHANNEL_COUNT`] × [`RENDER_QUANTUM_FRAMES`];
/// [`adapt_channels`](Self::adapt_channels) moves the active prefix without
/// touching the allocation, mirroring how the worklet's heap buffers adapt
/// to the per-quantum channel count.
#[derive(Debug)]
pub struct StagingBuffer {
    active_channels: usize,
    samples: Vec<f32>,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self {
            active_channels: 0,
            samples: vec![0.0; MAX_CHANNEL_COUNT * RENDER_QUANTUM_FRAMES],
        }
    }

    /// Sets the channel count for the current quantum. Counts above
    /// [`MAX_CHANNEL_COUNT`] are clamped; the allocation is never resized.
    pub fn adapt_channels(&mut self, channels: usize) {
        self.active_channels = channels.min(MAX_CHANNEL_COUNT);
    }

    pub fn active_channels(&self) -> usize {
        self.active_channels
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        assert!(channel < self.active_channels);
        let start = channel * RENDER_QUANTUM_FRAMES;
        &self.samples[start..start + RENDER_QUANTUM_FRAMES]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        assert!(channel < self.active_channels);
        let start = channel * RENDER_QUANTUM_FRAMES;
        &mut self.samples[start..start + RENDER_QUANTUM_FRAMES]
    }

    /// Copies a quantum into the active prefix, adapting the channel count
    /// first.
    pub fn load(&mut self, input: &AudioQuantum) {
        self.adapt_channels(input.channels());
        for ch in 0..self.active_channels {
            self.channel_mut(ch).copy_from_slice(input.channel(ch));
        }
    }

    /// Copies the active prefix out into a quantum with the same channel
    /// count.
    pub fn store(&self, output: &mut AudioQuantum) {
        assert_eq!(self.active_channels, output.channels());
        for ch in 0..self.active_channels {
            output.channel_mut(ch).copy_from_slice(self.channel(ch));
        }
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(0.0);
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.samples.capacity()
    }
}

impl Default for StagingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_quantum(channels: usize) -> AudioQuantum {
        let mut q = AudioQuantum::new(channels);
        for ch in 0..channels {
            for (i, s) in q.channel_mut(ch).iter_mut().enumerate() {
                *s = (ch * RENDER_QUANTUM_FRAMES + i) as f32;
            }
        }
        q
    }

    #[test]
    fn quantum_channels_are_disjoint_views() {
        let q = ramp_quantum(3);
        assert_eq!(q.channel(0)[0], 0.0);
        assert_eq!(q.channel(1)[0], RENDER_QUANTUM_FRAMES as f32);
        assert_eq!(q.channel(2)[127], (3 * RENDER_QUANTUM_FRAMES - 1) as f32);
        assert_eq!(q.channel(1).len(), RENDER_QUANTUM_FRAMES);
    }

    #[test]
    fn copy_from_is_bit_exact() {
        let src = ramp_quantum(2);
        let mut dst = AudioQuantum::new(2);
        dst.copy_from(&src);
        assert_eq!(src, dst);
    }

    #[test]
    fn staging_roundtrip_preserves_samples() {
        let src = ramp_quantum(2);
        let mut staging = StagingBuffer::new();
        staging.load(&src);
        let mut out = AudioQuantum::new(2);
        staging.store(&mut out);
        assert_eq!(src, out);
    }

    #[test]
    fn staging_never_reallocates_across_channel_changes() {
        let mut staging = StagingBuffer::new();
        let before = staging.capacity();
        for channels in [1, 8, 2, MAX_CHANNEL_COUNT, 1] {
            staging.load(&AudioQuantum::new(channels));
            assert_eq!(staging.active_channels(), channels);
            assert_eq!(staging.capacity(), before);
        }
    }

    #[test]
    fn staging_clamps_channel_count_to_max() {
        let mut staging = StagingBuffer::new();
        staging.adapt_channels(MAX_CHANNEL_COUNT + 5);
        assert_eq!(staging.active_channels(), MAX_CHANNEL_COUNT);
    }
}
