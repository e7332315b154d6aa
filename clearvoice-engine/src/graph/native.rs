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

//! Channel-backed stand-ins for the browser audio graph.
//!
//! An audio track is a flume channel of [`AudioQuantum`]s: whoever holds the
//! [`AudioTrackWriter`] is the producer (a capture device, a file reader, a
//! test); the filter consumes through a [`SourceNode`] and feeds a
//! [`DestinationNode`], whose stream exposes the processed track. A track is
//! expected to have exactly one consumer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use flume::{Receiver, Sender};

use super::TrackKind;
use crate::error::{EngineError, Result};
use crate::quantum::AudioQuantum;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    format!("{}-{}", prefix, NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// The native pipeline has no platform preconditions.
pub fn platform_supported() -> bool {
    true
}

pub(crate) fn create_context(sample_rate: u32) -> Result<AudioContextHandle> {
    Ok(AudioContextHandle::new(sample_rate))
}

pub fn stream_from_tracks(tracks: Vec<MediaStreamTrack>) -> Result<MediaStream> {
    Ok(MediaStream::with_tracks(tracks))
}

struct ContextInner {
    sample_rate: u32,
    closed: AtomicBool,
}

/// Native analog of the Web Audio context: a sample rate, an open/closed
/// flag, and node constructors. Cloning shares the underlying context.
#[derive(Clone)]
pub struct AudioContextHandle {
    inner: Arc<ContextInner>,
}

impl AudioContextHandle {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                sample_rate,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(EngineError::Graph("audio context is closed".into()));
        }
        Ok(())
    }

    /// Mirrors `createMediaStreamSource`: taps the stream's first audio
    /// track.
    pub fn create_source(&self, stream: &MediaStream) -> Result<SourceNode> {
        self.check_open()?;
        let track = stream
            .audio_tracks()
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::InvalidStream("stream has no audio track".into()))?;
        if !track.is_live() {
            return Err(EngineError::InvalidStream(format!(
                "track {} is not live",
                track.id()
            )));
        }
        Ok(SourceNode { track })
    }

    /// Mirrors `createMediaStreamDestination`: a sink whose stream carries
    /// one fresh audio track.
    pub fn create_destination(&self) -> Result<DestinationNode> {
        self.check_open()?;
        let (writer, track) = MediaStreamTrack::audio();
        let stream = MediaStream::with_tracks(vec![track]);
        Ok(DestinationNode { writer, stream })
    }
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: TrackKind,
    // Shared with the producer handle, which must not keep the quantum
    // receiver alive.
    stopped: Arc<AtomicBool>,
    quanta: Option<Receiver<AudioQuantum>>,
}

/// A single media track. Clones share identity and, for audio, the quantum
/// channel.
#[derive(Clone, Debug)]
pub struct MediaStreamTrack {
    inner: Arc<TrackInner>,
}

impl MediaStreamTrack {
    /// New live audio track plus its producer handle.
    pub fn audio() -> (AudioTrackWriter, MediaStreamTrack) {
        let (tx, rx) = flume::unbounded();
        let stopped = Arc::new(AtomicBool::new(false));
        let id = next_id("audio");
        let writer = AudioTrackWriter {
            tx,
            id: id.clone(),
            stopped: stopped.clone(),
        };
        let track = Self {
            inner: Arc::new(TrackInner {
                id,
                kind: TrackKind::Audio,
                stopped,
                quanta: Some(rx),
            }),
        };
        (writer, track)
    }

    /// Opaque video track; the engine only ever passes these through.
    pub fn video() -> MediaStreamTrack {
        Self {
            inner: Arc::new(TrackInner {
                id: next_id("video"),
                kind: TrackKind::Video,
                stopped: Arc::new(AtomicBool::new(false)),
                quanta: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// An audio track is live while it is not stopped and its producer still
    /// exists (queued quanta may remain drainable after that).
    pub fn is_live(&self) -> bool {
        match &self.inner.quanta {
            Some(rx) => !self.is_stopped() && !rx.is_disconnected(),
            None => !self.is_stopped(),
        }
    }

    /// Consumer handle for an audio track's quanta. `None` for video.
    pub fn quanta(&self) -> Option<Receiver<AudioQuantum>> {
        self.inner.quanta.clone()
    }
}

/// Producer half of an audio track. Pushes fail once the track is stopped
/// (matching a capture device whose track was ended) or once every track
/// handle and tap on the channel is gone.
pub struct AudioTrackWriter {
    tx: Sender<AudioQuantum>,
    id: String,
    stopped: Arc<AtomicBool>,
}

impl AudioTrackWriter {
    pub fn push(&self, quantum: AudioQuantum) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(EngineError::Graph(format!("track {} is stopped", self.id)));
        }
        self.tx
            .send(quantum)
            .map_err(|_| EngineError::Graph(format!("track {} has no consumer", self.id)))
    }

    pub fn track_id(&self) -> &str {
        &self.id
    }
}

/// An ordered set of tracks. Clones share the same tracks, like cloning a
/// browser stream reference.
#[derive(Clone, Debug)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaStreamTrack>,
}

impl MediaStream {
    pub fn new() -> Self {
        Self::with_tracks(Vec::new())
    }

    pub fn with_tracks(tracks: Vec<MediaStreamTrack>) -> Self {
        Self {
            id: next_id("stream"),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn add_track(&mut self, track: MediaStreamTrack) {
        self.tracks.push(track);
    }

    pub fn audio_tracks(&self) -> Vec<MediaStreamTrack> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == TrackKind::Audio)
            .cloned()
            .collect()
    }

    pub fn video_tracks(&self) -> Vec<MediaStreamTrack> {
        self.tracks
            .iter()
            .filter(|t| t.kind() == TrackKind::Video)
            .cloned()
            .collect()
    }
}

impl Default for MediaStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Tap on a stream's first audio track.
pub struct SourceNode {
    track: MediaStreamTrack,
}

impl SourceNode {
    pub fn track_id(&self) -> &str {
        self.track.id()
    }

    pub(crate) fn quanta(&self) -> Receiver<AudioQuantum> {
        // Audio-only by construction in create_source.
        self.track.quanta().expect("source over non-audio track")
    }

    /// Graph detach. The filter owns the actual unwiring; this exists for
    /// call symmetry with the web node.
    pub fn disconnect(&self) {}
}

/// Sink that exposes its processed audio as a fresh single-track stream.
pub struct DestinationNode {
    writer: AudioTrackWriter,
    stream: MediaStream,
}

impl DestinationNode {
    pub fn stream(&self) -> MediaStream {
        self.stream.clone()
    }

    pub(crate) fn sink(&self) -> Sender<AudioQuantum> {
        self.writer.tx.clone()
    }

    pub fn disconnect(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_track_carries_quanta_to_source() {
        let ctx = AudioContextHandle::new(48000);
        let (writer, track) = MediaStreamTrack::audio();
        let stream = MediaStream::with_tracks(vec![track]);
        let source = ctx.create_source(&stream).unwrap();

        writer.push(AudioQuantum::new(2)).unwrap();
        let rx = source.quanta();
        let quantum = rx.try_recv().unwrap();
        assert_eq!(quantum.channels(), 2);
    }

    #[test]
    fn stream_splits_tracks_by_kind() {
        let (_w1, a1) = MediaStreamTrack::audio();
        let (_w2, a2) = MediaStreamTrack::audio();
        let v = MediaStreamTrack::video();
        let stream = MediaStream::with_tracks(vec![a1.clone(), v.clone(), a2.clone()]);

        let audio = stream.audio_tracks();
        let video = stream.video_tracks();
        assert_eq!(audio.len(), 2);
        assert_eq!(video.len(), 1);
        assert_eq!(video[0].id(), v.id());
        assert_ne!(a1.id(), a2.id());
    }

    #[test]
    fn source_requires_a_live_audio_track() {
        let ctx = AudioContextHandle::new(48000);
        let video_only = MediaStream::with_tracks(vec![MediaStreamTrack::video()]);
        assert!(matches!(
            ctx.create_source(&video_only),
            Err(EngineError::InvalidStream(_))
        ));

        let (writer, track) = MediaStreamTrack::audio();
        track.stop();
        let stopped = MediaStream::with_tracks(vec![track]);
        assert!(matches!(
            ctx.create_source(&stopped),
            Err(EngineError::InvalidStream(_))
        ));
        drop(writer);
    }

    #[test]
    fn closed_context_rejects_node_creation() {
        let ctx = AudioContextHandle::new(48000);
        ctx.close();
        assert!(ctx.create_destination().is_err());
        let (_w, track) = MediaStreamTrack::audio();
        let stream = MediaStream::with_tracks(vec![track]);
        assert!(matches!(
            ctx.create_source(&stream),
            Err(EngineError::Graph(_))
        ));
    }

    #[test]
    fn destination_stream_exposes_processed_track() {
        let ctx = AudioContextHandle::new(48000);
        let dest = ctx.create_destination().unwrap();
        assert_eq!(dest.stream().audio_tracks().len(), 1);

        let sink = dest.sink();
        sink.send(AudioQuantum::new(1)).unwrap();
        let tracks = dest.stream().audio_tracks();
        let quantum = tracks[0].quanta().unwrap().try_recv().unwrap();
        assert_eq!(quantum.channels(), 1);
    }

    #[test]
    fn writer_errors_once_consumer_is_gone() {
        let (writer, track) = MediaStreamTrack::audio();
        drop(track);
        assert!(matches!(
            writer.push(AudioQuantum::new(1)),
            Err(EngineError::Graph(_))
        ));
    }
}
