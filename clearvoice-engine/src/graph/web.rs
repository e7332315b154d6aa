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

//! Thin wrappers over the browser audio graph with the same surface as the
//! native module.

use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    AudioContext, AudioContextOptions, AudioContextState, MediaStreamAudioDestinationNode,
    MediaStreamAudioSourceNode, MediaStreamTrackState,
};

use super::TrackKind;
use crate::error::{EngineError, Result};

pub(crate) fn js_err(context: &str, e: JsValue) -> EngineError {
    EngineError::Graph(format!("{context}: {e:?}"))
}

/// Feature-detects the audio graph the way the original SDK probed for
/// `window.AudioContext`.
pub fn platform_supported() -> bool {
    let window = match web_sys::window() {
        Some(window) => window,
        None => return false,
    };
    js_sys::Reflect::has(window.as_ref(), &JsValue::from_str("AudioContext")).unwrap_or(false)
}

pub(crate) fn create_context(sample_rate: u32) -> Result<AudioContextHandle> {
    AudioContextHandle::new(sample_rate)
}

pub fn stream_from_tracks(tracks: Vec<MediaStreamTrack>) -> Result<MediaStream> {
    MediaStream::with_tracks(tracks)
}

/// Wrapper over `web_sys::AudioContext`. Cloning shares the same browser
/// context object.
#[derive(Clone)]
pub struct AudioContextHandle {
    inner: AudioContext,
}

impl AudioContextHandle {
    pub fn new(sample_rate: u32) -> Result<Self> {
        let options = AudioContextOptions::new();
        options.set_sample_rate(sample_rate as f32);
        let inner = AudioContext::new_with_context_options(&options)
            .map_err(|e| js_err("AudioContext::new", e))?;
        Ok(Self { inner })
    }

    /// Wraps a caller-supplied context; the caller keeps teardown
    /// responsibility.
    pub fn from_raw(inner: AudioContext) -> Self {
        Self { inner }
    }

    pub fn raw(&self) -> &AudioContext {
        &self.inner
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate() as u32
    }

    pub fn close(&self) {
        // close() hands back a promise; nothing to do once it resolves.
        let _ = self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state() == AudioContextState::Closed
    }

    pub fn create_source(&self, stream: &MediaStream) -> Result<SourceNode> {
        let inner = self
            .inner
            .create_media_stream_source(&stream.inner)
            .map_err(|e| js_err("createMediaStreamSource", e))?;
        Ok(SourceNode { inner })
    }

    pub fn create_destination(&self) -> Result<DestinationNode> {
        let inner = self
            .inner
            .create_media_stream_destination()
            .map_err(|e| js_err("createMediaStreamDestination", e))?;
        Ok(DestinationNode { inner })
    }
}

/// Wrapper over `web_sys::MediaStream`.
#[derive(Clone)]
pub struct MediaStream {
    inner: web_sys::MediaStream,
}

impl MediaStream {
    pub fn new() -> Result<Self> {
        let inner = web_sys::MediaStream::new().map_err(|e| js_err("MediaStream::new", e))?;
        Ok(Self { inner })
    }

    pub fn with_tracks(tracks: Vec<MediaStreamTrack>) -> Result<Self> {
        let array = js_sys::Array::new();
        for track in &tracks {
            array.push(track.inner.as_ref());
        }
        let inner = web_sys::MediaStream::new_with_tracks(array.as_ref())
            .map_err(|e| js_err("MediaStream::new_with_tracks", e))?;
        Ok(Self { inner })
    }

    pub fn from_raw(inner: web_sys::MediaStream) -> Self {
        Self { inner }
    }

    pub fn raw(&self) -> &web_sys::MediaStream {
        &self.inner
    }

    pub fn id(&self) -> String {
        self.inner.id()
    }

    pub fn add_track(&mut self, track: MediaStreamTrack) {
        self.inner.add_track(&track.inner);
    }

    pub fn audio_tracks(&self) -> Vec<MediaStreamTrack> {
        self.inner
            .get_audio_tracks()
            .iter()
            .map(|t| MediaStreamTrack {
                inner: t.unchecked_into(),
            })
            .collect()
    }

    pub fn video_tracks(&self) -> Vec<MediaStreamTrack> {
        self.inner
            .get_video_tracks()
            .iter()
            .map(|t| MediaStreamTrack {
                inner: t.unchecked_into(),
            })
            .collect()
    }
}

/// Wrapper over `web_sys::MediaStreamTrack`.
#[derive(Clone)]
pub struct MediaStreamTrack {
    inner: web_sys::MediaStreamTrack,
}

impl MediaStreamTrack {
    pub fn from_raw(inner: web_sys::MediaStreamTrack) -> Self {
        Self { inner }
    }

    pub fn raw(&self) -> &web_sys::MediaStreamTrack {
        &self.inner
    }

    pub fn id(&self) -> String {
        self.inner.id()
    }

    pub fn kind(&self) -> TrackKind {
        if self.inner.kind() == "video" {
            TrackKind::Video
        } else {
            TrackKind::Audio
        }
    }

    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_live(&self) -> bool {
        self.inner.ready_state() == MediaStreamTrackState::Live
    }
}

/// Wrapper over `MediaStreamAudioSourceNode`.
pub struct SourceNode {
    inner: MediaStreamAudioSourceNode,
}

impl SourceNode {
    pub fn raw(&self) -> &MediaStreamAudioSourceNode {
        &self.inner
    }

    pub fn disconnect(&self) {
        let _ = self.inner.disconnect();
    }
}

/// Wrapper over `MediaStreamAudioDestinationNode`.
pub struct DestinationNode {
    inner: MediaStreamAudioDestinationNode,
}

impl DestinationNode {
    pub fn raw(&self) -> &MediaStreamAudioDestinationNode {
        &self.inner
    }

    pub fn stream(&self) -> MediaStream {
        MediaStream {
            inner: self.inner.stream(),
        }
    }

    pub fn disconnect(&self) {
        let _ = self.inner.disconnect();
    }
}
