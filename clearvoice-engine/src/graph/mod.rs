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

//! Platform-specific audio graph primitives behind one surface.
//!
//! The session facade only speaks in terms of [`AudioContextHandle`],
//! [`MediaStream`], [`MediaStreamTrack`], [`SourceNode`] and
//! [`DestinationNode`]. On the web target these wrap the browser graph; the
//! native module mirrors them with channel-backed tracks so the whole
//! pipeline runs under `cargo test`.

/// Media kind of a track. The engine routes audio through the filter and
/// passes video through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

// Conditionally compile and expose the native implementation
#[cfg(not(target_arch = "wasm32"))]
mod native;
#[cfg(not(target_arch = "wasm32"))]
pub use self::native::{
    platform_supported, stream_from_tracks, AudioContextHandle, AudioTrackWriter, DestinationNode,
    MediaStream, MediaStreamTrack, SourceNode,
};
#[cfg(not(target_arch = "wasm32"))]
pub(crate) use self::native::create_context;

// Conditionally compile and expose the web implementation
#[cfg(target_arch = "wasm32")]
mod web;
#[cfg(target_arch = "wasm32")]
pub use self::web::{
    platform_supported, stream_from_tracks, AudioContextHandle, DestinationNode, MediaStream,
    MediaStreamTrack, SourceNode,
};
#[cfg(target_arch = "wasm32")]
pub(crate) use self::web::{create_context, js_err};
