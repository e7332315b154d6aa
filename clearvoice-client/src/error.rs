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

//! Error type for the call-setup layer.
//!
//! Engine failures pass through untouched so callers can still match on
//! [`EngineError`] variants; everything the client adds on top (device
//! capture, track publication) gets its own variant here.

use clearvoice_engine::EngineError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("processed stream has no audio track")]
    NoAudioTrack,
}

pub type Result<T> = std::result::Result<T, ClientError>;
