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

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the session facade and its collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("platform does not support the audio worklet pipeline")]
    PlatformUnsupported,

    #[error("already initialized, call destroy() first")]
    AlreadyInitialized,

    #[error("not initialized, call init() first")]
    NotInitialized,

    #[error("invalid media stream: {0}")]
    InvalidStream(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("not connected to any stream, call connect(stream) first")]
    NotConnected,

    #[error("model fetch failed: {0}")]
    ModelFetch(String),

    #[error("audio graph error: {0}")]
    Graph(String),
}
