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

//! Cross-platform noise-cancellation engine for real-time calls.
//!
//! The caller-facing surface is [`DenoiseSession`]: a guarded lifecycle
//! state machine that loads a model variant for the audio context's sample
//! rate, splices a filter into the capture graph, and hands back a
//! processed [`graph::MediaStream`]. On wasm the filter is an
//! `AudioWorkletNode`; natively it is a dedicated render thread driving the
//! same [`processor::FilterProcessor`] per 128-frame quantum.
//!
//! The DSP itself sits behind [`kernel::AudioKernel`], injected through
//! [`SessionOptions`] so embedders can supply their own and tests can run a
//! mock.

pub mod constants;
pub mod error;
pub mod filter;
pub mod graph;
pub mod kernel;
pub mod model;
pub mod processor;
pub mod quantum;
pub mod session;

pub use error::{EngineError, Result};
pub use session::{DenoiseSession, SessionMode, SessionOptions, SessionState};
