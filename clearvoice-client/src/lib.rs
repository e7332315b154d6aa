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

//! Call-setup glue for the clearvoice engine.
//!
//! The engine turns one audio track into a denoised one; this crate wires
//! that into a call: acquiring microphone capture with the right constraint
//! profile, publishing tracks to the remote side, and swapping the published
//! track when the user flips denoising mid-call.
//!
//! The pieces are deliberate seams. [`TrackProvider`] abstracts capture,
//! [`MediaPublisher`] abstracts the peer connection and
//! [`NoiseCancellation`] abstracts the denoiser backend, so the
//! [`AncToggle`] replacement flow is testable end to end without a device
//! or a network.

pub mod anc;
pub mod capture;
pub mod error;
pub mod publish;
pub mod toggle;

pub use anc::{EngineNoiseCancellation, NoiseCancellation};
pub use capture::{CaptureProfile, TrackProvider};
pub use error::{ClientError, Result};
pub use publish::{MediaPublisher, PublishEvent, RecordingPublisher};
pub use toggle::{AncToggle, ToggleOutcome};

#[cfg(not(target_arch = "wasm32"))]
pub use capture::SyntheticTrackProvider;

#[cfg(all(not(target_arch = "wasm32"), feature = "cpal"))]
pub use capture::MicrophoneTrackProvider;
