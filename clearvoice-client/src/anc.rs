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

//! Noise-cancellation adapters.
//!
//! The toggle flow does not talk to the engine directly; it talks to a
//! [`NoiseCancellation`] so different denoiser backends can be swapped in
//! behind one track-in/track-out surface. [`EngineNoiseCancellation`] is the
//! clearvoice backend: connect routes the raw track through a
//! [`DenoiseSession`] and hands back the processed one.

use crate::error::{ClientError, Result};
use clearvoice_engine::graph::{stream_from_tracks, MediaStreamTrack};
use clearvoice_engine::{DenoiseSession, SessionMode, SessionOptions};

/// A denoiser a call can route its outgoing audio through.
pub trait NoiseCancellation {
    /// Routes `track` through the denoiser and returns the processed track
    /// to publish in its place. The denoiser is active once this returns.
    fn connect(&mut self, track: MediaStreamTrack) -> Result<MediaStreamTrack>;

    /// Releases the routed track and deactivates the denoiser.
    fn disconnect(&mut self) -> Result<()>;

    fn is_active(&self) -> bool;

    /// Short backend name for logs and diagnostics.
    fn kind(&self) -> &'static str;
}

/// [`NoiseCancellation`] backed by a [`DenoiseSession`].
pub struct EngineNoiseCancellation {
    session: DenoiseSession,
}

impl EngineNoiseCancellation {
    /// Builds a session from `options` and initializes it for noise
    /// cancellation. Model fetch happens here, so a call can front-load the
    /// cost before the first toggle.
    pub async fn init(options: SessionOptions) -> Result<Self> {
        let mut session = DenoiseSession::new(options);
        session.init(SessionMode::NoiseCancellation, None).await?;
        Ok(Self { session })
    }

    /// Wraps an already initialized session.
    pub fn from_session(session: DenoiseSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &DenoiseSession {
        &self.session
    }

    /// Tears the session down completely, releasing the model and the audio
    /// context.
    pub async fn destroy(&mut self) -> Result<()> {
        self.session.destroy().await.map_err(ClientError::from)
    }
}

impl NoiseCancellation for EngineNoiseCancellation {
    fn connect(&mut self, track: MediaStreamTrack) -> Result<MediaStreamTrack> {
        let input = stream_from_tracks(vec![track])?;
        let processed = self.session.connect(&input)?;
        let clean = processed
            .audio_tracks()
            .into_iter()
            .next()
            .ok_or(ClientError::NoAudioTrack)?;
        self.session.enable()?;
        log::debug!("anc: routed capture through the engine as track {}", clean.id());
        Ok(clean)
    }

    fn disconnect(&mut self) -> Result<()> {
        self.session.disconnect()?;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.session.is_enabled()
    }

    fn kind(&self) -> &'static str {
        "clearvoice"
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use clearvoice_engine::graph::MediaStreamTrack;
    use clearvoice_engine::kernel::MockKernelFactory;
    use clearvoice_engine::model::StaticModelFetcher;
    use clearvoice_engine::SessionState;
    use futures::executor::block_on;
    use std::sync::Arc;

    fn adapter() -> EngineNoiseCancellation {
        let options = SessionOptions {
            kernel_factory: Arc::new(MockKernelFactory::passthrough()),
            model_fetcher: Arc::new(StaticModelFetcher::uniform(vec![7u8; 16])),
            ..SessionOptions::default()
        };
        block_on(EngineNoiseCancellation::init(options)).unwrap()
    }

    #[test]
    fn connect_enables_the_session_and_returns_a_new_track() {
        let mut anc = adapter();
        assert!(!anc.is_active());
        assert_eq!(anc.kind(), "clearvoice");

        let (_writer, raw) = MediaStreamTrack::audio();
        let raw_id = raw.id().to_string();
        let clean = anc.connect(raw).unwrap();

        assert_ne!(clean.id(), raw_id);
        assert!(anc.is_active());
        assert_eq!(anc.session().state(), SessionState::Enabled);
    }

    #[test]
    fn disconnect_deactivates_and_destroy_resets() {
        let mut anc = adapter();
        let (_writer, raw) = MediaStreamTrack::audio();
        anc.connect(raw).unwrap();

        anc.disconnect().unwrap();
        assert!(!anc.is_active());
        assert_eq!(anc.session().state(), SessionState::Disconnected);

        block_on(anc.destroy()).unwrap();
        assert_eq!(anc.session().state(), SessionState::Uninitialized);
    }

    #[test]
    fn reconnect_after_disconnect_issues_a_fresh_track() {
        let mut anc = adapter();
        let (_writer_a, raw_a) = MediaStreamTrack::audio();
        let clean_a = anc.connect(raw_a).unwrap().id().to_string();
        anc.disconnect().unwrap();

        let (_writer_b, raw_b) = MediaStreamTrack::audio();
        let clean_b = anc.connect(raw_b).unwrap();
        assert_ne!(clean_b.id(), clean_a);
        assert!(anc.is_active());
    }
}
