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

//! The session façade: a guarded lifecycle state machine around the audio
//! graph and the filter's rendering context.
//!
//! ```text
//! uninitialized --init--> initialized --connect--> connected
//!                                                   |    ^
//!                                          enable/disable |
//!                                                   v    |
//!                                         enabled <-> disabled
//!
//! disconnect: {initialized, connected, enabled, disabled} -> disconnected
//! destroy:    any state -> uninitialized
//! ```
//!
//! A session is an explicit object, not process-global state; callers that
//! need exactly one instance own exactly one. Operations are not reentrant,
//! the guards assume serialized calls from a single controller context.

use std::sync::Arc;

use clearvoice_diagnostics::{emit, metric, now_ms, DiagEvent};

use crate::constants::DEFAULT_SAMPLE_RATE;
use crate::error::{EngineError, Result};
use crate::filter::{FilterNode, VadCallback};
use crate::graph::{self, AudioContextHandle, DestinationNode, MediaStream, SourceNode};
use crate::kernel::{GateKernelFactory, KernelFactory};
use crate::model::{HttpModelFetcher, ModelFetcher, ModelVariant};
use crate::processor::WorkletCommand;

/// Lifecycle states. `Uninitialized` is both initial and terminal; every
/// other transition is guarded against the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Connected,
    Enabled,
    Disabled,
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initialized => "initialized",
            SessionState::Connected => "connected",
            SessionState::Enabled => "enabled",
            SessionState::Disabled => "disabled",
            SessionState::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the session's kernel produces: denoised audio, or voice-activity
/// scores with no audio output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    NoiseCancellation,
    VoiceActivity,
}

impl SessionMode {
    pub fn is_vad(&self) -> bool {
        matches!(self, SessionMode::VoiceActivity)
    }
}

/// Dependency-injected collaborators. Defaults give the built-in gate
/// kernel and the HTTP model loader; tests swap in mocks.
#[derive(Clone)]
pub struct SessionOptions {
    pub kernel_factory: Arc<dyn KernelFactory>,
    pub model_fetcher: Arc<dyn ModelFetcher>,
    /// Sample rate for a session-owned context. Ignored when the caller
    /// supplies a context; the model variant follows the context's rate.
    pub sample_rate: u32,
    /// Initial kernel diagnostic logging, forwarded right after init.
    pub logging: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            kernel_factory: Arc::new(GateKernelFactory),
            model_fetcher: Arc::new(HttpModelFetcher::new()),
            sample_rate: DEFAULT_SAMPLE_RATE,
            logging: false,
        }
    }
}

/// Per-input-track wiring: the isolated single-track stream, the source
/// node reading it, and the destination node whose output track lands in
/// the processed stream. Exist only while connected.
struct TrackBinding {
    source: SourceNode,
    destination: DestinationNode,
    stream: MediaStream,
}

/// The noise-cancellation session.
pub struct DenoiseSession {
    options: SessionOptions,
    state: SessionState,
    mode: Option<SessionMode>,
    context: Option<AudioContextHandle>,
    context_owned: bool,
    filter: Option<FilterNode>,
    bindings: Vec<TrackBinding>,
    processed: Option<MediaStream>,
    vad_callback: Option<VadCallback>,
    logging: bool,
}

impl DenoiseSession {
    pub fn new(options: SessionOptions) -> Self {
        let logging = options.logging;
        Self {
            options,
            state: SessionState::Uninitialized,
            mode: None,
            context: None,
            context_owned: false,
            filter: None,
            bindings: Vec::new(),
            processed: None,
            vad_callback: None,
            logging,
        }
    }

    /// Resolves an audio context (caller-supplied or session-owned),
    /// fetches the model for the context's sample rate and the requested
    /// mode, and brings up the filter's rendering context.
    ///
    /// Fails with [`EngineError::AlreadyInitialized`] without an
    /// intervening [`destroy`](Self::destroy), and with
    /// [`EngineError::PlatformUnsupported`] when the audio graph API is
    /// unavailable. A model fetch failure rejects the call and leaves the
    /// session uninitialized; there is nothing to roll back.
    pub async fn init(
        &mut self,
        mode: SessionMode,
        context: Option<AudioContextHandle>,
    ) -> Result<()> {
        if self.is_initialized() {
            return Err(EngineError::AlreadyInitialized);
        }
        if !graph::platform_supported() {
            return Err(EngineError::PlatformUnsupported);
        }

        let (context, owned) = match context {
            Some(context) => {
                if context.is_closed() {
                    return Err(EngineError::InvalidState("supplied audio context is closed"));
                }
                (context, false)
            }
            None => (graph::create_context(self.options.sample_rate)?, true),
        };

        let variant = ModelVariant::for_config(context.sample_rate(), mode.is_vad());
        log::info!(
            "session: init {} at {} Hz, model {}",
            if mode.is_vad() { "vad" } else { "nc" },
            context.sample_rate(),
            variant.as_str()
        );

        let weights = match self.options.model_fetcher.fetch(variant).await {
            Ok(weights) => weights,
            Err(e) => {
                if owned {
                    context.close();
                }
                return Err(e);
            }
        };

        let mut filter =
            match FilterNode::create(&context, Arc::clone(&self.options.kernel_factory)).await {
                Ok(filter) => filter,
                Err(e) => {
                    if owned {
                        context.close();
                    }
                    return Err(e);
                }
            };

        let setup = filter
            .send(WorkletCommand::Init {
                data: weights,
                sample_rate: context.sample_rate(),
                is_vad: mode.is_vad(),
            })
            .and_then(|_| {
                if self.logging {
                    filter.send(WorkletCommand::SetLogging { enabled: true })
                } else {
                    Ok(())
                }
            });
        if let Err(e) = setup {
            filter.kill();
            if owned {
                context.close();
            }
            return Err(e);
        }

        if let Some(callback) = self.vad_callback.take() {
            filter.set_vad_callback(callback);
        }

        self.mode = Some(mode);
        self.context = Some(context);
        self.context_owned = owned;
        self.filter = Some(filter);
        self.set_state(SessionState::Initialized);
        Ok(())
    }

    /// Routes every audio track of `input` through the filter and returns
    /// the composite processed stream: one processed audio track per input
    /// audio track, video tracks passed through untouched.
    ///
    /// Idempotent while connected: returns the previously built processed
    /// stream without creating new bindings.
    pub fn connect(&mut self, input: &MediaStream) -> Result<MediaStream> {
        if self.is_connected() {
            return self
                .processed
                .clone()
                .ok_or(EngineError::InvalidState("connected without a processed stream"));
        }
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        let context = self
            .context
            .as_ref()
            .ok_or(EngineError::InvalidState("audio context missing"))?;
        let filter = self
            .filter
            .as_ref()
            .ok_or(EngineError::InvalidState("filter node missing"))?;

        let audio_tracks = input.audio_tracks();
        for track in &audio_tracks {
            if !track.is_live() {
                return Err(EngineError::InvalidStream(format!(
                    "audio track {} has ended",
                    track.id()
                )));
            }
        }

        let mut processed = graph::stream_from_tracks(Vec::new())?;
        let mut bindings = Vec::with_capacity(audio_tracks.len());
        for track in audio_tracks {
            let isolated = graph::stream_from_tracks(vec![track])?;
            let source = context.create_source(&isolated)?;
            let destination = context.create_destination()?;
            filter.wire(&source, &destination)?;
            for output in destination.stream().audio_tracks() {
                processed.add_track(output);
            }
            bindings.push(TrackBinding {
                source,
                destination,
                stream: isolated,
            });
        }
        for video in input.video_tracks() {
            processed.add_track(video);
        }

        log::info!("session: connected {} audio track(s)", bindings.len());
        self.bindings = bindings;
        self.processed = Some(processed.clone());
        self.set_state(SessionState::Connected);
        Ok(processed)
    }

    /// Turns denoising on. No-op when already enabled; [`NotConnected`]
    /// unless the session holds live track bindings.
    ///
    /// [`NotConnected`]: EngineError::NotConnected
    pub fn enable(&mut self) -> Result<()> {
        if self.state == SessionState::Enabled {
            return Ok(());
        }
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        let filter = self
            .filter
            .as_ref()
            .ok_or(EngineError::InvalidState("filter node missing"))?;
        filter.set_enabled(true);
        self.set_state(SessionState::Enabled);
        Ok(())
    }

    /// Turns denoising off; the filter keeps running as a pass-through.
    pub fn disable(&mut self) -> Result<()> {
        if self.state == SessionState::Disabled {
            return Ok(());
        }
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        let filter = self
            .filter
            .as_ref()
            .ok_or(EngineError::InvalidState("filter node missing"))?;
        filter.set_enabled(false);
        self.set_state(SessionState::Disabled);
        Ok(())
    }

    /// Detaches the filter from the graph, stops the intermediate
    /// single-track streams and drops all bindings. No-op when already
    /// disconnected or never initialized; disables first when enabled.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.is_disconnected() {
            return Ok(());
        }
        if self.is_enabled() {
            self.disable()?;
        }
        let filter = self
            .filter
            .as_ref()
            .ok_or(EngineError::InvalidState("filter node missing"))?;
        filter.unwire_all();
        for binding in self.bindings.drain(..) {
            binding.source.disconnect();
            binding.destination.disconnect();
            for track in binding.stream.audio_tracks() {
                track.stop();
            }
        }
        self.processed = None;
        self.set_state(SessionState::Disconnected);
        Ok(())
    }

    /// Full teardown: cascades disable and disconnect, kills the rendering
    /// context, closes the audio context if the session created it, and
    /// returns to the initial state. No-op when never initialized.
    pub async fn destroy(&mut self) -> Result<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        if self.is_enabled() {
            self.disable()?;
        }
        if !self.is_disconnected() {
            self.disconnect()?;
        }
        if let Some(mut filter) = self.filter.take() {
            filter.kill();
        }
        if let Some(context) = self.context.take() {
            if self.context_owned {
                context.close();
            }
        }
        self.context_owned = false;
        self.mode = None;
        self.vad_callback = None;
        self.logging = self.options.logging;
        self.set_state(SessionState::Uninitialized);
        log::info!("session: destroyed");
        Ok(())
    }

    /// Toggles kernel diagnostic logging. Silently ignored unless
    /// initialized; initial logging comes from [`SessionOptions`].
    pub fn set_logging(&mut self, enabled: bool) -> Result<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        self.logging = enabled;
        match &self.filter {
            Some(filter) => filter.send(WorkletCommand::SetLogging { enabled }),
            None => Ok(()),
        }
    }

    /// Registers the consumer of voice-activity scores. Takes effect
    /// immediately when initialized, otherwise at the next `init`.
    pub fn set_vad_callback(&mut self, callback: VadCallback) {
        match &self.filter {
            Some(filter) => filter.set_vad_callback(callback),
            None => self.vad_callback = Some(callback),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> Option<SessionMode> {
        self.mode
    }

    pub fn context(&self) -> Option<&AudioContextHandle> {
        self.context.as_ref()
    }

    pub fn filter(&self) -> Option<&FilterNode> {
        self.filter.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        self.state != SessionState::Uninitialized
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            SessionState::Connected | SessionState::Enabled | SessionState::Disabled
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.state == SessionState::Enabled
    }

    /// True whenever denoising is not running: disabled, disconnected, or
    /// never initialized.
    pub fn is_disabled(&self) -> bool {
        matches!(
            self.state,
            SessionState::Disabled | SessionState::Disconnected | SessionState::Uninitialized
        )
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(
            self.state,
            SessionState::Disconnected | SessionState::Uninitialized
        )
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        log::debug!("session: {} -> {}", self.state, next);
        self.state = next;
        emit(DiagEvent {
            subsystem: "session",
            session_id: None,
            ts_ms: now_ms(),
            metrics: vec![metric!("state", next.as_str())],
        });
    }
}

impl Default for DenoiseSession {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::graph::{AudioTrackWriter, MediaStreamTrack};
    use crate::kernel::MockKernelFactory;
    use crate::model::StaticModelFetcher;
    use crate::quantum::AudioQuantum;
    use futures::executor::block_on;
    use futures::future::LocalBoxFuture;
    use std::sync::Mutex;
    use std::time::Duration;

    fn test_options() -> SessionOptions {
        SessionOptions {
            kernel_factory: Arc::new(MockKernelFactory::passthrough()),
            model_fetcher: Arc::new(StaticModelFetcher::uniform(vec![7; 16])),
            sample_rate: 48000,
            logging: false,
        }
    }

    fn initialized_session(mode: SessionMode) -> DenoiseSession {
        let mut session = DenoiseSession::new(test_options());
        block_on(session.init(mode, None)).unwrap();
        session
    }

    /// A stream with `audio` writable audio tracks and `video` passthrough
    /// video tracks.
    fn capture_fixture(audio: usize, video: usize) -> (MediaStream, Vec<AudioTrackWriter>) {
        let mut writers = Vec::new();
        let mut tracks = Vec::new();
        for _ in 0..audio {
            let (writer, track) = MediaStreamTrack::audio();
            writers.push(writer);
            tracks.push(track);
        }
        for _ in 0..video {
            tracks.push(MediaStreamTrack::video());
        }
        (MediaStream::with_tracks(tracks), writers)
    }

    fn ramp(channels: usize) -> AudioQuantum {
        let mut q = AudioQuantum::new(channels);
        for ch in 0..channels {
            for (i, s) in q.channel_mut(ch).iter_mut().enumerate() {
                *s = (i as f32 - 64.0) * 0.01 * (ch + 1) as f32;
            }
        }
        q
    }

    /// Records which variant `init` asked for.
    struct SpyFetcher {
        inner: StaticModelFetcher,
        seen: Arc<Mutex<Vec<ModelVariant>>>,
    }

    impl ModelFetcher for SpyFetcher {
        fn fetch(&self, variant: ModelVariant) -> LocalBoxFuture<'_, Result<Vec<u8>>> {
            self.seen.lock().unwrap().push(variant);
            self.inner.fetch(variant)
        }
    }

    #[test]
    fn init_creates_filter_and_owned_context() {
        let session = initialized_session(SessionMode::NoiseCancellation);
        assert_eq!(session.state(), SessionState::Initialized);
        assert!(session.is_initialized());
        assert!(session.filter().is_some());
        assert!(session.context().is_some());
        assert_eq!(session.mode(), Some(SessionMode::NoiseCancellation));
    }

    #[test]
    fn double_init_is_rejected() {
        let mut session = initialized_session(SessionMode::NoiseCancellation);
        let err = block_on(session.init(SessionMode::NoiseCancellation, None)).unwrap_err();
        assert_eq!(err, EngineError::AlreadyInitialized);
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn destroy_closes_owned_context_only() {
        let mut session = initialized_session(SessionMode::NoiseCancellation);
        let owned = session.context().unwrap().clone();
        block_on(session.destroy()).unwrap();
        assert!(owned.is_closed());

        let supplied = AudioContextHandle::new(16000);
        let mut session = DenoiseSession::new(test_options());
        block_on(session.init(SessionMode::NoiseCancellation, Some(supplied.clone()))).unwrap();
        block_on(session.destroy()).unwrap();
        assert!(!supplied.is_closed());
    }

    #[test]
    fn destroy_restores_initial_state_from_every_stage() {
        let mut fresh = DenoiseSession::new(test_options());
        block_on(fresh.destroy()).unwrap();
        assert_eq!(fresh.state(), SessionState::Uninitialized);

        for stage in 0..3 {
            // Teardown stops connected tracks, so every stage gets its own.
            let (stream, _writers) = capture_fixture(1, 0);
            let mut session = initialized_session(SessionMode::NoiseCancellation);
            if stage >= 1 {
                session.connect(&stream).unwrap();
            }
            if stage >= 2 {
                session.enable().unwrap();
            }
            block_on(session.destroy()).unwrap();
            assert_eq!(session.state(), SessionState::Uninitialized);
            assert!(session.filter().is_none());
            assert!(session.context().is_none());
            assert!(session.bindings.is_empty());
            assert!(session.processed.is_none());
        }
    }

    #[test]
    fn model_fetch_failure_leaves_session_uninitialized() {
        let mut session = DenoiseSession::new(SessionOptions {
            model_fetcher: Arc::new(StaticModelFetcher::default()),
            ..test_options()
        });
        let err = block_on(session.init(SessionMode::NoiseCancellation, None)).unwrap_err();
        assert!(matches!(err, EngineError::ModelFetch(_)));
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(session.filter().is_none());
        assert!(session.context().is_none());
    }

    #[test]
    fn vad_mode_fetches_vad_variant_regardless_of_rate() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut session = DenoiseSession::new(SessionOptions {
            model_fetcher: Arc::new(SpyFetcher {
                inner: StaticModelFetcher::uniform(vec![1]),
                seen: seen.clone(),
            }),
            sample_rate: 8000,
            ..test_options()
        });
        block_on(session.init(SessionMode::VoiceActivity, None)).unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), &[ModelVariant::Vad]);
    }

    #[test]
    fn connect_before_init_fails() {
        let (stream, _writers) = capture_fixture(1, 0);
        let mut session = DenoiseSession::new(test_options());
        assert_eq!(
            session.connect(&stream).unwrap_err(),
            EngineError::NotInitialized
        );
    }

    #[test]
    fn connect_builds_processed_tracks_and_bindings() {
        let (stream, _writers) = capture_fixture(2, 1);
        let mut session = initialized_session(SessionMode::NoiseCancellation);
        let processed = session.connect(&stream).unwrap();

        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.bindings.len(), 2);
        assert_eq!(processed.audio_tracks().len(), 2);
        assert_eq!(processed.video_tracks().len(), 1);

        // Audio comes out on fresh destination tracks; video is the same
        // track object passed through.
        let input_audio: Vec<String> = stream
            .audio_tracks()
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        for track in processed.audio_tracks() {
            assert!(!input_audio.contains(&track.id().to_string()));
        }
        assert_eq!(
            processed.video_tracks()[0].id(),
            stream.video_tracks()[0].id()
        );
    }

    #[test]
    fn connect_is_idempotent_while_connected() {
        let (stream, _writers) = capture_fixture(2, 0);
        let mut session = initialized_session(SessionMode::NoiseCancellation);
        let first = session.connect(&stream).unwrap();
        let second = session.connect(&stream).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(session.bindings.len(), 2);
    }

    #[test]
    fn connect_rejects_ended_tracks() {
        let (stream, _writers) = capture_fixture(1, 0);
        stream.audio_tracks()[0].stop();
        let mut session = initialized_session(SessionMode::NoiseCancellation);
        assert!(matches!(
            session.connect(&stream).unwrap_err(),
            EngineError::InvalidStream(_)
        ));
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn enable_disable_flow_is_idempotent() {
        let (stream, _writers) = capture_fixture(1, 0);
        let mut session = initialized_session(SessionMode::NoiseCancellation);
        session.connect(&stream).unwrap();

        session.enable().unwrap();
        assert_eq!(session.state(), SessionState::Enabled);
        assert!(session.filter().unwrap().enabled());
        session.enable().unwrap();
        assert_eq!(session.state(), SessionState::Enabled);

        session.disable().unwrap();
        assert_eq!(session.state(), SessionState::Disabled);
        assert!(!session.filter().unwrap().enabled());
        session.disable().unwrap();
        assert_eq!(session.state(), SessionState::Disabled);
        assert!(session.is_disabled());
    }

    #[test]
    fn enable_and_disable_require_connection() {
        let mut session = DenoiseSession::new(test_options());
        assert_eq!(session.enable().unwrap_err(), EngineError::NotConnected);
        assert_eq!(session.disable().unwrap_err(), EngineError::NotConnected);

        let mut session = initialized_session(SessionMode::NoiseCancellation);
        assert_eq!(session.enable().unwrap_err(), EngineError::NotConnected);

        let (stream, _writers) = capture_fixture(1, 0);
        session.connect(&stream).unwrap();
        session.disconnect().unwrap();
        assert_eq!(session.enable().unwrap_err(), EngineError::NotConnected);
        assert_eq!(session.disable().unwrap_err(), EngineError::NotConnected);
    }

    #[test]
    fn disconnect_is_lenient_and_tears_down_bindings() {
        let mut never_initialized = DenoiseSession::new(test_options());
        never_initialized.disconnect().unwrap();
        assert_eq!(never_initialized.state(), SessionState::Uninitialized);

        let (stream, writers) = capture_fixture(1, 0);
        let mut session = initialized_session(SessionMode::NoiseCancellation);
        session.connect(&stream).unwrap();
        session.enable().unwrap();

        session.disconnect().unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.filter().unwrap().enabled(), "disables first");
        assert!(session.bindings.is_empty());
        assert!(!stream.audio_tracks()[0].is_live(), "input track stopped");
        assert!(writers[0].push(ramp(1)).is_err(), "producer cut off");

        // Lenient on repeat, and connect works again with fresh tracks.
        session.disconnect().unwrap();
        let (fresh, _fresh_writers) = capture_fixture(1, 0);
        let processed = session.connect(&fresh).unwrap();
        assert_eq!(processed.audio_tracks().len(), 1);
    }

    #[test]
    fn set_logging_is_silent_before_init() {
        let mut session = DenoiseSession::new(test_options());
        session.set_logging(true).unwrap();
        assert_eq!(session.state(), SessionState::Uninitialized);

        let mut session = initialized_session(SessionMode::NoiseCancellation);
        session.set_logging(true).unwrap();
        session.set_logging(false).unwrap();
    }

    #[test]
    fn connected_but_disabled_session_passes_audio_bit_exact() {
        let (stream, writers) = capture_fixture(1, 0);
        let mut session = initialized_session(SessionMode::NoiseCancellation);
        let processed = session.connect(&stream).unwrap();

        let tracks = processed.audio_tracks();
        let rx = tracks[0].quanta().unwrap();
        let input = ramp(2);
        writers[0].push(input.clone()).unwrap();
        let output = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn vad_session_reports_scores_and_silences_audio() {
        let scores: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = scores.clone();

        let mut session = DenoiseSession::new(SessionOptions {
            kernel_factory: Arc::new(MockKernelFactory::with_vad_scores(vec![0.6])),
            ..test_options()
        });
        // Registered before init: the session must hand it to the filter.
        session.set_vad_callback(Box::new(move |score| {
            sink.lock().unwrap().push(score);
        }));
        block_on(session.init(SessionMode::VoiceActivity, None)).unwrap();

        let (stream, writers) = capture_fixture(1, 0);
        let processed = session.connect(&stream).unwrap();
        session.enable().unwrap();

        let silence = AudioQuantum::new(1);
        let tracks = processed.audio_tracks();
        let rx = tracks[0].quanta().unwrap();
        let mut engaged = false;
        for _ in 0..50 {
            writers[0].push(ramp(1)).unwrap();
            let output = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            if output == silence {
                engaged = true;
                break;
            }
        }
        assert!(engaged, "vad mode never engaged");
        let seen = scores.lock().unwrap();
        assert_eq!(seen[0], 0.6);
        block_on(session.destroy()).unwrap();
    }
}
