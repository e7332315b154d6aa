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

//! Engine-denoise toggle for a live call.
//!
//! Flipping denoising mid-call is not a parameter tweak: the published audio
//! track has to be replaced wholesale, because the platform denoiser rides
//! on capture constraints and the engine denoiser rides on the routed track.
//! [`AncToggle`] owns that replacement:
//!
//! 1. withdraw the currently published audio track
//! 2. stop the local capture track behind it
//! 3. re-acquire capture with the flipped [`CaptureProfile`]
//! 4. route through the [`NoiseCancellation`] backend (or detach from it)
//! 5. publish the replacement track
//!
//! A replacement guard makes a toggle request that lands while another is
//! still in flight a no-op instead of a double replacement.

use crate::anc::NoiseCancellation;
use crate::capture::{CaptureProfile, TrackProvider};
use crate::error::Result;
use crate::publish::MediaPublisher;
use clearvoice_diagnostics::{emit, metric, now_ms, DiagEvent};
use clearvoice_engine::graph::{MediaStreamTrack, TrackKind};

/// What a [`AncToggle::toggle`] call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Engine denoising is now on.
    Enabled,
    /// Engine denoising is now off.
    Disabled,
    /// Nothing changed: a replacement was already in flight, or no audio
    /// track was published.
    Skipped,
}

/// Owns the local audio leg of a call: the capture track, its publication
/// and whether the engine denoiser sits between the two.
pub struct AncToggle<P, M> {
    provider: P,
    publisher: M,
    anc: Box<dyn NoiseCancellation>,
    active: bool,
    in_flight: bool,
    local_track: Option<MediaStreamTrack>,
}

impl<P: TrackProvider, M: MediaPublisher> AncToggle<P, M> {
    /// Starts with denoising off and nothing published.
    pub fn new(provider: P, publisher: M, anc: Box<dyn NoiseCancellation>) -> Self {
        Self {
            provider,
            publisher,
            anc,
            active: false,
            in_flight: false,
            local_track: None,
        }
    }

    /// Acquires capture for the current denoise setting and publishes it.
    /// Call once at call setup; afterwards [`toggle`](Self::toggle) keeps
    /// the publication in step.
    pub fn publish_local_audio(&mut self) -> Result<MediaStreamTrack> {
        let profile = CaptureProfile::for_engine_denoise(self.active);
        let raw = self.provider.acquire(&profile)?;
        self.local_track = Some(raw.clone());
        let outgoing = if self.active {
            self.anc.connect(raw)?
        } else {
            raw
        };
        self.publisher.publish(outgoing.clone())?;
        log::info!(
            "toggle: published local audio {} ({} denoise)",
            outgoing.id(),
            if self.active { self.anc.kind() } else { "platform" }
        );
        Ok(outgoing)
    }

    /// Flips engine denoising by replacing the published audio track.
    ///
    /// Returns [`ToggleOutcome::Skipped`] when a replacement is already in
    /// flight or no audio track is currently published. On error the
    /// in-flight guard is still released, so the next toggle can run.
    pub fn toggle(&mut self) -> Result<ToggleOutcome> {
        if self.in_flight {
            log::debug!("toggle: replacement already in flight, skipping");
            return Ok(ToggleOutcome::Skipped);
        }
        let Some(current) = self.published_audio() else {
            log::debug!("toggle: no published audio track, nothing to replace");
            return Ok(ToggleOutcome::Skipped);
        };

        self.in_flight = true;
        let outcome = self.replace(current);
        self.in_flight = false;
        outcome
    }

    /// Engine denoising is on for the published track.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn publisher(&self) -> &M {
        &self.publisher
    }

    pub fn anc(&self) -> &dyn NoiseCancellation {
        self.anc.as_ref()
    }

    fn published_audio(&self) -> Option<MediaStreamTrack> {
        self.publisher
            .published()
            .iter()
            .find(|track| track.kind() == TrackKind::Audio)
            .cloned()
    }

    fn replace(&mut self, current: MediaStreamTrack) -> Result<ToggleOutcome> {
        let current_id = current.id().to_string();
        self.publisher.unpublish(&current_id)?;
        if let Some(track) = self.local_track.take() {
            track.stop();
        }

        let engage = !self.active;
        let profile = CaptureProfile::for_engine_denoise(engage);
        let raw = self.provider.acquire(&profile)?;
        self.local_track = Some(raw.clone());

        let outcome = if engage {
            let clean = self.anc.connect(raw)?;
            self.publisher.publish(clean)?;
            ToggleOutcome::Enabled
        } else {
            self.anc.disconnect()?;
            self.publisher.publish(raw)?;
            ToggleOutcome::Disabled
        };
        self.active = engage;
        log::info!(
            "toggle: {} denoising {}",
            self.anc.kind(),
            if engage { "on" } else { "off" }
        );
        emit(DiagEvent {
            subsystem: "client",
            session_id: None,
            ts_ms: now_ms(),
            metrics: vec![metric!("denoise_active", engage)],
        });
        Ok(outcome)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::anc::EngineNoiseCancellation;
    use crate::capture::SyntheticTrackProvider;
    use crate::error::ClientError;
    use crate::publish::{PublishEvent, RecordingPublisher};
    use clearvoice_engine::kernel::MockKernelFactory;
    use clearvoice_engine::model::StaticModelFetcher;
    use clearvoice_engine::SessionOptions;
    use futures::executor::block_on;
    use std::sync::Arc;

    fn engine_anc() -> Box<dyn NoiseCancellation> {
        let options = SessionOptions {
            kernel_factory: Arc::new(MockKernelFactory::passthrough()),
            model_fetcher: Arc::new(StaticModelFetcher::uniform(vec![7u8; 16])),
            ..SessionOptions::default()
        };
        Box::new(block_on(EngineNoiseCancellation::init(options)).unwrap())
    }

    fn harness() -> AncToggle<SyntheticTrackProvider, RecordingPublisher> {
        AncToggle::new(
            SyntheticTrackProvider::new(440.0),
            RecordingPublisher::default(),
            engine_anc(),
        )
    }

    /// Provider that fails the next acquire, then recovers.
    struct FlakyProvider {
        inner: SyntheticTrackProvider,
        fail_next: bool,
    }

    impl TrackProvider for FlakyProvider {
        fn acquire(&mut self, profile: &CaptureProfile) -> crate::error::Result<MediaStreamTrack> {
            if std::mem::take(&mut self.fail_next) {
                return Err(ClientError::Capture("device wedged".to_string()));
            }
            self.inner.acquire(profile)
        }
    }

    #[test]
    fn toggle_republishes_through_the_engine() {
        let mut toggle = harness();
        let raw = toggle.publish_local_audio().unwrap();
        let raw_id = raw.id().to_string();
        assert!(!toggle.is_active());

        assert_eq!(toggle.toggle().unwrap(), ToggleOutcome::Enabled);
        assert!(toggle.is_active());
        assert!(toggle.anc().is_active());

        let events = toggle.publisher().events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], PublishEvent::Published(raw_id.clone()));
        assert_eq!(events[1], PublishEvent::Unpublished(raw_id.clone()));
        match &events[2] {
            PublishEvent::Published(clean_id) => assert_ne!(clean_id, &raw_id),
            other => panic!("expected a publish, got {other:?}"),
        }
        assert_eq!(toggle.publisher().published().len(), 1);
    }

    #[test]
    fn second_toggle_restores_raw_capture() {
        let mut toggle = harness();
        toggle.publish_local_audio().unwrap();
        toggle.toggle().unwrap();
        let clean_id = match toggle.publisher().events().last().unwrap() {
            PublishEvent::Published(id) => id.clone(),
            other => panic!("expected a publish, got {other:?}"),
        };

        assert_eq!(toggle.toggle().unwrap(), ToggleOutcome::Disabled);
        assert!(!toggle.is_active());
        assert!(!toggle.anc().is_active());

        let events = toggle.publisher().events();
        assert_eq!(events.len(), 5);
        assert_eq!(events[3], PublishEvent::Unpublished(clean_id.clone()));
        match &events[4] {
            PublishEvent::Published(raw_id) => assert_ne!(raw_id, &clean_id),
            other => panic!("expected a publish, got {other:?}"),
        }

        // Each acquisition flipped the platform suppression bit: on for the
        // initial publish, off while the engine denoised, on again after.
        let suppression: Vec<bool> = toggle
            .provider()
            .requested_profiles()
            .iter()
            .map(|profile| profile.noise_suppression)
            .collect();
        assert_eq!(suppression, vec![true, false, true]);
    }

    #[test]
    fn toggle_without_published_audio_is_skipped() {
        let mut toggle = harness();
        assert_eq!(toggle.toggle().unwrap(), ToggleOutcome::Skipped);
        assert!(!toggle.is_active());
        assert!(toggle.publisher().events().is_empty());
    }

    #[test]
    fn toggle_skips_while_a_replacement_is_in_flight() {
        let mut toggle = harness();
        toggle.publish_local_audio().unwrap();

        toggle.in_flight = true;
        assert_eq!(toggle.toggle().unwrap(), ToggleOutcome::Skipped);
        assert_eq!(toggle.publisher().events().len(), 1);
        assert!(!toggle.is_active());

        toggle.in_flight = false;
        assert_eq!(toggle.toggle().unwrap(), ToggleOutcome::Enabled);
    }

    #[test]
    fn failed_reacquire_releases_the_guard() {
        let mut toggle = AncToggle::new(
            FlakyProvider {
                inner: SyntheticTrackProvider::new(440.0),
                fail_next: false,
            },
            RecordingPublisher::default(),
            engine_anc(),
        );
        toggle.publish_local_audio().unwrap();

        toggle.provider_mut().fail_next = true;
        assert!(matches!(toggle.toggle(), Err(ClientError::Capture(_))));
        assert!(!toggle.in_flight);
        assert!(!toggle.is_active());

        // The old track was already withdrawn when acquisition failed, so a
        // bare retry has nothing to replace; republishing recovers.
        assert_eq!(toggle.toggle().unwrap(), ToggleOutcome::Skipped);
        toggle.publish_local_audio().unwrap();
        assert_eq!(toggle.toggle().unwrap(), ToggleOutcome::Enabled);
    }

    #[test]
    fn toggled_capture_flows_through_the_session() {
        let mut toggle = harness();
        toggle.publish_local_audio().unwrap();
        toggle.toggle().unwrap();

        let published = toggle.publisher().published().to_vec();
        let clean = published.first().unwrap();
        let quanta = clean.quanta().unwrap();
        toggle.provider_mut().pump(4).unwrap();
        for _ in 0..4 {
            let quantum = quanta
                .recv_timeout(std::time::Duration::from_secs(5))
                .unwrap();
            assert_eq!(quantum.frames(), 128);
        }
    }

    #[test]
    fn disabling_detaches_the_engine_session() {
        let mut toggle = harness();
        toggle.publish_local_audio().unwrap();
        toggle.toggle().unwrap();
        toggle.toggle().unwrap();

        // The engine-backed adapter must be parked after disable, ready for
        // the next engage.
        assert!(!toggle.anc().is_active());
        let raw = toggle.publisher().published().first().unwrap().clone();
        assert!(raw.is_live());
        assert_eq!(toggle.toggle().unwrap(), ToggleOutcome::Enabled);
    }
}
