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

//! Track publication seam.
//!
//! [`MediaPublisher`] models the peer-connection side of a call: local
//! tracks go in, remote parties hear them. Transport is out of scope here;
//! the toggle flow only needs publish, unpublish and a view of what is
//! currently out. [`RecordingPublisher`] is the in-process implementation
//! used by tests and demos, keeping an ordered ledger of every change.

use crate::error::{ClientError, Result};
use clearvoice_engine::graph::MediaStreamTrack;

/// Publishes local media tracks to the remote side of a call.
pub trait MediaPublisher {
    fn publish(&mut self, track: MediaStreamTrack) -> Result<()>;

    /// Withdraws a previously published track by id.
    fn unpublish(&mut self, track_id: &str) -> Result<()>;

    /// Tracks currently live on the remote side.
    fn published(&self) -> &[MediaStreamTrack];
}

/// One entry in the [`RecordingPublisher`] ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishEvent {
    Published(String),
    Unpublished(String),
}

/// [`MediaPublisher`] that records instead of transmitting.
#[derive(Default)]
pub struct RecordingPublisher {
    current: Vec<MediaStreamTrack>,
    events: Vec<PublishEvent>,
}

impl RecordingPublisher {
    /// Full publish/unpublish history, oldest first.
    pub fn events(&self) -> &[PublishEvent] {
        &self.events
    }
}

impl MediaPublisher for RecordingPublisher {
    fn publish(&mut self, track: MediaStreamTrack) -> Result<()> {
        log::debug!("publish: track {} goes out", track.id());
        self.events
            .push(PublishEvent::Published(track.id().to_string()));
        self.current.push(track);
        Ok(())
    }

    fn unpublish(&mut self, track_id: &str) -> Result<()> {
        let position = self
            .current
            .iter()
            .position(|track| track.id() == track_id)
            .ok_or_else(|| ClientError::Publish(format!("track {track_id} is not published")))?;
        self.current.remove(position);
        self.events
            .push(PublishEvent::Unpublished(track_id.to_string()));
        log::debug!("publish: track {track_id} withdrawn");
        Ok(())
    }

    fn published(&self) -> &[MediaStreamTrack] {
        &self.current
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn ledger_tracks_the_current_publication_set() {
        let mut publisher = RecordingPublisher::default();
        let (_writer_a, a) = MediaStreamTrack::audio();
        let (_writer_b, b) = MediaStreamTrack::audio();
        let a_id = a.id().to_string();
        let b_id = b.id().to_string();

        publisher.publish(a).unwrap();
        publisher.publish(b).unwrap();
        assert_eq!(publisher.published().len(), 2);

        publisher.unpublish(&a_id).unwrap();
        assert_eq!(publisher.published().len(), 1);
        assert_eq!(publisher.published()[0].id(), b_id);

        assert_eq!(
            publisher.events(),
            &[
                PublishEvent::Published(a_id.clone()),
                PublishEvent::Published(b_id),
                PublishEvent::Unpublished(a_id),
            ]
        );
    }

    #[test]
    fn unpublishing_an_unknown_track_fails() {
        let mut publisher = RecordingPublisher::default();
        let err = publisher.unpublish("nope").unwrap_err();
        assert!(matches!(err, ClientError::Publish(_)));
    }
}
