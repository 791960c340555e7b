//! Seam between signaling and the underlying peer connection

use async_trait::async_trait;

use super::candidate::{LocalCandidate, RemoteCandidate};
use super::signaling::{ConnectionState, SessionDescription};
use crate::error::Result;
use crate::vision::HandObservation;

/// Everything a peer connection reports back to its connection loop
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local candidate was discovered
    LocalCandidate(LocalCandidate),
    /// Candidate gathering finished (or timed out)
    GatheringComplete,
    /// Peer connection state changed
    StateChanged(ConnectionState),
    /// Text message on any data channel
    DataMessage(String),
    /// First remote video track arrived
    MediaStarted { mime_type: String },
    /// Hand detection result for a sampled frame
    Observation(HandObservation),
}

/// Negotiated media/data transport for one client
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Apply a remote offer and return the local answer
    async fn accept_offer(&self, offer: &SessionDescription) -> Result<SessionDescription>;

    /// Submit a normalized remote candidate
    async fn add_remote_candidate(&self, candidate: &RemoteCandidate) -> Result<()>;

    /// Send a text payload on the notification data channel
    async fn send_notification(&self, payload: &str) -> Result<()>;

    /// Release the connection and all media tasks
    async fn close(&self) -> Result<()>;
}
