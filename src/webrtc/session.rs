//! Signaling state machine for one client connection
//!
//! ```text
//! New -> OfferReceived -> AnswerSent -> CandidatesGathering -> Connected -> Closed
//!   \__________________________________________________________________/
//!                         close() from any state
//! ```
//!
//! The session never writes to the socket itself; every operation returns the
//! [`ServerMessage`]s the connection loop should send, in order.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::candidate::{CandidatePayload, LocalCandidate, RemoteCandidate};
use super::signaling::{ConnectionState, ServerMessage, SessionDescription, SignalingState};
use super::transport::PeerTransport;
use crate::error::{AppError, Result};

pub struct SignalingSession<T: PeerTransport + ?Sized> {
    session_id: String,
    transport: Arc<T>,
    state: SignalingState,
    remote_description: Option<SessionDescription>,
    local_description: Option<SessionDescription>,
    /// Local candidates found before the answer went out
    pending_local: Vec<LocalCandidate>,
    /// Local candidates already sent, in discovery order
    local_candidates: Vec<LocalCandidate>,
    /// Remote candidates that arrived ahead of the offer
    pending_remote: Vec<RemoteCandidate>,
}

impl<T: PeerTransport + ?Sized> SignalingSession<T> {
    pub fn new(session_id: impl Into<String>, transport: Arc<T>) -> Self {
        Self {
            session_id: session_id.into(),
            transport,
            state: SignalingState::New,
            remote_description: None,
            local_description: None,
            pending_local: vec![],
            local_candidates: vec![],
            pending_remote: vec![],
        }
    }

    /// Apply a remote offer and produce the answer message
    ///
    /// A rejected offer leaves the session in `OfferReceived` so the client
    /// can re-offer.
    pub async fn handle_offer(&mut self, offer: SessionDescription) -> Result<ServerMessage> {
        if !matches!(
            self.state,
            SignalingState::New | SignalingState::OfferReceived
        ) {
            return Err(AppError::Negotiation(format!(
                "offer not accepted in state {}",
                self.state
            )));
        }
        if offer.sdp_type != "offer" {
            return Err(AppError::Negotiation(format!(
                "expected an offer, got {:?}",
                offer.sdp_type
            )));
        }

        self.state = SignalingState::OfferReceived;
        let answer = self
            .transport
            .accept_offer(&offer)
            .await
            .map_err(|e| match e {
                AppError::Negotiation(_) => e,
                other => AppError::Negotiation(other.to_string()),
            })?;

        self.remote_description = Some(offer);
        self.local_description = Some(answer.clone());
        self.state = SignalingState::AnswerSent;
        info!("Session {} answered offer", self.session_id);

        for candidate in std::mem::take(&mut self.pending_remote) {
            if let Err(e) = self.transport.add_remote_candidate(&candidate).await {
                warn!(
                    "Session {} dropped early remote candidate: {}",
                    self.session_id, e
                );
            }
        }

        Ok(ServerMessage::Answer { answer })
    }

    /// Start streaming local candidates
    ///
    /// Returns the candidates buffered so far in discovery order; later ones
    /// come out of [`on_local_candidate`](Self::on_local_candidate).
    pub fn gather_and_send_candidates(&mut self) -> Result<Vec<ServerMessage>> {
        match self.state {
            SignalingState::AnswerSent => {
                self.state = SignalingState::CandidatesGathering;
            }
            SignalingState::CandidatesGathering | SignalingState::Connected => {}
            state => {
                return Err(AppError::Negotiation(format!(
                    "cannot gather candidates in state {}",
                    state
                )))
            }
        }

        let pending = std::mem::take(&mut self.pending_local);
        debug!(
            "Session {} flushing {} buffered candidates",
            self.session_id,
            pending.len()
        );
        Ok(pending
            .into_iter()
            .map(|candidate| self.record_local(candidate))
            .collect())
    }

    /// A local candidate was discovered
    pub fn on_local_candidate(&mut self, candidate: LocalCandidate) -> Option<ServerMessage> {
        match self.state {
            SignalingState::New | SignalingState::OfferReceived | SignalingState::AnswerSent => {
                self.pending_local.push(candidate);
                None
            }
            SignalingState::CandidatesGathering | SignalingState::Connected => {
                Some(self.record_local(candidate))
            }
            SignalingState::Closed => None,
        }
    }

    fn record_local(&mut self, candidate: LocalCandidate) -> ServerMessage {
        self.local_candidates.push(candidate.clone());
        ServerMessage::IceCandidate { candidate }
    }

    /// Submit a remote candidate; `None` or an empty string is end-of-candidates
    pub async fn add_remote_candidate(&mut self, raw: Option<CandidatePayload>) -> Result<()> {
        if self.state == SignalingState::Closed {
            return Err(AppError::Negotiation("session is closed".to_string()));
        }

        let Some(candidate) = RemoteCandidate::from_payload(raw)? else {
            debug!("Session {} end of remote candidates", self.session_id);
            return Ok(());
        };

        if self.remote_description.is_none() {
            self.pending_remote.push(candidate);
            return Ok(());
        }

        self.transport.add_remote_candidate(&candidate).await
    }

    /// Transport state update; returns true when the session just became connected
    pub fn on_transport_state(&mut self, state: ConnectionState) -> bool {
        if state == ConnectionState::Connected
            && matches!(
                self.state,
                SignalingState::AnswerSent | SignalingState::CandidatesGathering
            )
        {
            info!("Session {} connected", self.session_id);
            self.state = SignalingState::Connected;
            return true;
        }
        false
    }

    /// Tear down the transport exactly once; returns false if already closed
    pub async fn close(&mut self) -> Result<bool> {
        if self.state == SignalingState::Closed {
            return Ok(false);
        }

        let previous = self.state;
        self.state = SignalingState::Closed;
        self.pending_local.clear();
        self.pending_remote.clear();
        info!("Session {} closing (was {})", self.session_id, previous);

        self.transport.close().await?;
        Ok(true)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SignalingState {
        self.state
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn local_candidates(&self) -> &[LocalCandidate] {
        &self.local_candidates
    }
}
