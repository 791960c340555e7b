//! Signaling messages exchanged over the `/ws/rtc/` socket

use serde::{Deserialize, Serialize};

use super::candidate::{CandidatePayload, LocalCandidate};

/// Session description as carried in `offer` / `answer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "offer".to_string(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "answer".to_string(),
        }
    }
}

/// Client → server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Offer {
        offer: SessionDescription,
    },
    IceCandidate {
        #[serde(default)]
        candidate: Option<CandidatePayload>,
    },
    Login {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
}

/// Server → client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Answer { answer: SessionDescription },
    IceCandidate { candidate: LocalCandidate },
    Login { valid: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn login(valid: bool) -> Self {
        Self::Login {
            valid: if valid { "1" } else { "0" }.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Negotiation progress of one signaling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalingState {
    New,
    OfferReceived,
    AnswerSent,
    CandidatesGathering,
    Connected,
    Closed,
}

impl std::fmt::Display for SignalingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalingState::New => write!(f, "new"),
            SignalingState::OfferReceived => write!(f, "offer_received"),
            SignalingState::AnswerSent => write!(f, "answer_sent"),
            SignalingState::CandidatesGathering => write!(f, "candidates_gathering"),
            SignalingState::Connected => write!(f, "connected"),
            SignalingState::Closed => write!(f, "closed"),
        }
    }
}

/// Transport-level connection state reported by the peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// No media path remains
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_messages() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "offer", "offer": {"sdp": "v=0", "type": "offer"}}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::Offer { offer } if offer.sdp == "v=0"));

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ice_candidate"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::IceCandidate { candidate: None }));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "ice_candidate", "candidate": null}"#).unwrap();
        assert!(matches!(msg, ClientMessage::IceCandidate { candidate: None }));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"type": "login", "username": "alice", "password": "pw"}"#,
        )
        .unwrap();
        assert!(matches!(msg, ClientMessage::Login { username, .. } if username == "alice"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "bye"}"#).is_err());
    }

    #[test]
    fn test_server_messages() {
        let answer = ServerMessage::Answer {
            answer: SessionDescription::answer("v=0"),
        };
        let value = serde_json::to_value(&answer).unwrap();
        assert_eq!(value["type"], "answer");
        assert_eq!(value["answer"]["type"], "answer");
        assert_eq!(value["answer"]["sdp"], "v=0");

        let value = serde_json::to_value(ServerMessage::login(false)).unwrap();
        assert_eq!(value, serde_json::json!({"type": "login", "valid": "0"}));
    }

    #[test]
    fn test_connection_state_terminal() {
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Disconnected.is_terminal());
    }
}
