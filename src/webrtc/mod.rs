//! WebRTC signaling and media intake
//!
//! Architecture:
//! ```text
//! Browser ------ /ws/rtc/ (offer, candidates, login) ------> SignalingSession
//!    |                                                            |
//!    |                                                     PeerTransport
//!    |                                                            |
//!    +==== video track =====> WebRtcPeer --> media pipeline --> PeerEvent
//!    +<=== echo track ======= WebRtcPeer
//!    +<=== data channel ===== notifications (new_question, hand_seen, ...)
//! ```

pub mod candidate;
pub mod config;
pub mod mdns;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod transport;

pub use candidate::{CandidatePayload, LocalCandidate, RemoteCandidate};
pub use config::WebRtcConfig;
pub use media::MediaContext;
pub use peer::WebRtcPeer;
pub use session::SignalingSession;
pub use signaling::{
    ClientMessage, ConnectionState, ServerMessage, SessionDescription, SignalingState,
};
pub use transport::{PeerEvent, PeerTransport};
