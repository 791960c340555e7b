//! Per-connection orchestration
//!
//! One [`Connection`] per signaling socket owns the signaling state machine,
//! the exam bundle and the grading flag the media task watches. The web
//! layer feeds it socket text and [`PeerEvent`](crate::webrtc::PeerEvent)s
//! from a single `select!` loop.

mod dispatcher;
mod registry;

pub use dispatcher::{Connection, ConnectionDeps, Flow};
pub use registry::{SessionInfo, SessionRegistry};
