//! System event types
//!
//! Events the proctor stream (`/api/ws`) and the audit log consume.

use serde::{Deserialize, Serialize};

/// System event enumeration
///
/// Serialized as `{"event": "<name>", "data": {...}}`:
/// ```json
/// {
///   "event": "exam.finished",
///   "data": { "session_id": "...", "quiz": "STEM", "score": 75.0, "hands_unseen_secs": 4.2 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SystemEvent {
    // ============================================================================
    // Session Events
    // ============================================================================
    /// A signaling socket was accepted
    #[serde(rename = "session.opened")]
    SessionOpened { session_id: String },

    /// A session was torn down
    #[serde(rename = "session.closed")]
    SessionClosed {
        session_id: String,
        /// Signaling state at close time
        state: String,
    },

    /// Exam taker logged in
    #[serde(rename = "session.login")]
    SessionLogin {
        session_id: String,
        username: String,
        valid: bool,
    },

    // ============================================================================
    // Exam Events
    // ============================================================================
    /// Quiz loaded and exam bundle created
    #[serde(rename = "exam.started")]
    ExamStarted {
        session_id: String,
        quiz: String,
        total: usize,
    },

    /// A question was shown
    #[serde(rename = "exam.question")]
    ExamQuestion {
        session_id: String,
        /// Zero-based question index
        index: usize,
    },

    /// Required hands left the frame
    #[serde(rename = "exam.hands_unseen")]
    ExamHandsUnseen { session_id: String },

    /// Required hands are back in frame
    #[serde(rename = "exam.hands_seen")]
    ExamHandsSeen { session_id: String },

    /// Last question answered
    #[serde(rename = "exam.finished")]
    ExamFinished {
        session_id: String,
        quiz: String,
        score: f64,
        hands_unseen_secs: f64,
    },
}

impl SystemEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SessionOpened { .. } => "session.opened",
            Self::SessionClosed { .. } => "session.closed",
            Self::SessionLogin { .. } => "session.login",
            Self::ExamStarted { .. } => "exam.started",
            Self::ExamQuestion { .. } => "exam.question",
            Self::ExamHandsUnseen { .. } => "exam.hands_unseen",
            Self::ExamHandsSeen { .. } => "exam.hands_seen",
            Self::ExamFinished { .. } => "exam.finished",
        }
    }

    /// Check if event name matches a topic pattern
    ///
    /// - `*` matches all events
    /// - `exam.*` matches all exam events
    /// - `exam.finished` matches exactly
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic == "*" {
            return true;
        }

        let event_name = self.event_name();

        match topic.strip_suffix(".*") {
            Some(prefix) => event_name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => event_name == topic,
        }
    }
}
