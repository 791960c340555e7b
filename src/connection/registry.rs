//! Live exam session registry

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{AppError, Result};

/// Snapshot of one live session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    /// Signaling state
    pub state: String,
    /// Peer connection state
    pub transport: String,
    pub quiz: Option<String>,
    pub username: Option<String>,
    /// Quiz mode once the exam bundle exists
    pub mode: Option<String>,
    /// Zero-based index of the question on screen
    pub question: Option<usize>,
}

/// Tracks live sessions and enforces the connection limit
pub struct SessionRegistry {
    max_sessions: usize,
    sessions: RwLock<HashMap<String, SessionInfo>>,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            max_sessions: max_sessions.max(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a session id, or fail when the limit is reached
    pub fn reserve(&self) -> Result<String> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.max_sessions {
            return Err(AppError::ServiceUnavailable(format!(
                "Maximum sessions ({}) reached",
                self.max_sessions
            )));
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        sessions.insert(
            session_id.clone(),
            SessionInfo {
                session_id: session_id.clone(),
                created_at: Utc::now(),
                state: "new".to_string(),
                transport: "new".to_string(),
                quiz: None,
                username: None,
                mode: None,
                question: None,
            },
        );
        info!("Exam session registered: {}", session_id);
        Ok(session_id)
    }

    /// Mutate a session's snapshot; unknown ids are ignored
    pub fn update<F>(&self, session_id: &str, f: F)
    where
        F: FnOnce(&mut SessionInfo),
    {
        if let Some(info) = self.sessions.write().get_mut(session_id) {
            f(info);
        }
    }

    pub fn remove(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            debug!("Exam session unregistered: {}", session_id);
        }
        removed
    }

    pub fn get(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.read().get(session_id).cloned()
    }

    /// All sessions, oldest first
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut list: Vec<SessionInfo> = self.sessions.read().values().cloned().collect();
        list.sort_by_key(|s| s.created_at);
        list
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }
}
