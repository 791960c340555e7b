use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::connection::SessionInfo;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// System info response
#[derive(Serialize)]
pub struct SystemInfo {
    pub version: &'static str,
    pub build_date: &'static str,
    pub sessions: usize,
    pub max_sessions: usize,
    /// Hand detector in use
    pub detector: String,
    pub default_quiz: String,
    pub accounts: usize,
}

pub async fn system_info(State(state): State<Arc<AppState>>) -> Json<SystemInfo> {
    let config = state.config.get();
    Json(SystemInfo {
        version: env!("CARGO_PKG_VERSION"),
        build_date: env!("BUILD_DATE"),
        sessions: state.registry.len(),
        max_sessions: state.registry.max_sessions(),
        detector: state.detector.name().to_string(),
        default_quiz: config.exam.default_quiz.clone(),
        accounts: state.roster.len(),
    })
}

/// Live exam sessions, oldest first
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionInfo>> {
    Json(state.registry.list())
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>> {
    state
        .registry
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ExamRoster;
    use crate::config::ConfigStore;
    use crate::connection::SessionRegistry;
    use crate::events::EventBus;
    use crate::exam::{Question, StaticQuizLoader};
    use crate::vision::NoHandsDetector;
    use tokio::sync::broadcast;

    async fn test_state(dir: &std::path::Path) -> Arc<AppState> {
        let config = ConfigStore::new(&dir.join("config.json")).await.unwrap();
        let (shutdown_tx, _) = broadcast::channel(1);
        let loader = StaticQuizLoader::new(vec![Question::new("1 + 1", ["1", "2", "3", "4"], 2)]);
        AppState::new(
            config,
            Arc::new(EventBus::new()),
            Arc::new(SessionRegistry::new(4)),
            Arc::new(ExamRoster::new(&[])),
            Arc::new(loader),
            Arc::new(NoHandsDetector),
            shutdown_tx,
        )
    }

    #[tokio::test]
    async fn test_info_and_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let id = state.registry.reserve().unwrap();

        let Json(info) = system_info(State(state.clone())).await;
        assert_eq!(info.sessions, 1);
        assert_eq!(info.max_sessions, 4);
        assert_eq!(info.detector, "none");
        assert_eq!(info.default_quiz, "Electrical");

        let Json(list) = list_sessions(State(state.clone())).await;
        assert_eq!(list.len(), 1);

        let Json(found) = get_session(State(state.clone()), Path(id)).await.unwrap();
        assert_eq!(found.state, "new");

        assert!(matches!(
            get_session(State(state), Path("missing".to_string())).await,
            Err(AppError::NotFound(_))
        ));
    }
}
