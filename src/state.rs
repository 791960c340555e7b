use std::sync::Arc;
use tokio::sync::broadcast;

use crate::auth::ExamRoster;
use crate::config::ConfigStore;
use crate::connection::{ConnectionDeps, SessionRegistry};
use crate::events::EventBus;
use crate::exam::QuizLoader;
use crate::vision::HandDetector;

/// Application-wide state shared across handlers
pub struct AppState {
    /// Configuration store
    pub config: ConfigStore,
    /// Event bus for session and exam events
    pub events: Arc<EventBus>,
    /// Live exam sessions
    pub registry: Arc<SessionRegistry>,
    /// Exam takers allowed to log in
    pub roster: Arc<ExamRoster>,
    /// Quiz-definition source
    pub quiz_loader: Arc<dyn QuizLoader>,
    /// Hand observation collaborator
    pub detector: Arc<dyn HandDetector>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(
        config: ConfigStore,
        events: Arc<EventBus>,
        registry: Arc<SessionRegistry>,
        roster: Arc<ExamRoster>,
        quiz_loader: Arc<dyn QuizLoader>,
        detector: Arc<dyn HandDetector>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            events,
            registry,
            roster,
            quiz_loader,
            detector,
            shutdown_tx,
        })
    }

    /// Subscribe to shutdown signal
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Collaborators for a new connection, with the current exam settings
    pub fn connection_deps(&self) -> ConnectionDeps {
        ConnectionDeps {
            exam: self.config.get().exam.clone(),
            quiz_loader: self.quiz_loader.clone(),
            roster: self.roster.clone(),
            events: self.events.clone(),
            registry: self.registry.clone(),
        }
    }
}
