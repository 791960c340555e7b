use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::ExamRoster;
use crate::config::ExamConfig;
use crate::error::Result;
use crate::events::{EventBus, SystemEvent};
use crate::exam::{ExamNotification, ExamSession, ExamSettings, QuizLoader, QuizMode, QUIZ_START};
use crate::webrtc::{
    ClientMessage, ConnectionState, PeerEvent, PeerTransport, ServerMessage, SessionDescription,
    SignalingSession,
};

use super::registry::SessionRegistry;

/// Whether the connection loop should keep running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Process-scoped collaborators a connection needs
#[derive(Clone)]
pub struct ConnectionDeps {
    pub exam: ExamConfig,
    pub quiz_loader: Arc<dyn QuizLoader>,
    pub roster: Arc<ExamRoster>,
    pub events: Arc<EventBus>,
    pub registry: Arc<SessionRegistry>,
}

/// All per-connection state, owned by one connection loop
///
/// Every method takes `&mut self`, so signaling, data-channel control and
/// observations are applied one at a time. Replies for the signaling socket
/// collect in an outbox the loop drains with [`take_outbound`](Self::take_outbound).
pub struct Connection<T: PeerTransport + ?Sized> {
    session_id: String,
    signaling: SignalingSession<T>,
    exam: Option<ExamSession>,
    quiz_name: String,
    username: Option<String>,
    grading_tx: watch::Sender<bool>,
    cancel: CancellationToken,
    deps: ConnectionDeps,
    outbox: Vec<ServerMessage>,
    closed: bool,
}

impl<T: PeerTransport + ?Sized> Connection<T> {
    pub fn new(
        session_id: impl Into<String>,
        transport: Arc<T>,
        grading_tx: watch::Sender<bool>,
        cancel: CancellationToken,
        deps: ConnectionDeps,
    ) -> Self {
        let session_id = session_id.into();
        deps.events.publish(SystemEvent::SessionOpened {
            session_id: session_id.clone(),
        });
        Self {
            signaling: SignalingSession::new(session_id.clone(), transport),
            quiz_name: deps.exam.default_quiz.clone(),
            session_id,
            exam: None,
            username: None,
            grading_tx,
            cancel,
            deps,
            outbox: vec![],
            closed: false,
        }
    }

    /// Replies queued for the signaling socket, in send order
    pub fn take_outbound(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Handle one text frame from the signaling socket
    pub async fn handle_client_text(&mut self, text: &str) -> Flow {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle_client_message(msg).await,
            Err(e) => {
                warn!("Session {} sent invalid message: {}", self.session_id, e);
                self.outbox
                    .push(ServerMessage::error(format!("Invalid message: {}", e)));
                Flow::Continue
            }
        }
    }

    pub async fn handle_client_message(&mut self, msg: ClientMessage) -> Flow {
        match msg {
            ClientMessage::Offer { offer } => self.handle_offer(offer).await,
            ClientMessage::IceCandidate { candidate } => {
                if let Err(e) = self.signaling.add_remote_candidate(candidate).await {
                    warn!("Session {} remote candidate rejected: {}", self.session_id, e);
                    self.outbox.push(ServerMessage::error(e.to_string()));
                }
            }
            ClientMessage::Login { username, password } => {
                self.handle_login(username, password).await
            }
        }
        Flow::Continue
    }

    async fn handle_offer(&mut self, offer: SessionDescription) {
        match self.signaling.handle_offer(offer).await {
            Ok(answer) => {
                self.outbox.push(answer);
                match self.signaling.gather_and_send_candidates() {
                    Ok(candidates) => self.outbox.extend(candidates),
                    Err(e) => warn!("Session {}: {}", self.session_id, e),
                }
            }
            Err(e) => {
                warn!("Session {} offer failed: {}", self.session_id, e);
                self.outbox.push(ServerMessage::error(e.to_string()));
            }
        }
        self.sync_registry();
    }

    async fn handle_login(&mut self, username: String, password: String) {
        let verdict = match self.deps.roster.authenticate(&username, &password).await {
            Ok(verdict) => verdict,
            Err(e) => {
                debug!("Session {} login rejected: {}", self.session_id, e);
                self.outbox.push(ServerMessage::login(false));
                self.outbox.push(ServerMessage::error(e.to_string()));
                return;
            }
        };

        let valid = verdict.is_some();
        if let Some(quiz) = verdict {
            if self.exam.is_none() {
                self.quiz_name = quiz;
            } else {
                info!(
                    "Session {} logged in after exam start, keeping quiz {}",
                    self.session_id, self.quiz_name
                );
            }
            self.username = Some(username.clone());
            let (quiz, user) = (self.quiz_name.clone(), username.clone());
            self.deps.registry.update(&self.session_id, |s| {
                s.quiz = Some(quiz);
                s.username = Some(user);
            });
        }

        info!(
            "Session {} login {} for {}",
            self.session_id,
            if valid { "accepted" } else { "rejected" },
            username
        );
        self.deps.events.publish(SystemEvent::SessionLogin {
            session_id: self.session_id.clone(),
            username,
            valid,
        });
        self.outbox.push(ServerMessage::login(valid));
    }

    /// Handle one event from the peer connection or the media pipeline
    pub async fn handle_peer_event(&mut self, event: PeerEvent) -> Flow {
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                if let Some(msg) = self.signaling.on_local_candidate(candidate) {
                    self.outbox.push(msg);
                }
            }
            PeerEvent::GatheringComplete => {
                debug!(
                    "Session {} gathered {} local candidates",
                    self.session_id,
                    self.signaling.local_candidates().len()
                );
            }
            PeerEvent::StateChanged(state) => return self.on_transport_state(state).await,
            PeerEvent::DataMessage(text) => self.on_data_message(&text).await,
            PeerEvent::MediaStarted { mime_type } => {
                info!("Session {} receiving {} video", self.session_id, mime_type);
            }
            PeerEvent::Observation(observation) => {
                let Some(exam) = self.exam.as_mut() else {
                    return Flow::Continue;
                };
                let notifications = exam.on_observation(&observation);
                if !notifications.is_empty() {
                    self.dispatch(notifications).await;
                }
            }
        }
        Flow::Continue
    }

    async fn on_transport_state(&mut self, state: ConnectionState) -> Flow {
        let transport = state.to_string();
        self.deps
            .registry
            .update(&self.session_id, |s| s.transport = transport);

        if self.signaling.on_transport_state(state) {
            self.sync_registry();
            if let Err(e) = self.start_exam().await {
                warn!("Session {} cannot start exam: {}", self.session_id, e);
                self.outbox.push(ServerMessage::error(e.to_string()));
                return Flow::Close;
            }
        }

        if state.is_terminal() {
            info!("Session {} transport {}", self.session_id, state);
            return Flow::Close;
        }
        Flow::Continue
    }

    /// Load the quiz and create the exam bundle
    async fn start_exam(&mut self) -> Result<()> {
        if self.exam.is_some() {
            return Ok(());
        }

        let questions = self.deps.quiz_loader.load(&self.quiz_name).await?;
        let total = questions.len();
        let settings = ExamSettings::from(&self.deps.exam);
        self.exam = Some(ExamSession::new(self.quiz_name.clone(), questions, settings)?);

        info!(
            "Session {} exam ready: {} ({} questions)",
            self.session_id, self.quiz_name, total
        );
        self.deps.events.publish(SystemEvent::ExamStarted {
            session_id: self.session_id.clone(),
            quiz: self.quiz_name.clone(),
            total,
        });
        self.sync_registry();
        Ok(())
    }

    async fn on_data_message(&mut self, text: &str) {
        if text.trim() != QUIZ_START {
            debug!("Session {} ignoring data message {:?}", self.session_id, text);
            return;
        }
        let Some(exam) = self.exam.as_mut() else {
            debug!("Session {} quiz_start before the exam is ready", self.session_id);
            return;
        };

        let notifications = exam.toggle_grading();
        info!("Session {} exam mode {}", self.session_id, exam.mode());
        self.dispatch(notifications).await;
    }

    /// Send notifications on the data channel and mirror them as system events
    async fn dispatch(&mut self, notifications: Vec<ExamNotification>) {
        let Some(exam) = self.exam.as_ref() else {
            return;
        };
        let index = exam.quiz().current_index();

        for notification in &notifications {
            let event = match notification {
                ExamNotification::NewQuestion { .. } => SystemEvent::ExamQuestion {
                    session_id: self.session_id.clone(),
                    index,
                },
                ExamNotification::HandUnseen { .. } => SystemEvent::ExamHandsUnseen {
                    session_id: self.session_id.clone(),
                },
                ExamNotification::HandSeen { .. } => SystemEvent::ExamHandsSeen {
                    session_id: self.session_id.clone(),
                },
                ExamNotification::QuizFinished {
                    score,
                    hands_unseen,
                } => SystemEvent::ExamFinished {
                    session_id: self.session_id.clone(),
                    quiz: exam.quiz_name().to_string(),
                    score: *score,
                    hands_unseen_secs: *hands_unseen,
                },
            };
            self.deps.events.publish(event);

            match notification.to_json() {
                Ok(payload) => {
                    if let Err(e) = self.signaling.transport().send_notification(&payload).await {
                        warn!(
                            "Session {} lost {} notification: {}",
                            self.session_id,
                            notification.kind(),
                            e
                        );
                    }
                }
                Err(e) => warn!("Session {} cannot encode notification: {}", self.session_id, e),
            }
        }

        self.sync_registry();
    }

    /// Publish the current snapshot to the registry and the grading flag to the media task
    fn sync_registry(&self) {
        let state = self.signaling.state().to_string();
        let (mode, question) = match self.exam.as_ref() {
            Some(exam) => (Some(exam.mode()), Some(exam.quiz().current_index())),
            None => (None, None),
        };
        let quiz = self.quiz_name.clone();
        self.deps.registry.update(&self.session_id, |s| {
            s.state = state;
            s.quiz = Some(quiz);
            s.mode = mode.map(|m| m.to_string());
            s.question = question;
        });
        self.grading_tx.send_replace(mode == Some(QuizMode::Grading));
    }

    /// Tear everything down exactly once
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cancel.cancel();
        self.grading_tx.send_replace(false);

        let state = self.signaling.state().to_string();
        if let Err(e) = self.signaling.close().await {
            warn!("Session {} transport close failed: {}", self.session_id, e);
        }
        self.exam = None;
        self.deps.registry.remove(&self.session_id);
        self.deps.events.publish(SystemEvent::SessionClosed {
            session_id: self.session_id.clone(),
            state,
        });
        info!("Session {} closed", self.session_id);
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn exam(&self) -> Option<&ExamSession> {
        self.exam.as_ref()
    }

    pub fn quiz_name(&self) -> &str {
        &self.quiz_name
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn signaling(&self) -> &SignalingSession<T> {
        &self.signaling
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_password;
    use crate::config::AccountConfig;
    use crate::exam::{AnswerLabel, Question, StaticQuizLoader};
    use crate::vision::{Hand, HandObservation};
    use crate::webrtc::transport::testing::FakeTransport;
    use crate::webrtc::SignalingState;
    use std::time::{Duration, Instant};

    const OFFER: &str = r#"{"type": "offer", "offer": {"sdp": "v=0\r\n", "type": "offer"}}"#;

    fn questions() -> Vec<Question> {
        vec![
            Question::new("Ohm's law?", ["P=IV", "V=IR", "E=mc2", "F=ma"], 2),
            Question::new("Unit of charge?", ["Volt", "Ohm", "Watt", "Coulomb"], 4),
            Question::new("Unit of power?", ["Watt", "Ohm", "Volt", "Tesla"], 1),
        ]
    }

    struct Harness {
        conn: Connection<FakeTransport>,
        transport: Arc<FakeTransport>,
        grading_rx: watch::Receiver<bool>,
        events: tokio::sync::broadcast::Receiver<SystemEvent>,
        registry: Arc<SessionRegistry>,
        cancel: CancellationToken,
    }

    fn harness(questions: Vec<Question>) -> Harness {
        let registry = Arc::new(SessionRegistry::new(4));
        let events = Arc::new(EventBus::new());
        let events_rx = events.subscribe();
        let roster = ExamRoster::new(&[AccountConfig {
            username: "alice".to_string(),
            password_hash: hash_password("secret").unwrap(),
            quiz: "STEM".to_string(),
        }]);
        let deps = ConnectionDeps {
            exam: ExamConfig::default(),
            quiz_loader: Arc::new(StaticQuizLoader::new(questions)),
            roster: Arc::new(roster),
            events,
            registry: registry.clone(),
        };

        let session_id = registry.reserve().unwrap();
        let transport = Arc::new(FakeTransport::default());
        let (grading_tx, grading_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let conn = Connection::new(session_id, transport.clone(), grading_tx, cancel.clone(), deps);

        Harness {
            conn,
            transport,
            grading_rx,
            events: events_rx,
            registry,
            cancel,
        }
    }

    fn gesture(fingers: [u8; 5], at: Instant) -> PeerEvent {
        PeerEvent::Observation(HandObservation::new(
            vec![Hand::with_fingers(fingers); 2],
            at,
        ))
    }

    async fn connect(h: &mut Harness) {
        assert_eq!(h.conn.handle_client_text(OFFER).await, Flow::Continue);
        assert_eq!(
            h.conn
                .handle_peer_event(PeerEvent::StateChanged(ConnectionState::Connected))
                .await,
            Flow::Continue
        );
    }

    #[tokio::test]
    async fn test_offer_answer_and_candidates() {
        let mut h = harness(questions());
        h.conn
            .handle_peer_event(PeerEvent::LocalCandidate(
                crate::webrtc::LocalCandidate::from_sdp(
                    "candidate:1 1 udp 100 10.0.0.1 5000 typ host",
                    Some("0".to_string()),
                    Some(0),
                )
                .unwrap(),
            ))
            .await;
        assert!(h.conn.take_outbound().is_empty());

        h.conn.handle_client_text(OFFER).await;
        let out = h.conn.take_outbound();
        assert_eq!(out.len(), 2);
        match &out[0] {
            ServerMessage::Answer { answer } => assert_eq!(answer.sdp_type, "answer"),
            other => panic!("expected answer, got {:?}", other),
        }
        assert!(matches!(&out[1], ServerMessage::IceCandidate { candidate } if candidate.port == 5000));
        assert_eq!(
            h.conn.signaling().state(),
            SignalingState::CandidatesGathering
        );
    }

    #[tokio::test]
    async fn test_invalid_messages_are_reported() {
        let mut h = harness(questions());
        h.conn.handle_client_text("not json").await;
        h.conn
            .handle_client_text(r#"{"type": "offer", "offer": {"sdp": "garbage", "type": "offer"}}"#)
            .await;
        h.conn
            .handle_client_text(r#"{"type": "ice_candidate", "candidate": "candidate:1 2 3"}"#)
            .await;
        h.conn
            .handle_client_text(r#"{"type": "ice_candidate", "candidate": ""}"#)
            .await;

        let out = h.conn.take_outbound();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|m| matches!(m, ServerMessage::Error { .. })));
        assert!(!h.conn.is_closed());
    }

    #[tokio::test]
    async fn test_exam_end_to_end() {
        let mut h = harness(questions());
        connect(&mut h).await;
        assert!(h.conn.exam().is_some());

        h.conn
            .handle_peer_event(PeerEvent::DataMessage(QUIZ_START.to_string()))
            .await;
        assert!(*h.grading_rx.borrow());
        let sent = h.transport.notifications();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["message"], "new_question");
        assert_eq!(sent[0]["qNo"], "Question 1");

        // Two fingers held past the hold interval answers question 1 with 2
        let t0 = Instant::now();
        h.conn.handle_peer_event(gesture([0, 1, 1, 0, 0], t0)).await;
        h.conn
            .handle_peer_event(gesture([0, 1, 1, 0, 0], t0 + Duration::from_millis(1100)))
            .await;

        let exam = h.conn.exam().unwrap();
        assert_eq!(exam.quiz().questions()[0].chosen_answer, Some(2));
        assert_eq!(exam.quiz().current_index(), 1);
        let sent = h.transport.notifications();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1]["qNo"], "Question 2");

        // Cooldown expiry tick, then a held thumb undoes
        h.conn
            .handle_peer_event(gesture([1, 0, 0, 0, 0], t0 + Duration::from_millis(2200)))
            .await;
        h.conn
            .handle_peer_event(gesture([1, 0, 0, 0, 0], t0 + Duration::from_millis(2300)))
            .await;
        h.conn
            .handle_peer_event(gesture([1, 0, 0, 0, 0], t0 + Duration::from_millis(3400)))
            .await;

        let exam = h.conn.exam().unwrap();
        assert_eq!(exam.quiz().current_index(), 0);
        assert_eq!(exam.quiz().questions()[0].chosen_answer, None);
        let sent = h.transport.notifications();
        assert_eq!(sent.last().unwrap()["qNo"], "Question 1");

        let info = h.registry.get(h.conn.session_id()).unwrap();
        assert_eq!(info.question, Some(0));
        assert_eq!(info.mode.as_deref(), Some("grading"));
    }

    #[tokio::test]
    async fn test_exam_finishes_with_score() {
        let mut h = harness(questions());
        connect(&mut h).await;
        h.conn
            .handle_peer_event(PeerEvent::DataMessage(QUIZ_START.to_string()))
            .await;

        let t0 = Instant::now();
        let exam = h.conn.exam.as_mut().unwrap();
        let obs = HandObservation::new(vec![], t0);
        exam.apply_confirmed(AnswerLabel::Choice(2), &obs);
        exam.apply_confirmed(AnswerLabel::Choice(4), &obs);
        let notifications = exam.apply_confirmed(AnswerLabel::Choice(3), &obs);
        h.conn.dispatch(notifications).await;

        let sent = h.transport.notifications();
        let last = sent.last().unwrap();
        assert_eq!(last["message"], "quiz_finished");
        assert_eq!(last["score"], 66.67);
        assert!(!*h.grading_rx.borrow());

        let mut finished = None;
        while let Ok(event) = h.events.try_recv() {
            if let SystemEvent::ExamFinished { score, .. } = event {
                finished = Some(score);
            }
        }
        assert_eq!(finished, Some(66.67));
    }

    #[tokio::test]
    async fn test_quiz_start_toggles() {
        let mut h = harness(questions());
        connect(&mut h).await;

        h.conn
            .handle_peer_event(PeerEvent::DataMessage("quiz_start".to_string()))
            .await;
        assert_eq!(h.conn.exam().unwrap().mode(), QuizMode::Grading);
        h.conn
            .handle_peer_event(PeerEvent::DataMessage("quiz_start".to_string()))
            .await;
        assert_eq!(h.conn.exam().unwrap().mode(), QuizMode::PassThrough);
        assert!(!*h.grading_rx.borrow());

        // Observations while paused change nothing
        let t0 = Instant::now();
        h.conn.handle_peer_event(gesture([0, 1, 0, 0, 0], t0)).await;
        h.conn
            .handle_peer_event(gesture([0, 1, 0, 0, 0], t0 + Duration::from_secs(2)))
            .await;
        assert_eq!(h.conn.exam().unwrap().quiz().current_index(), 0);
    }

    #[tokio::test]
    async fn test_hand_visibility_alerts() {
        let mut h = harness(questions());
        connect(&mut h).await;
        h.conn
            .handle_peer_event(PeerEvent::DataMessage(QUIZ_START.to_string()))
            .await;

        let t0 = Instant::now();
        h.conn
            .handle_peer_event(PeerEvent::Observation(HandObservation::empty(t0)))
            .await;
        h.conn
            .handle_peer_event(PeerEvent::Observation(HandObservation::empty(
                t0 + Duration::from_millis(100),
            )))
            .await;
        h.conn
            .handle_peer_event(gesture([0, 0, 0, 0, 0], t0 + Duration::from_secs(5)))
            .await;

        let kinds: Vec<String> = h
            .transport
            .notifications()
            .iter()
            .map(|n| n["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(kinds, vec!["new_question", "hand_unseen", "hand_seen"]);
    }

    #[tokio::test]
    async fn test_login_switches_quiz() {
        let mut h = harness(questions());
        assert_eq!(h.conn.quiz_name(), "Electrical");

        h.conn
            .handle_client_text(r#"{"type": "login", "username": "alice", "password": "nope"}"#)
            .await;
        h.conn
            .handle_client_text(r#"{"type": "login", "username": "", "password": ""}"#)
            .await;
        h.conn
            .handle_client_text(r#"{"type": "login", "username": "alice", "password": "secret"}"#)
            .await;

        let out: Vec<serde_json::Value> = h
            .conn
            .take_outbound()
            .iter()
            .map(|m| serde_json::to_value(m).unwrap())
            .collect();
        assert_eq!(out[0], serde_json::json!({"type": "login", "valid": "0"}));
        assert_eq!(out[1], serde_json::json!({"type": "login", "valid": "0"}));
        assert_eq!(out[2]["type"], "error");
        assert_eq!(out[3], serde_json::json!({"type": "login", "valid": "1"}));
        assert_eq!(h.conn.quiz_name(), "STEM");
    }

    #[tokio::test]
    async fn test_empty_quiz_closes_connection() {
        let mut h = harness(vec![]);
        h.conn.handle_client_text(OFFER).await;
        h.conn.take_outbound();

        let flow = h
            .conn
            .handle_peer_event(PeerEvent::StateChanged(ConnectionState::Connected))
            .await;
        assert_eq!(flow, Flow::Close);
        let out = h.conn.take_outbound();
        assert!(matches!(&out[0], ServerMessage::Error { message } if message.contains("Quiz data")));
        assert!(h.conn.exam().is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut h = harness(questions());
        connect(&mut h).await;
        let id = h.conn.session_id().to_string();

        assert_eq!(
            h.conn
                .handle_peer_event(PeerEvent::StateChanged(ConnectionState::Failed))
                .await,
            Flow::Close
        );
        h.conn.close().await;
        h.conn.close().await;

        assert_eq!(h.transport.close_count(), 1);
        assert!(h.cancel.is_cancelled());
        assert!(h.registry.get(&id).is_none());
        assert!(h.conn.exam().is_none());

        let closed = std::iter::from_fn(|| h.events.try_recv().ok())
            .filter(|e| matches!(e, SystemEvent::SessionClosed { .. }))
            .count();
        assert_eq!(closed, 1);
    }
}
