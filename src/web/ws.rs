//! Proctor event stream at `/api/ws`
//!
//! - Broadcasts session and exam events to connected clients
//! - Topic filtering (`*`, `exam.*`, `session.closed`)
//! - Heartbeat ping every 30 seconds

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::events::SystemEvent;
use crate::state::AppState;

/// Client-to-server message
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload")]
enum ProctorMessage {
    #[serde(rename = "subscribe")]
    Subscribe { topics: Vec<String> },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { topics: Vec<String> },

    #[serde(rename = "ping")]
    Ping,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut event_rx = state.events.subscribe();
    let mut shutdown_rx = state.shutdown_signal();

    // Nothing is sent until the client subscribes
    let mut subscribed_topics: Vec<String> = vec![];

    info!("Proctor client connected");

    let mut heartbeat_interval = tokio::time::interval(tokio::time::Duration::from_secs(30));

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = handle_proctor_message(&text, &mut subscribed_topics) {
                            warn!("Failed to handle proctor message: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Proctor client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Proctor WebSocket receive error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if should_send_event(&event, &subscribed_topics) {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if sender.send(Message::Text(json)).await.is_err() {
                                    warn!("Failed to send event to proctor, disconnecting");
                                    break;
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Proctor client lagged by {} events", n);
                    }
                    Err(_) => {
                        warn!("Event bus closed");
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    warn!("Failed to send ping, disconnecting");
                    break;
                }
            }

            _ = shutdown_rx.recv() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    debug!("Proctor WebSocket handler exiting");
}

fn handle_proctor_message(text: &str, topics: &mut Vec<String>) -> serde_json::Result<()> {
    let msg: ProctorMessage = serde_json::from_str(text)?;

    match msg {
        ProctorMessage::Subscribe { topics: new_topics } => {
            info!("Proctor subscribed to topics: {:?}", new_topics);
            *topics = new_topics;
        }
        ProctorMessage::Unsubscribe {
            topics: remove_topics,
        } => {
            topics.retain(|t| !remove_topics.contains(t));
            info!("Proctor unsubscribed from topics: {:?}", remove_topics);
        }
        ProctorMessage::Ping => {
            debug!("Received ping from proctor");
        }
    }

    Ok(())
}

fn should_send_event(event: &SystemEvent, topics: &[String]) -> bool {
    topics.iter().any(|topic| event.matches_topic(topic))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> SystemEvent {
        SystemEvent::ExamQuestion {
            session_id: "s1".to_string(),
            index: 2,
        }
    }

    #[test]
    fn test_should_send_event() {
        assert!(should_send_event(&event(), &["*".to_string()]));
        assert!(should_send_event(&event(), &["exam.*".to_string()]));
        assert!(should_send_event(&event(), &["exam.question".to_string()]));
        assert!(!should_send_event(&event(), &["session.*".to_string()]));
        assert!(!should_send_event(&event(), &[]));
    }

    #[test]
    fn test_subscription_messages() {
        let mut topics = vec![];
        handle_proctor_message(
            r#"{"type": "subscribe", "payload": {"topics": ["exam.*", "session.closed"]}}"#,
            &mut topics,
        )
        .unwrap();
        assert_eq!(topics.len(), 2);

        handle_proctor_message(
            r#"{"type": "unsubscribe", "payload": {"topics": ["exam.*"]}}"#,
            &mut topics,
        )
        .unwrap();
        assert_eq!(topics, vec!["session.closed".to_string()]);

        handle_proctor_message(r#"{"type": "ping"}"#, &mut topics).unwrap();
        assert!(handle_proctor_message("{}", &mut topics).is_err());
    }
}
