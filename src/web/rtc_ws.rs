//! Signaling WebSocket at `/ws/rtc/`
//!
//! One socket drives one peer connection. The loop owns the [`Connection`]
//! and is the only place exam state is touched:
//!
//! - inbound socket text: offer, ICE candidates, login
//! - peer events: local candidates, state changes, data-channel text,
//!   hand observations
//! - heartbeat ping every 30 seconds
//! - server shutdown

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{Connection, Flow};
use crate::error::Result;
use crate::state::AppState;
use crate::webrtc::{MediaContext, PeerEvent, ServerMessage, WebRtcConfig, WebRtcPeer};

/// Peer event queue depth per connection
const PEER_EVENT_CAPACITY: usize = 256;

const HEARTBEAT_SECS: u64 = 30;

type SocketSink = SplitSink<WebSocket, Message>;

pub async fn rtc_ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let session_id = match state.registry.reserve() {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };

    let registry = state.registry.clone();
    let failed_id = session_id.clone();
    ws.on_failed_upgrade(move |e| {
        warn!("Signaling upgrade failed for {}: {}", failed_id, e);
        registry.remove(&failed_id);
    })
    .on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (event_tx, mut event_rx) = mpsc::channel(PEER_EVENT_CAPACITY);
    let (grading_tx, grading_rx) = watch::channel(false);
    let cancel = CancellationToken::new();

    let peer = match create_peer(&state, &session_id, event_tx, grading_rx, cancel.clone()).await {
        Ok(peer) => Arc::new(peer),
        Err(e) => {
            warn!("Failed to create peer for {}: {}", session_id, e);
            let _ = send_messages(&mut sender, vec![ServerMessage::error(e.to_string())]).await;
            let _ = sender.send(Message::Close(None)).await;
            state.registry.remove(&session_id);
            return;
        }
    };

    let mut conn = Connection::new(
        session_id.clone(),
        peer,
        grading_tx,
        cancel.clone(),
        state.connection_deps(),
    );
    info!("Signaling client connected: {}", session_id);

    let mut shutdown_rx = state.shutdown_signal();
    let mut heartbeat_interval =
        tokio::time::interval(tokio::time::Duration::from_secs(HEARTBEAT_SECS));

    loop {
        let flow = tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => conn.handle_client_text(&text).await,
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Signaling client disconnected: {}", session_id);
                        Flow::Close
                    }
                    Some(Err(e)) => {
                        warn!("Signaling receive error for {}: {}", session_id, e);
                        Flow::Close
                    }
                    _ => Flow::Continue,
                }
            }

            event = event_rx.recv() => {
                match event {
                    Some(event) => conn.handle_peer_event(event).await,
                    None => Flow::Close,
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    Flow::Close
                } else {
                    Flow::Continue
                }
            }

            _ = shutdown_rx.recv() => {
                debug!("Shutdown, closing signaling socket {}", session_id);
                Flow::Close
            }
        };

        let outbound = conn.take_outbound();
        if send_messages(&mut sender, outbound).await.is_err() {
            warn!("Failed to send to signaling client {}, disconnecting", session_id);
            break;
        }

        if flow == Flow::Close {
            break;
        }
    }

    conn.close().await;
    let _ = send_messages(&mut sender, conn.take_outbound()).await;
    let _ = sender.send(Message::Close(None)).await;
    debug!("Signaling handler exiting: {}", session_id);
}

async fn create_peer(
    state: &AppState,
    session_id: &str,
    events: mpsc::Sender<PeerEvent>,
    grading: watch::Receiver<bool>,
    cancel: CancellationToken,
) -> Result<WebRtcPeer> {
    let config = state.config.get();
    let media = MediaContext {
        session_id: session_id.to_string(),
        sample_every: config.exam.sample_every,
        detector: state.detector.clone(),
        events,
        grading,
        cancel,
    };
    WebRtcPeer::new(&WebRtcConfig::from(&config.webrtc), media).await
}

async fn send_messages(
    sender: &mut SocketSink,
    messages: Vec<ServerMessage>,
) -> std::result::Result<(), axum::Error> {
    for msg in messages {
        match serde_json::to_string(&msg) {
            Ok(json) => sender.send(Message::Text(json)).await?,
            Err(e) => warn!("Failed to serialize signaling message: {}", e),
        }
    }
    Ok(())
}
