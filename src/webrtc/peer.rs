//! webrtc-rs backed transport

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_VP8};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice::mdns::MulticastDnsMode;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::candidate::{LocalCandidate, RemoteCandidate};
use super::config::WebRtcConfig;
use super::mdns::{mdns_host_name, mdns_mode};
use super::media::{spawn_video_pipeline, MediaContext};
use super::signaling::{ConnectionState, SessionDescription};
use super::transport::{PeerEvent, PeerTransport};
use crate::error::{AppError, Result};

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
            _ => ConnectionState::New,
        }
    }
}

fn webrtc_err(context: &str) -> impl Fn(webrtc::Error) -> AppError + '_ {
    move |e| AppError::WebRtcError(format!("{}: {}", context, e))
}

/// One browser connection: peer connection, notification channel, echo track
pub struct WebRtcPeer {
    session_id: String,
    pc: Arc<RTCPeerConnection>,
    /// Channel the server created for notifications
    notify_channel: Arc<RTCDataChannel>,
    /// Channels the client opened
    client_channels: Arc<RwLock<Vec<Arc<RTCDataChannel>>>>,
    gathering_timeout: Duration,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl WebRtcPeer {
    /// Create the peer connection and wire its callbacks into `media.events`
    pub async fn new(config: &WebRtcConfig, media: MediaContext) -> Result<Self> {
        let session_id = media.session_id.clone();

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(webrtc_err("Failed to register codecs"))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(webrtc_err("Failed to register interceptors"))?;

        let mut setting_engine = SettingEngine::default();
        let mode = mdns_mode();
        setting_engine.set_ice_multicast_dns_mode(mode);
        if mode == MulticastDnsMode::QueryAndGather {
            setting_engine.set_multicast_dns_host_name(mdns_host_name(&session_id));
        }
        debug!("WebRTC mDNS mode: {:?} (session {})", mode, session_id);

        let api = APIBuilder::new()
            .with_setting_engine(setting_engine)
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config.ice_servers(),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(webrtc_err("Failed to create peer connection"))?,
        );

        let notify_channel = pc
            .create_data_channel(&config.data_channel_label, None)
            .await
            .map_err(webrtc_err("Failed to create data channel"))?;
        forward_messages(&notify_channel, media.events.clone());

        let echo_track = if config.echo_video {
            Some(add_echo_track(&pc, &media.cancel).await?)
        } else {
            None
        };

        let peer = Self {
            session_id,
            pc,
            notify_channel,
            client_channels: Arc::new(RwLock::new(vec![])),
            gathering_timeout: config.gathering_timeout,
            cancel: media.cancel.clone(),
            closed: AtomicBool::new(false),
        };
        peer.setup_event_handlers(media, echo_track);

        info!(
            "Peer {} created (data channel '{}', echo {}, turn {})",
            peer.session_id,
            config.data_channel_label,
            config.echo_video,
            config.has_turn()
        );
        Ok(peer)
    }

    fn setup_event_handlers(&self, media: MediaContext, echo: Option<Arc<TrackLocalStaticRTP>>) {
        let events = media.events.clone();
        let session_id = self.session_id.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let events = events.clone();
                let session_id = session_id.clone();
                Box::pin(async move {
                    if s == RTCPeerConnectionState::Unspecified {
                        return;
                    }
                    let state = ConnectionState::from(s);
                    info!("Peer {} connection state: {}", session_id, state);
                    let _ = events.send(PeerEvent::StateChanged(state)).await;
                })
            }));

        let events = media.events.clone();
        let session_id = self.session_id.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let events = events.clone();
                let session_id = session_id.clone();
                Box::pin(async move {
                    let Some(c) = candidate else {
                        debug!("Peer {} candidate gathering complete", session_id);
                        let _ = events.send(PeerEvent::GatheringComplete).await;
                        return;
                    };
                    let init = match c.to_json() {
                        Ok(init) => init,
                        Err(e) => {
                            warn!("Peer {} unserializable candidate: {}", session_id, e);
                            return;
                        }
                    };
                    match LocalCandidate::from_sdp(&init.candidate, init.sdp_mid, init.sdp_mline_index) {
                        Ok(local) => {
                            debug!("Peer {} local candidate: {}", session_id, local.candidate);
                            let _ = events.send(PeerEvent::LocalCandidate(local)).await;
                        }
                        Err(e) => warn!("Peer {} skipped local candidate: {}", session_id, e),
                    }
                })
            }));

        let events = media.events.clone();
        let client_channels = self.client_channels.clone();
        self.pc
            .on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                let events = events.clone();
                let client_channels = client_channels.clone();
                Box::pin(async move {
                    info!("Client data channel opened: {}", dc.label());
                    forward_messages(&dc, events);
                    client_channels.write().push(dc);
                })
            }));

        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>, _receiver, _transceiver| {
                let media = media.clone();
                let echo = echo.clone();
                Box::pin(async move {
                    if track.kind() != RTPCodecType::Video {
                        debug!("Session {} ignoring {} track", media.session_id, track.kind());
                        return;
                    }
                    let mime_type = track.codec().capability.mime_type.clone();
                    let _ = media
                        .events
                        .send(PeerEvent::MediaStarted {
                            mime_type: mime_type.clone(),
                        })
                        .await;

                    // The echo track was negotiated for one codec only
                    let echo = echo.filter(|e| {
                        e.codec().mime_type.eq_ignore_ascii_case(&mime_type)
                    });
                    spawn_video_pipeline(track, echo, media);
                })
            },
        ));
    }

    /// Warn if gathering has not finished within the configured timeout
    async fn watch_gathering(&self) {
        let mut done = self.pc.gathering_complete_promise().await;
        let timeout = self.gathering_timeout;
        let session_id = self.session_id.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = tokio::time::timeout(timeout, done.recv()) => {
                    if result.is_err() {
                        warn!(
                            "Peer {} candidate gathering still running after {:?}",
                            session_id, timeout
                        );
                    }
                }
            }
        });
    }

    fn open_channel(&self) -> Option<Arc<RTCDataChannel>> {
        if self.notify_channel.ready_state() == RTCDataChannelState::Open {
            return Some(self.notify_channel.clone());
        }
        self.client_channels
            .read()
            .iter()
            .find(|dc| dc.ready_state() == RTCDataChannelState::Open)
            .cloned()
    }
}

/// Forward text (and UTF-8 binary) messages of a data channel as events
fn forward_messages(dc: &Arc<RTCDataChannel>, events: mpsc::Sender<PeerEvent>) {
    let label = dc.label().to_string();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let events = events.clone();
        let label = label.clone();
        Box::pin(async move {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => {
                    debug!("DataChannel '{}' message: {}", label, text);
                    let _ = events.send(PeerEvent::DataMessage(text)).await;
                }
                Err(_) => debug!("DataChannel '{}' non-text message ignored", label),
            }
        })
    }));
}

/// Add the loopback video track and drain its RTCP
async fn add_echo_track(
    pc: &Arc<RTCPeerConnection>,
    cancel: &CancellationToken,
) -> Result<Arc<TrackLocalStaticRTP>> {
    let track = Arc::new(TrackLocalStaticRTP::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        "video".to_owned(),
        "gesture-exam-echo".to_owned(),
    ));

    let sender = pc
        .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .map_err(webrtc_err("Failed to add echo track"))?;

    // Interceptors only run while RTCP is being read
    let cancel = cancel.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = sender.read(&mut buf) => {
                    if result.is_err() {
                        break;
                    }
                }
            }
        }
    });

    Ok(track)
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    async fn accept_offer(&self, offer: &SessionDescription) -> Result<SessionDescription> {
        let sdp = RTCSessionDescription::offer(offer.sdp.clone())
            .map_err(|e| AppError::Negotiation(format!("Invalid SDP offer: {}", e)))?;

        self.pc
            .set_remote_description(sdp)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::Negotiation(format!("Failed to create answer: {}", e)))?;

        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(webrtc_err("Failed to set local description"))?;

        self.watch_gathering().await;

        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn add_remote_candidate(&self, candidate: &RemoteCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.to_sdp(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment.clone(),
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(webrtc_err("Failed to add ICE candidate"))
    }

    async fn send_notification(&self, payload: &str) -> Result<()> {
        let Some(dc) = self.open_channel() else {
            return Err(AppError::ServiceUnavailable(
                "no open data channel".to_string(),
            ));
        };
        dc.send_text(payload.to_string())
            .await
            .map_err(webrtc_err("Failed to send notification"))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.cancel.cancel();
        self.pc
            .close()
            .await
            .map_err(webrtc_err("Failed to close peer connection"))?;
        debug!("Peer {} closed", self.session_id);
        Ok(())
    }
}
