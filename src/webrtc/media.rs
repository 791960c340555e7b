//! Remote video handling
//!
//! ```text
//! TrackRemote::read_rtp
//!        |--------------------> echo track (unchanged RTP)
//!        v
//! SampleBuilder (depacketize into encoded frames)
//!        |
//!        v
//! FramePump (FrameSampler, 1 of every K; only while grading)
//!        |  try_send, capacity 1
//!        v
//! detection worker (HandDetector) --> PeerEvent::Observation
//! ```

use rtp::codecs::{h264::H264Packet, vp8::Vp8Packet, vp9::Vp9Packet};
use rtp::packetizer::Depacketizer;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use webrtc::api::media_engine::{MIME_TYPE_H264, MIME_TYPE_VP8, MIME_TYPE_VP9};
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_remote::TrackRemote;

use super::transport::PeerEvent;
use crate::exam::FrameSampler;
use crate::utils::LogThrottler;
use crate::vision::{HandDetector, HandObservation, VideoFrame};
use crate::warn_throttled;

/// Packets a sample may arrive late before it is dropped
const MAX_LATE_PACKETS: u16 = 64;

/// Everything a video track task needs from its connection
#[derive(Clone)]
pub struct MediaContext {
    pub session_id: String,
    pub sample_every: u32,
    pub detector: Arc<dyn HandDetector>,
    pub events: mpsc::Sender<PeerEvent>,
    /// `true` while the exam is grading
    pub grading: watch::Receiver<bool>,
    pub cancel: CancellationToken,
}

/// Rate-limits decoded frames into the detection queue
pub struct FramePump {
    sampler: FrameSampler,
    frames: mpsc::Sender<VideoFrame>,
    grading: watch::Receiver<bool>,
    dropped: u64,
}

impl FramePump {
    pub fn new(
        sample_every: u32,
        frames: mpsc::Sender<VideoFrame>,
        grading: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sampler: FrameSampler::new(sample_every),
            frames,
            grading,
            dropped: 0,
        }
    }

    /// Offer one frame; returns true if it was queued for detection
    pub fn push(&mut self, frame: VideoFrame) -> bool {
        let tick = self.sampler.submit(frame);
        if !tick.is_sampled() || !*self.grading.borrow() {
            return false;
        }

        match self.frames.try_send(tick.into_frame()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(frame)) => {
                self.dropped += 1;
                trace!("Detector busy, dropping frame {}", frame.sequence);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Sampled frames dropped because detection was still running
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Spawn the reader and detection tasks for a remote video track
pub fn spawn_video_pipeline(
    track: Arc<TrackRemote>,
    echo: Option<Arc<TrackLocalStaticRTP>>,
    ctx: MediaContext,
) {
    let mime_type = track.codec().capability.mime_type.clone();
    let clock_rate = track.codec().capability.clock_rate;
    info!(
        "Session {} video track {} ({}, {} Hz)",
        ctx.session_id,
        track.id(),
        mime_type,
        clock_rate
    );

    let (frame_tx, frame_rx) = mpsc::channel::<VideoFrame>(1);
    tokio::spawn(run_detection_worker(
        frame_rx,
        ctx.detector.clone(),
        ctx.events.clone(),
        ctx.cancel.clone(),
    ));

    let pump = FramePump::new(ctx.sample_every, frame_tx, ctx.grading.clone());
    let mime = mime_type.to_ascii_lowercase();
    tokio::spawn(async move {
        if mime == MIME_TYPE_VP8.to_ascii_lowercase() {
            let builder = SampleBuilder::new(MAX_LATE_PACKETS, Vp8Packet::default(), clock_rate);
            read_track(track, echo, builder, pump, mime_type, ctx).await;
        } else if mime == MIME_TYPE_VP9.to_ascii_lowercase() {
            let builder = SampleBuilder::new(MAX_LATE_PACKETS, Vp9Packet::default(), clock_rate);
            read_track(track, echo, builder, pump, mime_type, ctx).await;
        } else if mime == MIME_TYPE_H264.to_ascii_lowercase() {
            let builder = SampleBuilder::new(MAX_LATE_PACKETS, H264Packet::default(), clock_rate);
            read_track(track, echo, builder, pump, mime_type, ctx).await;
        } else {
            info!(
                "Session {} has no depacketizer for {}, relaying only",
                ctx.session_id, mime_type
            );
            relay_only(track, echo, ctx).await;
        }
    });
}

async fn read_track<D: Depacketizer + Send>(
    track: Arc<TrackRemote>,
    echo: Option<Arc<TrackLocalStaticRTP>>,
    mut builder: SampleBuilder<D>,
    mut pump: FramePump,
    mime_type: String,
    ctx: MediaContext,
) {
    let throttler = LogThrottler::default();
    let mut sequence: u64 = 0;

    loop {
        let packet = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            result = track.read_rtp() => match result {
                Ok((packet, _)) => packet,
                Err(e) => {
                    debug!("Session {} track read ended: {}", ctx.session_id, e);
                    break;
                }
            },
        };

        if let Some(ref echo) = echo {
            if let Err(e) = echo.write_rtp(&packet).await {
                warn_throttled!(
                    throttler,
                    "echo",
                    "Session {} echo write failed: {}",
                    ctx.session_id,
                    e
                );
            }
        }

        builder.push(packet);
        while let Some(sample) = builder.pop() {
            sequence += 1;
            pump.push(VideoFrame::new(sample.data, mime_type.clone(), sequence));
        }
    }

    info!(
        "Session {} video reader stopped after {} frames ({} dropped while detecting)",
        ctx.session_id,
        sequence,
        pump.dropped()
    );
}

async fn relay_only(
    track: Arc<TrackRemote>,
    echo: Option<Arc<TrackLocalStaticRTP>>,
    ctx: MediaContext,
) {
    let throttler = LogThrottler::default();
    loop {
        let packet = tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            result = track.read_rtp() => match result {
                Ok((packet, _)) => packet,
                Err(_) => break,
            },
        };
        if let Some(ref echo) = echo {
            if let Err(e) = echo.write_rtp(&packet).await {
                warn_throttled!(
                    throttler,
                    "echo",
                    "Session {} echo write failed: {}",
                    ctx.session_id,
                    e
                );
            }
        }
    }
}

/// Run the detector on queued frames and report observations
///
/// A failed detection counts as zero hands.
pub async fn run_detection_worker(
    mut frames: mpsc::Receiver<VideoFrame>,
    detector: Arc<dyn HandDetector>,
    events: mpsc::Sender<PeerEvent>,
    cancel: CancellationToken,
) {
    let throttler = LogThrottler::default();

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let observed_at = frame.received_at;
        let observation = match detector.detect(&frame).await {
            Ok(hands) => {
                throttler.clear("detect");
                HandObservation::new(hands, observed_at)
            }
            Err(e) => {
                warn_throttled!(
                    throttler,
                    "detect",
                    "Hand detector {} failed: {}",
                    detector.name(),
                    e
                );
                HandObservation::empty(observed_at)
            }
        };

        trace!(
            "Frame {}: {} hands",
            frame.sequence,
            observation.hand_count()
        );
        if events.send(PeerEvent::Observation(observation)).await.is_err() {
            break;
        }
    }
}
