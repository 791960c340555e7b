//! Hand observation
//!
//! The hand/landmark detector is an external collaborator. This module
//! defines what the exam needs from it: per frame, a list of hands, each
//! reducible to a 5-digit up/down finger pattern.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::Result;
use crate::exam::gesture::FingerPattern;

pub use http::HttpHandDetector;

/// Number of landmarks per hand (wrist + 4 per finger)
pub const LANDMARK_COUNT: usize = 21;

const THUMB_TIP: usize = 4;
const FINGER_TIPS: [usize; 4] = [8, 12, 16, 20];

/// An encoded video frame as received from the peer
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Encoded frame payload
    pub data: Bytes,
    /// Codec mime type, e.g. `video/VP8`
    pub mime_type: String,
    /// Frame sequence number within the track
    pub sequence: u64,
    /// When the frame was assembled
    pub received_at: Instant,
}

impl VideoFrame {
    pub fn new(data: Bytes, mime_type: impl Into<String>, sequence: u64) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            sequence,
            received_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

/// Normalized landmark position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

/// One detected hand
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hand {
    /// Up/down digits, thumb first, when the detector reports them
    #[serde(default)]
    pub fingers: Option<FingerPattern>,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub handedness: Option<Handedness>,
}

impl Hand {
    pub fn with_fingers(fingers: FingerPattern) -> Self {
        Self {
            fingers: Some(fingers),
            ..Default::default()
        }
    }

    /// Finger up/down pattern, derived from landmarks if not reported
    ///
    /// Thumb is compared horizontally (tip vs IP joint, direction by
    /// handedness, mirrored frame); the other fingers are up when the tip is
    /// above the PIP joint.
    pub fn finger_pattern(&self) -> Option<FingerPattern> {
        if let Some(fingers) = self.fingers {
            return Some(fingers.map(|d| u8::from(d != 0)));
        }
        if self.landmarks.len() < LANDMARK_COUNT {
            return None;
        }

        let lm = &self.landmarks;
        let mut pattern = [0u8; 5];
        let thumb_up = match self.handedness.unwrap_or(Handedness::Right) {
            Handedness::Right => lm[THUMB_TIP].x > lm[THUMB_TIP - 1].x,
            Handedness::Left => lm[THUMB_TIP].x < lm[THUMB_TIP - 1].x,
        };
        pattern[0] = u8::from(thumb_up);
        for (i, tip) in FINGER_TIPS.iter().enumerate() {
            pattern[i + 1] = u8::from(lm[*tip].y < lm[*tip - 2].y);
        }
        Some(pattern)
    }
}

/// Hands seen on one sampled frame
#[derive(Debug, Clone)]
pub struct HandObservation {
    pub hands: Vec<Hand>,
    pub observed_at: Instant,
}

impl HandObservation {
    pub fn new(hands: Vec<Hand>, observed_at: Instant) -> Self {
        Self { hands, observed_at }
    }

    /// Zero-hand observation, used when the detector has no result
    pub fn empty(observed_at: Instant) -> Self {
        Self::new(vec![], observed_at)
    }

    pub fn hand_count(&self) -> usize {
        self.hands.len()
    }

    /// Finger pattern of the last detected hand
    pub fn primary_pattern(&self) -> Option<FingerPattern> {
        self.hands.last().and_then(Hand::finger_pattern)
    }
}

/// Hand detector collaborator
#[async_trait]
pub trait HandDetector: Send + Sync {
    /// Detect hands on a frame
    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<Hand>>;

    /// Detector name for logs
    fn name(&self) -> &str;
}

/// Detector used when no endpoint is configured: never sees a hand
#[derive(Debug, Default, Clone)]
pub struct NoHandsDetector;

#[async_trait]
impl HandDetector for NoHandsDetector {
    async fn detect(&self, _frame: &VideoFrame) -> Result<Vec<Hand>> {
        Ok(vec![])
    }

    fn name(&self) -> &str {
        "none"
    }
}
