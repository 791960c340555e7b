//! gesture-exam - gesture-driven remote exams over WebRTC
//!
//! A browser sends camera video over a WebRTC peer connection; sampled
//! frames are run through a hand detector, finger-count gestures are
//! debounced into answers, and quiz progress is pushed back on a data
//! channel.

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod exam;
pub mod state;
pub mod utils;
pub mod vision;
pub mod web;
pub mod webrtc;

pub use error::{AppError, Result};
