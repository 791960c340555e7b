use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// WebRTC / ICE settings
    pub webrtc: WebRtcSettings,
    /// Exam behaviour
    pub exam: ExamConfig,
    /// Hand detector endpoint
    pub detector: DetectorConfig,
    /// Exam takers allowed to log in
    pub accounts: Vec<AccountConfig>,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub bind_address: String,
    /// HTTP port
    pub http_port: u16,
    /// HTTPS port
    pub https_port: u16,
    /// Enable HTTPS (browsers only allow camera access on secure origins)
    pub https_enabled: bool,
    /// Custom SSL certificate path
    pub ssl_cert_path: Option<String>,
    /// Custom SSL key path
    pub ssl_key_path: Option<String>,
    /// Maximum concurrent exam connections
    pub max_sessions: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 8000,
            https_port: 8443,
            https_enabled: false,
            ssl_cert_path: None,
            ssl_key_path: None,
            max_sessions: 8,
        }
    }
}

/// TURN server entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnServerConfig {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// WebRTC settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcSettings {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN servers
    pub turn_servers: Vec<TurnServerConfig>,
    /// Label of the server-created notification data channel
    pub data_channel_label: String,
    /// Send received video back to the client unchanged
    pub echo_video: bool,
    /// ICE gathering timeout in milliseconds
    pub gathering_timeout_ms: u64,
}

impl Default for WebRtcSettings {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            turn_servers: vec![],
            data_channel_label: "message".to_string(),
            echo_video: true,
            gathering_timeout_ms: 5000,
        }
    }
}

/// Exam configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExamConfig {
    /// Directory holding quiz files (relative paths resolve under the data dir)
    pub quiz_dir: String,
    /// Quiz used when the client does not log in
    pub default_quiz: String,
    /// Run hand detection on 1 of every N frames
    pub sample_every: u32,
    /// Gesture must be seen again after this long to confirm
    pub hold_interval_ms: u64,
    /// Minimum time between confirmed gestures
    pub cooldown_ms: u64,
    /// Hands that must stay in frame (2, or 1 for single-hand mode)
    pub required_hands: usize,
    /// Accept the thumb-only undo gesture
    pub undo_enabled: bool,
    /// Send question images with `new_question`
    pub include_images: bool,
}

impl Default for ExamConfig {
    fn default() -> Self {
        Self {
            quiz_dir: "quiz".to_string(),
            default_quiz: "Electrical".to_string(),
            sample_every: 3,
            hold_interval_ms: 1000,
            cooldown_ms: 1000,
            required_hands: 2,
            undo_enabled: true,
            include_images: true,
        }
    }
}

/// Hand detector endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Inference endpoint; `None` disables detection
    pub url: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: 2000,
        }
    }
}

/// Exam taker account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    /// Quiz assigned to this account
    pub quiz: String,
}
