//! WebRTC configuration

use std::time::Duration;
use webrtc::ice_transport::ice_server::RTCIceServer;

use crate::config::{TurnServerConfig, WebRtcSettings};

/// Resolved per-connection WebRTC configuration
#[derive(Debug, Clone)]
pub struct WebRtcConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServerConfig>,
    /// Label of the notification channel the server creates
    pub data_channel_label: String,
    /// Relay the received video back on a local track
    pub echo_video: bool,
    /// How long to wait for candidate gathering before giving up on it
    pub gathering_timeout: Duration,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self::from(&WebRtcSettings::default())
    }
}

impl From<&WebRtcSettings> for WebRtcConfig {
    fn from(settings: &WebRtcSettings) -> Self {
        Self {
            stun_servers: settings
                .stun_servers
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            turn_servers: settings
                .turn_servers
                .iter()
                .filter(|t| !t.urls.is_empty())
                .cloned()
                .collect(),
            data_channel_label: settings.data_channel_label.clone(),
            echo_video: settings.echo_video,
            gathering_timeout: Duration::from_millis(settings.gathering_timeout_ms),
        }
    }
}

impl WebRtcConfig {
    /// Build the ICE server list for `RTCConfiguration`
    pub fn ice_servers(&self) -> Vec<RTCIceServer> {
        let mut ice_servers = vec![];

        for stun_url in &self.stun_servers {
            ice_servers.push(RTCIceServer {
                urls: vec![stun_url.clone()],
                ..Default::default()
            });
        }

        for turn in &self.turn_servers {
            ice_servers.push(RTCIceServer {
                urls: turn.urls.clone(),
                username: turn.username.clone(),
                credential: turn.credential.clone(),
                ..Default::default()
            });
        }

        ice_servers
    }

    pub fn has_turn(&self) -> bool {
        !self.turn_servers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uses_public_stun() {
        let config = WebRtcConfig::default();
        assert_eq!(config.stun_servers.len(), 2);
        assert!(!config.has_turn());
        assert_eq!(config.data_channel_label, "message");
        assert_eq!(config.gathering_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_ice_servers() {
        let settings = WebRtcSettings {
            stun_servers: vec!["stun:a:3478".to_string(), "  ".to_string()],
            turn_servers: vec![
                TurnServerConfig {
                    urls: vec!["turn:t:3478?transport=udp".to_string()],
                    username: "u".to_string(),
                    credential: "p".to_string(),
                },
                TurnServerConfig {
                    urls: vec![],
                    username: "ignored".to_string(),
                    credential: String::new(),
                },
            ],
            ..Default::default()
        };

        let servers = WebRtcConfig::from(&settings).ice_servers();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["stun:a:3478".to_string()]);
        assert_eq!(servers[1].username, "u");
        assert_eq!(servers[1].credential, "p");
    }
}
