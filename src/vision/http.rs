//! HTTP hand detector client
//!
//! Posts the encoded frame to an inference endpoint. The endpoint decodes the
//! frame and answers with `{"hands": [{"fingers": [0,1,0,0,0], ...}]}`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::trace;

use super::{Hand, HandDetector, VideoFrame};
use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    hands: Vec<Hand>,
}

/// Remote hand detector reached over HTTP
pub struct HttpHandDetector {
    client: reqwest::Client,
    url: String,
}

impl HttpHandDetector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Detector(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Parse the endpoint response body
fn parse_response(body: &[u8]) -> Result<Vec<Hand>> {
    let response: DetectResponse = serde_json::from_slice(body)
        .map_err(|e| AppError::Detector(format!("Invalid detector response: {}", e)))?;
    Ok(response.hands)
}

#[async_trait]
impl HandDetector for HttpHandDetector {
    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<Hand>> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, frame.mime_type.as_str())
            .header("X-Frame-Sequence", frame.sequence.to_string())
            .body(frame.data.clone())
            .send()
            .await
            .map_err(|e| AppError::Detector(format!("Detector request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Detector(format!(
                "Detector returned HTTP {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::Detector(format!("Failed to read detector response: {}", e)))?;
        let hands = parse_response(&body)?;
        trace!("Frame {}: {} hands", frame.sequence, hands.len());
        Ok(hands)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let hands = parse_response(
            br#"{"hands": [{"fingers": [0,1,1,0,0], "handedness": "Right"}, {"landmarks": []}]}"#,
        )
        .unwrap();
        assert_eq!(hands.len(), 2);
        assert_eq!(hands[0].finger_pattern(), Some([0, 1, 1, 0, 0]));
        assert_eq!(hands[1].finger_pattern(), None);
    }

    #[test]
    fn test_parse_empty_and_invalid() {
        assert!(parse_response(b"{}").unwrap().is_empty());
        assert!(matches!(
            parse_response(b"not json"),
            Err(AppError::Detector(_))
        ));
    }

    #[test]
    fn test_new_detector() {
        let detector =
            HttpHandDetector::new("http://127.0.0.1:9000/detect", Duration::from_secs(2)).unwrap();
        assert_eq!(detector.url(), "http://127.0.0.1:9000/detect");
        assert_eq!(detector.name(), "http");
    }
}
