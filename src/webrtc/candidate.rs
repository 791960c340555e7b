//! ICE candidate parsing and normalization
//!
//! Browsers send remote candidates in one of three shapes:
//!
//! - a bare SDP attribute string, `"candidate:842163049 1 udp 1677729535 203.0.113.7 54321 typ srflx ..."`
//! - an `RTCIceCandidateInit` object, `{candidate, sdpMid, sdpMLineIndex, usernameFragment}`
//! - an already-split object, `{foundation, component, protocol, priority, ip, port, type, sdpMid, sdpMLineIndex}`
//!
//! All three normalize into [`RemoteCandidate`]. An empty or absent candidate
//! is the end-of-candidates marker and normalizes to `None`.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Minimum fields in a candidate line: foundation .. port, `typ`, type
const MIN_FIELDS: usize = 8;

/// `sdpMid` arrives as a string from browsers, as a number from some clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaId {
    Text(String),
    Index(u64),
}

impl MediaId {
    fn into_string(self) -> String {
        match self {
            MediaId::Text(s) => s,
            MediaId::Index(i) => i.to_string(),
        }
    }
}

/// Inbound `candidate` field of an `ice_candidate` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidatePayload {
    Text(String),
    Init {
        candidate: String,
        #[serde(rename = "sdpMid", default)]
        sdp_mid: Option<MediaId>,
        #[serde(rename = "sdpMLineIndex", default)]
        sdp_mline_index: Option<u16>,
        #[serde(rename = "usernameFragment", default)]
        username_fragment: Option<String>,
    },
    Structured {
        foundation: String,
        component: u16,
        protocol: String,
        priority: u32,
        #[serde(alias = "ip")]
        address: String,
        port: u16,
        #[serde(rename = "type")]
        typ: String,
        #[serde(rename = "sdpMid", default)]
        sdp_mid: Option<MediaId>,
        #[serde(rename = "sdpMLineIndex", default)]
        sdp_mline_index: Option<u16>,
    },
}

/// Normalized remote candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCandidate {
    pub foundation: String,
    pub component: u16,
    pub protocol: String,
    pub priority: u32,
    pub address: String,
    pub port: u16,
    pub typ: String,
    /// Trailing `key value` pairs after the type (`raddr`, `rport`, `generation`, ...)
    pub extensions: Vec<String>,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
    pub username_fragment: Option<String>,
}

impl RemoteCandidate {
    /// Parse a single candidate line, with or without the `candidate:` prefix
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let line = line.strip_prefix("a=").unwrap_or(line);
        let line = line.strip_prefix("candidate:").unwrap_or(line);

        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < MIN_FIELDS {
            return Err(AppError::CandidateParse(format!(
                "expected at least {} fields, got {}: {:?}",
                MIN_FIELDS,
                fields.len(),
                line
            )));
        }
        if fields[6] != "typ" {
            return Err(AppError::CandidateParse(format!(
                "expected 'typ' at field 6, got {:?}",
                fields[6]
            )));
        }

        Ok(Self {
            foundation: fields[0].to_string(),
            component: parse_field(fields[1], "component")?,
            protocol: fields[2].to_ascii_lowercase(),
            priority: parse_field(fields[3], "priority")?,
            address: fields[4].to_string(),
            port: parse_field(fields[5], "port")?,
            typ: fields[7].to_string(),
            extensions: fields[MIN_FIELDS..].iter().map(|s| s.to_string()).collect(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        })
    }

    /// Normalize any inbound shape; `Ok(None)` marks end-of-candidates
    pub fn from_payload(payload: Option<CandidatePayload>) -> Result<Option<Self>> {
        let Some(payload) = payload else {
            return Ok(None);
        };

        match payload {
            CandidatePayload::Text(line) => {
                if line.trim().is_empty() {
                    return Ok(None);
                }
                Self::parse(&line).map(Some)
            }
            CandidatePayload::Init {
                candidate,
                sdp_mid,
                sdp_mline_index,
                username_fragment,
            } => {
                if candidate.trim().is_empty() {
                    return Ok(None);
                }
                let mut parsed = Self::parse(&candidate)?;
                parsed.sdp_mid = sdp_mid.map(MediaId::into_string);
                parsed.sdp_mline_index = sdp_mline_index;
                parsed.username_fragment = username_fragment.filter(|u| !u.is_empty());
                Ok(Some(parsed))
            }
            CandidatePayload::Structured {
                foundation,
                component,
                protocol,
                priority,
                address,
                port,
                typ,
                sdp_mid,
                sdp_mline_index,
            } => {
                if address.is_empty() || typ.is_empty() {
                    return Err(AppError::CandidateParse(
                        "structured candidate needs an address and a type".to_string(),
                    ));
                }
                Ok(Some(Self {
                    foundation,
                    component,
                    protocol: protocol.to_ascii_lowercase(),
                    priority,
                    address,
                    port,
                    typ,
                    extensions: vec![],
                    sdp_mid: sdp_mid.map(MediaId::into_string),
                    sdp_mline_index,
                    username_fragment: None,
                }))
            }
        }
    }

    /// Render back to an SDP `candidate:` attribute value
    pub fn to_sdp(&self) -> String {
        let mut line = format!(
            "candidate:{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.protocol,
            self.priority,
            self.address,
            self.port,
            self.typ
        );
        for ext in &self.extensions {
            line.push(' ');
            line.push_str(ext);
        }
        line
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, name: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| AppError::CandidateParse(format!("invalid {}: {:?}", name, value)))
}

/// Locally gathered candidate as sent to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCandidate {
    pub component: u16,
    pub foundation: String,
    pub ip: String,
    pub port: u16,
    pub priority: u32,
    pub protocol: String,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    /// Full SDP line, so browsers can pass the object to `addIceCandidate` as-is
    pub candidate: String,
}

impl LocalCandidate {
    pub fn from_sdp(line: &str, sdp_mid: Option<String>, sdp_mline_index: Option<u16>) -> Result<Self> {
        let parsed = RemoteCandidate::parse(line)?;
        Ok(Self {
            candidate: parsed.to_sdp(),
            component: parsed.component,
            foundation: parsed.foundation,
            ip: parsed.address,
            port: parsed.port,
            priority: parsed.priority,
            protocol: parsed.protocol,
            typ: parsed.typ,
            sdp_mid,
            sdp_mline_index,
        })
    }
}
