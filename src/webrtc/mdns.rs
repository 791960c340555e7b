use webrtc::ice::mdns::MulticastDnsMode;

const MDNS_MODE_ENV: &str = "GESTURE_EXAM_WEBRTC_MDNS_MODE";

fn parse_mdns_mode(raw: &str) -> Option<MulticastDnsMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "disabled" | "off" | "false" | "0" => Some(MulticastDnsMode::Disabled),
        "query" | "query_only" | "query-only" => Some(MulticastDnsMode::QueryOnly),
        "gather" | "query_and_gather" | "query-and-gather" | "on" | "true" | "1" => {
            Some(MulticastDnsMode::QueryAndGather)
        }
        _ => None,
    }
}

/// mDNS mode for ICE, from the environment
pub fn mdns_mode() -> MulticastDnsMode {
    // QueryOnly: resolve the browser's .local candidates without publishing our own
    std::env::var(MDNS_MODE_ENV)
        .ok()
        .and_then(|raw| parse_mdns_mode(&raw))
        .unwrap_or(MulticastDnsMode::QueryOnly)
}

pub fn mdns_host_name(session_id: &str) -> String {
    format!("{session_id}.local")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mdns_mode() {
        assert_eq!(parse_mdns_mode("OFF"), Some(MulticastDnsMode::Disabled));
        assert_eq!(parse_mdns_mode(" query "), Some(MulticastDnsMode::QueryOnly));
        assert_eq!(parse_mdns_mode("gather"), Some(MulticastDnsMode::QueryAndGather));
        assert_eq!(parse_mdns_mode(""), None);
        assert_eq!(parse_mdns_mode("bogus"), None);
    }

    #[test]
    fn test_host_name() {
        assert_eq!(mdns_host_name("abc"), "abc.local");
    }
}
