use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::address::{ProxyAddress, MAX_FIELD_LEN};
use crate::error::ProxyError;

/// Upper bound on the reply header block.
pub const MAX_REPLY_LEN: usize = 8 * 1024;

pub const END_MARKER: &[u8] = b"\r\n\r\n";

pub const DEFAULT_USER_AGENT: &str = concat!("proxyshake/", env!("CARGO_PKG_VERSION"));

fn reject_line_breaks(field: &str, value: &str) -> Result<(), ProxyError> {
    if value.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(ProxyError::failed(format!(
            "{field} contains a line break"
        )));
    }
    Ok(())
}

/// Build the `CONNECT` request, credentials included when present.
pub fn encode_connect(address: &ProxyAddress, user_agent: &str) -> Result<Vec<u8>, ProxyError> {
    if address.hostname.len() > MAX_FIELD_LEN {
        return Err(ProxyError::failed(format!(
            "hostname {:?} is too long",
            address.hostname
        )));
    }
    reject_line_breaks("hostname", &address.hostname)?;
    reject_line_breaks("user agent", user_agent)?;

    let authority = address.authority();
    let mut request = format!(
        "CONNECT {authority} HTTP/1.0\r\n\
         Host: {authority}\r\n\
         Proxy-Connection: keep-alive\r\n\
         User-Agent: {user_agent}\r\n"
    );
    if let Some((user, pass)) = address.credentials() {
        let token = STANDARD.encode(format!("{user}:{pass}"));
        request.push_str("Proxy-Authorization: Basic ");
        request.push_str(&token);
        request.push_str("\r\n");
    }
    request.push_str("\r\n");
    Ok(request.into_bytes())
}

pub fn has_end_marker(data: &[u8]) -> bool {
    data.ends_with(END_MARKER)
}

/// Status line of a proxy reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConnectReply {
    pub status: u16,
    pub reason: String,
}

fn bad_reply() -> ProxyError {
    ProxyError::failed("bad HTTP proxy reply")
}

/// Parse the status line of a complete header block and map the code.
pub fn decode_reply(data: &[u8], sent_credentials: bool) -> Result<HttpConnectReply, ProxyError> {
    let line_end = data
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(data.len());
    let line = std::str::from_utf8(&data[..line_end]).map_err(|_| bad_reply())?;
    if !line.starts_with("HTTP/1.") {
        return Err(bad_reply());
    }

    let mut parts = line.splitn(3, ' ');
    let _version = parts.next();
    let code = parts.next().ok_or_else(bad_reply)?;
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad_reply());
    }
    let status: u16 = code.parse().map_err(|_| bad_reply())?;
    let reason = parts.next().unwrap_or("").trim().to_string();

    match status {
        200..=299 => Ok(HttpConnectReply { status, reason }),
        403 => Err(ProxyError::NotAllowed),
        407 if sent_credentials => Err(ProxyError::AuthenticationFailed),
        407 => Err(ProxyError::AuthenticationRequired),
        _ => Err(ProxyError::failed(format!(
            "HTTP proxy connection failed: {status} {reason}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_text(address: &ProxyAddress) -> String {
        String::from_utf8(encode_connect(address, "test-agent").unwrap()).unwrap()
    }

    #[test]
    fn request_without_credentials() {
        let text = request_text(&ProxyAddress::new("http", "example.com", 443));
        assert!(text.starts_with("CONNECT example.com:443 HTTP/1.0\r\n"));
        assert!(text.contains("\r\nHost: example.com:443\r\n"));
        assert!(text.contains("\r\nProxy-Connection: keep-alive\r\n"));
        assert!(text.contains("\r\nUser-Agent: test-agent\r\n"));
        assert!(!text.contains("Proxy-Authorization"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn request_with_basic_credentials() {
        let addr = ProxyAddress::new("http", "example.com", 443).with_credentials("u", "p");
        let text = request_text(&addr);
        assert!(text.contains("\r\nProxy-Authorization: Basic dTpw\r\n"));
    }

    #[test]
    fn request_brackets_ipv6() {
        let text = request_text(&ProxyAddress::new("http", "2001:db8::2", 8443));
        assert!(text.starts_with("CONNECT [2001:db8::2]:8443 HTTP/1.0\r\n"));
    }

    #[test]
    fn request_rejects_header_injection() {
        let addr = ProxyAddress::new("http", "evil\r\nX-Injected: 1", 80);
        assert!(matches!(
            encode_connect(&addr, DEFAULT_USER_AGENT),
            Err(ProxyError::ProtocolFailed(_))
        ));
    }

    #[test]
    fn status_codes() {
        let ok = decode_reply(b"HTTP/1.1 200 Connection established\r\n\r\n", false).unwrap();
        assert_eq!(ok.status, 200);
        assert_eq!(ok.reason, "Connection established");
        assert!(decode_reply(b"HTTP/1.0 204\r\n\r\n", false).is_ok());

        assert!(matches!(
            decode_reply(b"HTTP/1.1 403 Forbidden\r\n\r\n", false),
            Err(ProxyError::NotAllowed)
        ));
        assert!(matches!(
            decode_reply(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n", false),
            Err(ProxyError::AuthenticationRequired)
        ));
        assert!(matches!(
            decode_reply(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n", true),
            Err(ProxyError::AuthenticationFailed)
        ));
        match decode_reply(b"HTTP/1.1 502 Bad Gateway\r\n\r\n", false) {
            Err(ProxyError::ProtocolFailed(msg)) => assert!(msg.contains("502")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn malformed_status_lines() {
        for reply in [
            &b"SSH-2.0-OpenSSH\r\n\r\n"[..],
            b"HTTP/2 200\r\n\r\n",
            b"HTTP/1.1 20x OK\r\n\r\n",
            b"HTTP/1.1\r\n\r\n",
        ] {
            assert!(matches!(
                decode_reply(reply, false),
                Err(ProxyError::ProtocolFailed(_))
            ));
        }
    }

    #[test]
    fn end_marker_detection() {
        assert!(has_end_marker(b"HTTP/1.1 200 OK\r\n\r\n"));
        assert!(!has_end_marker(b"HTTP/1.1 200 OK\r\n"));
    }
}
