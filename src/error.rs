use std::io;

use thiserror::Error;

/// Failure of a proxy negotiation.
///
/// The same taxonomy is shared by every protocol codec and negotiator so that
/// callers can decide on fallbacks (another proxy, direct connection) without
/// knowing which protocol was in use.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("the server is not a {0} proxy server")]
    NotAProxyServer(&'static str),
    #[error("proxy negotiation failed: {0}")]
    ProtocolFailed(String),
    #[error("connection not allowed by proxy rules")]
    NotAllowed,
    #[error("proxy requires authentication")]
    AuthenticationRequired,
    #[error("proxy authentication failed")]
    AuthenticationFailed,
    #[error("host unreachable through proxy")]
    HostUnreachable,
    #[error("network unreachable through proxy")]
    NetworkUnreachable,
    #[error("connection refused through proxy")]
    ConnectionRefused,
    #[error("proxy does not support the CONNECT command")]
    UnsupportedCommand,
    #[error("proxy does not support the destination address type")]
    UnsupportedAddressType,
    #[error("proxy selected unsupported authentication method {0:#04x}")]
    UnsupportedAuthMethod(u8),
    #[error("{protocol} does not support {kind} destinations")]
    AddressFamilyNotSupported {
        protocol: &'static str,
        kind: &'static str,
    },
    #[error("unexpected end of stream during proxy negotiation")]
    UnexpectedEof,
    #[error("proxy negotiation cancelled")]
    Cancelled,
    #[error("unsupported proxy protocol {0:?}")]
    UnsupportedProtocol(String),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("invalid proxy uri: {0}")]
    InvalidUri(String),
}

impl ProxyError {
    pub(crate) fn failed(msg: impl Into<String>) -> Self {
        ProxyError::ProtocolFailed(msg.into())
    }

    /// Whether the proxy itself answered and refused, as opposed to a transport
    /// or framing failure.
    pub fn is_server_refusal(&self) -> bool {
        matches!(
            self,
            ProxyError::NotAllowed
                | ProxyError::AuthenticationRequired
                | ProxyError::AuthenticationFailed
                | ProxyError::HostUnreachable
                | ProxyError::NetworkUnreachable
                | ProxyError::ConnectionRefused
                | ProxyError::UnsupportedCommand
                | ProxyError::UnsupportedAddressType
        )
    }
}
