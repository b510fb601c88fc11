use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::address::ProxyAddress;
use crate::error::ProxyError;
use crate::io::{BoxedBlockingStream, BoxedStream};

/// A proxy protocol's client side.
///
/// Both entry points take ownership of a stream already connected to the proxy
/// server and return the stream to use for tunnelled traffic. That is the same
/// stream unless the protocol wraps it (HTTPS proxies return the TLS stream).
/// On error the stream is dropped; whatever was already written stays written.
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// Registry name, e.g. `"socks5"`.
    fn protocol(&self) -> &'static str;

    /// Whether hostnames can be passed to the proxy for remote resolution.
    /// When false the caller must resolve to an IPv4 literal first.
    fn supports_hostname(&self) -> bool;

    fn connect(
        &self,
        stream: BoxedBlockingStream,
        address: &ProxyAddress,
        cancel: &CancellationToken,
    ) -> Result<BoxedBlockingStream, ProxyError>;

    async fn connect_async(
        &self,
        stream: BoxedStream,
        address: &ProxyAddress,
        cancel: &CancellationToken,
    ) -> Result<BoxedStream, ProxyError>;
}
