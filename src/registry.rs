//! Protocol-name dispatch and the top-level `negotiate` entry points.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::address::ProxyAddress;
use crate::error::ProxyError;
use crate::http::HttpNegotiator;
use crate::io::{BoxedBlockingStream, BoxedStream};
use crate::negotiator::Negotiator;
use crate::socks4::Socks4Negotiator;
use crate::socks5::Socks5Negotiator;

/// Name → negotiator table. Names are stored lowercased.
#[derive(Clone, Default)]
pub struct Registry {
    negotiators: HashMap<String, Arc<dyn Negotiator>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// socks4, socks4a, socks5, http and, with the `tls` feature, https.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("socks4", Arc::new(Socks4Negotiator::socks4()));
        registry.register("socks4a", Arc::new(Socks4Negotiator::socks4a()));
        registry.register("socks5", Arc::new(Socks5Negotiator));
        registry.register("http", Arc::new(HttpNegotiator::http()));
        #[cfg(feature = "tls")]
        registry.register(
            "https",
            Arc::new(HttpNegotiator::https(Arc::new(
                crate::tls::RustlsWrap::with_webpki_roots(),
            ))),
        );
        registry
    }

    /// Add or replace the negotiator for `name`.
    pub fn register(&mut self, name: &str, negotiator: Arc<dyn Negotiator>) {
        self.negotiators.insert(name.to_ascii_lowercase(), negotiator);
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Negotiator>> {
        self.negotiators.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.negotiators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn require(&self, name: &str) -> Result<Arc<dyn Negotiator>, ProxyError> {
        self.lookup(name)
            .ok_or_else(|| ProxyError::UnsupportedProtocol(name.to_string()))
    }

    pub fn negotiate_cancellable(
        &self,
        name: &str,
        stream: BoxedBlockingStream,
        address: &ProxyAddress,
        cancel: &CancellationToken,
    ) -> Result<BoxedBlockingStream, ProxyError> {
        let negotiator = self.require(name)?;
        debug!(protocol = negotiator.protocol(), destination = %address.authority(), "negotiating");
        negotiator.connect(stream, address, cancel)
    }

    pub async fn negotiate_async_cancellable(
        &self,
        name: &str,
        stream: BoxedStream,
        address: &ProxyAddress,
        cancel: &CancellationToken,
    ) -> Result<BoxedStream, ProxyError> {
        let negotiator = self.require(name)?;
        debug!(protocol = negotiator.protocol(), destination = %address.authority(), "negotiating");
        negotiator.connect_async(stream, address, cancel).await
    }
}

static DEFAULT_REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Process-wide registry with the built-in negotiators.
pub fn default_registry() -> &'static Registry {
    DEFAULT_REGISTRY.get_or_init(Registry::with_defaults)
}

pub fn lookup(name: &str) -> Option<Arc<dyn Negotiator>> {
    default_registry().lookup(name)
}

/// Run the handshake for `name` over `stream` and return the tunnel.
pub fn negotiate(
    name: &str,
    stream: BoxedBlockingStream,
    address: &ProxyAddress,
) -> Result<BoxedBlockingStream, ProxyError> {
    negotiate_cancellable(name, stream, address, &CancellationToken::new())
}

pub fn negotiate_cancellable(
    name: &str,
    stream: BoxedBlockingStream,
    address: &ProxyAddress,
    cancel: &CancellationToken,
) -> Result<BoxedBlockingStream, ProxyError> {
    default_registry().negotiate_cancellable(name, stream, address, cancel)
}

pub async fn negotiate_async(
    name: &str,
    stream: BoxedStream,
    address: &ProxyAddress,
) -> Result<BoxedStream, ProxyError> {
    negotiate_async_cancellable(name, stream, address, &CancellationToken::new()).await
}

pub async fn negotiate_async_cancellable(
    name: &str,
    stream: BoxedStream,
    address: &ProxyAddress,
    cancel: &CancellationToken,
) -> Result<BoxedStream, ProxyError> {
    default_registry()
        .negotiate_async_cancellable(name, stream, address, cancel)
        .await
}
