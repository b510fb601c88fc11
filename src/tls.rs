//! TLS collaborator for HTTPS proxies.
//!
//! The negotiators only decide when to wrap; the handshake itself belongs to
//! an implementation of [`TlsWrap`]. With the `tls` feature, [`RustlsWrap`]
//! provides one backed by rustls.

use async_trait::async_trait;

use crate::error::ProxyError;
use crate::io::{BoxedBlockingStream, BoxedStream};

#[async_trait]
pub trait TlsWrap: Send + Sync {
    /// Complete a client TLS handshake on `stream`, verifying `server_name`.
    async fn wrap_client(
        &self,
        stream: BoxedStream,
        server_name: &str,
    ) -> Result<BoxedStream, ProxyError>;

    fn wrap_client_blocking(
        &self,
        stream: BoxedBlockingStream,
        server_name: &str,
    ) -> Result<BoxedBlockingStream, ProxyError>;
}

#[cfg(feature = "tls")]
pub use self::rustls_wrap::RustlsWrap;

#[cfg(feature = "tls")]
mod rustls_wrap {
    use std::sync::Arc;

    use async_trait::async_trait;
    use rustls::{ClientConfig, ClientConnection, OwnedTrustAnchor, RootCertStore, ServerName, StreamOwned};
    use tokio_rustls::TlsConnector;

    use super::TlsWrap;
    use crate::error::ProxyError;
    use crate::io::{BoxedBlockingStream, BoxedStream};

    /// [`TlsWrap`] over a shared rustls client configuration.
    #[derive(Clone)]
    pub struct RustlsWrap {
        config: Arc<ClientConfig>,
    }

    impl RustlsWrap {
        pub fn new(config: Arc<ClientConfig>) -> Self {
            Self { config }
        }

        /// Verify proxies against the Mozilla root set.
        pub fn with_webpki_roots() -> Self {
            let mut roots = RootCertStore::empty();
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
            let config = ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(roots)
                .with_no_client_auth();
            Self::new(Arc::new(config))
        }

        fn server_name(name: &str) -> Result<ServerName, ProxyError> {
            let bare = name
                .strip_prefix('[')
                .and_then(|n| n.strip_suffix(']'))
                .unwrap_or(name);
            ServerName::try_from(bare)
                .map_err(|e| ProxyError::Tls(format!("invalid server name {name:?}: {e}")))
        }
    }

    #[async_trait]
    impl TlsWrap for RustlsWrap {
        async fn wrap_client(
            &self,
            stream: BoxedStream,
            server_name: &str,
        ) -> Result<BoxedStream, ProxyError> {
            let name = Self::server_name(server_name)?;
            let connector = TlsConnector::from(self.config.clone());
            let tls = connector
                .connect(name, stream)
                .await
                .map_err(|e| ProxyError::Tls(e.to_string()))?;
            tracing::debug!(server_name, "TLS session with proxy established");
            Ok(Box::new(tls))
        }

        fn wrap_client_blocking(
            &self,
            mut stream: BoxedBlockingStream,
            server_name: &str,
        ) -> Result<BoxedBlockingStream, ProxyError> {
            let name = Self::server_name(server_name)?;
            let mut conn = ClientConnection::new(self.config.clone(), name)
                .map_err(|e| ProxyError::Tls(e.to_string()))?;
            // Finish the handshake now so no CONNECT byte precedes it.
            while conn.is_handshaking() {
                conn.complete_io(&mut stream)
                    .map_err(|e| ProxyError::Tls(e.to_string()))?;
            }
            tracing::debug!(server_name, "TLS session with proxy established");
            Ok(Box::new(StreamOwned::new(conn, stream)))
        }
    }

}
