//! HTTP `CONNECT` client, plain ("http") and over TLS to the proxy ("https").

pub mod codec;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::address::ProxyAddress;
use crate::error::ProxyError;
use crate::handshake::{run_async, run_blocking, Handshake, Suspend};
use crate::io::{BoxedBlockingStream, BoxedStream, Frame};
use crate::negotiator::Negotiator;
use crate::tls::TlsWrap;

pub use codec::{HttpConnectReply, DEFAULT_USER_AGENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpPhase {
    WriteRequest,
    /// One byte at a time until the blank line, so nothing past the
    /// header block is consumed.
    ReadReply,
    Done,
}

pub struct HttpHandshake {
    protocol: &'static str,
    frame: Frame,
    phase: HttpPhase,
    sent_credentials: bool,
    reply: Option<HttpConnectReply>,
}

impl HttpHandshake {
    pub fn new(address: &ProxyAddress, user_agent: &str) -> Result<Self, ProxyError> {
        let request = codec::encode_connect(address, user_agent)?;
        let mut frame = Frame::new();
        frame.load(&request);
        Ok(Self {
            protocol: "http",
            frame,
            phase: HttpPhase::WriteRequest,
            sent_credentials: address.credentials().is_some(),
            reply: None,
        })
    }

    /// Name reported in logs and telemetry, "https" when run over TLS.
    pub fn with_protocol(mut self, protocol: &'static str) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn reply(&self) -> Option<&HttpConnectReply> {
        self.reply.as_ref()
    }
}

impl Handshake for HttpHandshake {
    type Phase = HttpPhase;

    fn protocol(&self) -> &'static str {
        self.protocol
    }

    fn resume(&mut self) -> Result<Suspend<HttpPhase>, ProxyError> {
        if self.frame.is_complete() {
            self.phase = match self.phase {
                HttpPhase::WriteRequest => {
                    self.frame.expect(1);
                    HttpPhase::ReadReply
                }
                HttpPhase::ReadReply => {
                    let data = self.frame.filled();
                    if codec::has_end_marker(data) {
                        let reply = codec::decode_reply(data, self.sent_credentials)?;
                        tracing::debug!(status = reply.status, "HTTP proxy accepted CONNECT");
                        self.reply = Some(reply);
                        HttpPhase::Done
                    } else if data.len() >= codec::MAX_REPLY_LEN {
                        return Err(ProxyError::failed("HTTP proxy response too big"));
                    } else {
                        self.frame.expect_more(1);
                        HttpPhase::ReadReply
                    }
                }
                HttpPhase::Done => HttpPhase::Done,
            };
        }
        Ok(match self.phase {
            HttpPhase::WriteRequest => Suspend::AwaitingWrite(self.phase),
            HttpPhase::ReadReply => Suspend::AwaitingRead(self.phase),
            HttpPhase::Done => Suspend::Done,
        })
    }

    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    fn eof(&self) -> ProxyError {
        if self.phase == HttpPhase::ReadReply && self.frame.offset() == 0 {
            ProxyError::failed("HTTP proxy server closed connection unexpectedly")
        } else {
            ProxyError::UnexpectedEof
        }
    }
}

/// Registry entry for "http" and, with a TLS collaborator, "https".
#[derive(Clone)]
pub struct HttpNegotiator {
    tls: Option<Arc<dyn TlsWrap>>,
    user_agent: String,
}

impl HttpNegotiator {
    pub fn http() -> Self {
        Self {
            tls: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Wrap the proxy link in TLS before sending `CONNECT`.
    pub fn https(tls: Arc<dyn TlsWrap>) -> Self {
        Self {
            tls: Some(tls),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn handshake(&self, address: &ProxyAddress) -> Result<HttpHandshake, ProxyError> {
        Ok(HttpHandshake::new(address, &self.user_agent)?.with_protocol(self.protocol()))
    }
}

#[async_trait]
impl Negotiator for HttpNegotiator {
    fn protocol(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }

    fn supports_hostname(&self) -> bool {
        true
    }

    fn connect(
        &self,
        stream: BoxedBlockingStream,
        address: &ProxyAddress,
        cancel: &CancellationToken,
    ) -> Result<BoxedBlockingStream, ProxyError> {
        let mut hs = self.handshake(address)?;
        let mut stream = match &self.tls {
            Some(tls) => {
                if cancel.is_cancelled() {
                    return Err(ProxyError::Cancelled);
                }
                tls.wrap_client_blocking(stream, address.tls_server_name())?
            }
            None => stream,
        };
        run_blocking(&mut hs, &mut stream, cancel)?;
        Ok(stream)
    }

    async fn connect_async(
        &self,
        stream: BoxedStream,
        address: &ProxyAddress,
        cancel: &CancellationToken,
    ) -> Result<BoxedStream, ProxyError> {
        let mut hs = self.handshake(address)?;
        let mut stream = match &self.tls {
            Some(tls) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                res = tls.wrap_client(stream, address.tls_server_name()) => res?,
            },
            None => stream,
        };
        run_async(&mut hs, &mut stream, cancel).await?;
        Ok(stream)
    }
}
