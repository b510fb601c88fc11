//! SOCKS5 client (RFC 1928) with username/password authentication (RFC 1929).

pub mod codec;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::address::ProxyAddress;
use crate::error::ProxyError;
use crate::handshake::{run_async, run_blocking, Handshake, Suspend};
use crate::io::{BoxedBlockingStream, BoxedStream, Frame};
use crate::negotiator::Negotiator;

pub use codec::{AddressType, AuthMethod, Socks5ConnectReply, Socks5Status, TargetAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5Phase {
    Greeting,
    GreetingReply,
    AuthRequest,
    AuthReply,
    ConnectRequest,
    ConnectReplyHeader,
    /// Length byte of a domain-name BND.ADDR.
    ConnectReplyDomainLen,
    /// BND.ADDR and BND.PORT.
    ConnectReplyAddress,
    Done,
}

impl Socks5Phase {
    fn suspend(self) -> Suspend<Self> {
        match self {
            Socks5Phase::Greeting | Socks5Phase::AuthRequest | Socks5Phase::ConnectRequest => {
                Suspend::AwaitingWrite(self)
            }
            Socks5Phase::GreetingReply
            | Socks5Phase::AuthReply
            | Socks5Phase::ConnectReplyHeader
            | Socks5Phase::ConnectReplyDomainLen
            | Socks5Phase::ConnectReplyAddress => Suspend::AwaitingRead(self),
            Socks5Phase::Done => Suspend::Done,
        }
    }
}

/// Method negotiation, optional authentication, then CONNECT.
///
/// Every request is encoded by [`Socks5Handshake::new`], so an address or
/// credential the protocol cannot carry fails before any byte is written.
pub struct Socks5Handshake {
    frame: Frame,
    phase: Socks5Phase,
    auth_request: Option<Vec<u8>>,
    connect_request: Vec<u8>,
    method: Option<AuthMethod>,
    reply: Option<Socks5ConnectReply>,
    bound: Option<TargetAddr>,
}

impl Socks5Handshake {
    /// Credentials are encoded up front even though the server may go on to
    /// pick `NO_AUTH`, so a username or password longer than 255 bytes fails
    /// here rather than after the greeting.
    pub fn new(address: &ProxyAddress) -> Result<Self, ProxyError> {
        let auth_request = address
            .credentials()
            .map(|(user, pass)| codec::encode_auth(user, pass))
            .transpose()?;
        let connect_request = codec::encode_connect(address.destination(), address.port)?;

        let mut frame = Frame::new();
        frame.load(&codec::encode_greeting(auth_request.is_some()));
        Ok(Self {
            frame,
            phase: Socks5Phase::Greeting,
            auth_request,
            connect_request,
            method: None,
            reply: None,
            bound: None,
        })
    }

    /// Authentication method the server selected.
    pub fn method(&self) -> Option<AuthMethod> {
        self.method
    }

    pub fn reply(&self) -> Option<&Socks5ConnectReply> {
        self.reply.as_ref()
    }

    /// Address the proxy bound for the relay, once the reply has been read.
    pub fn bound_address(&self) -> Option<&TargetAddr> {
        self.bound.as_ref()
    }

    fn after_method(&mut self, method: AuthMethod) -> Result<Socks5Phase, ProxyError> {
        self.method = Some(method);
        debug!(?method, "SOCKSv5 method selected");
        match method {
            AuthMethod::NoAuth => {
                self.frame.load(&self.connect_request);
                Ok(Socks5Phase::ConnectRequest)
            }
            AuthMethod::UsernamePassword => {
                let request = self
                    .auth_request
                    .as_deref()
                    .ok_or(ProxyError::AuthenticationRequired)?;
                self.frame.load(request);
                Ok(Socks5Phase::AuthRequest)
            }
        }
    }

    fn next_phase(&mut self) -> Result<Socks5Phase, ProxyError> {
        Ok(match self.phase {
            Socks5Phase::Greeting => {
                self.frame.expect(codec::GREETING_REPLY_LEN);
                Socks5Phase::GreetingReply
            }
            Socks5Phase::GreetingReply => {
                let method =
                    codec::decode_greeting_reply(self.frame.filled(), self.auth_request.is_some())?;
                self.after_method(method)?
            }
            Socks5Phase::AuthRequest => {
                self.frame.expect(codec::AUTH_REPLY_LEN);
                Socks5Phase::AuthReply
            }
            Socks5Phase::AuthReply => {
                codec::decode_auth_reply(self.frame.filled())?;
                self.frame.load(&self.connect_request);
                Socks5Phase::ConnectRequest
            }
            Socks5Phase::ConnectRequest => {
                self.frame.expect(codec::CONNECT_REPLY_HEADER_LEN);
                Socks5Phase::ConnectReplyHeader
            }
            Socks5Phase::ConnectReplyHeader => {
                let reply = codec::decode_connect_header(self.frame.filled())?;
                self.reply = Some(reply);
                match reply.address_type.fixed_tail_len() {
                    Some(len) => {
                        self.frame.expect(len);
                        Socks5Phase::ConnectReplyAddress
                    }
                    None => {
                        self.frame.expect(1);
                        Socks5Phase::ConnectReplyDomainLen
                    }
                }
            }
            Socks5Phase::ConnectReplyDomainLen => {
                let len = self.frame.filled()[0] as usize;
                self.frame.expect_more(len + 2);
                Socks5Phase::ConnectReplyAddress
            }
            Socks5Phase::ConnectReplyAddress => {
                let address_type = self
                    .reply
                    .map(|r| r.address_type)
                    .ok_or_else(|| ProxyError::failed("SOCKSv5 reply address without header"))?;
                let bound = codec::decode_bound_address(address_type, self.frame.filled())?;
                debug!(?bound, "SOCKSv5 tunnel established");
                self.bound = Some(bound);
                Socks5Phase::Done
            }
            Socks5Phase::Done => Socks5Phase::Done,
        })
    }
}

impl Handshake for Socks5Handshake {
    type Phase = Socks5Phase;

    fn protocol(&self) -> &'static str {
        "socks5"
    }

    fn resume(&mut self) -> Result<Suspend<Socks5Phase>, ProxyError> {
        if self.frame.is_complete() {
            self.phase = self.next_phase()?;
        }
        Ok(self.phase.suspend())
    }

    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }
}

/// Registry entry for "socks5".
#[derive(Debug, Clone, Copy, Default)]
pub struct Socks5Negotiator;

#[async_trait]
impl Negotiator for Socks5Negotiator {
    fn protocol(&self) -> &'static str {
        "socks5"
    }

    fn supports_hostname(&self) -> bool {
        true
    }

    fn connect(
        &self,
        mut stream: BoxedBlockingStream,
        address: &ProxyAddress,
        cancel: &CancellationToken,
    ) -> Result<BoxedBlockingStream, ProxyError> {
        let mut hs = Socks5Handshake::new(address)?;
        run_blocking(&mut hs, &mut stream, cancel)?;
        Ok(stream)
    }

    async fn connect_async(
        &self,
        mut stream: BoxedStream,
        address: &ProxyAddress,
        cancel: &CancellationToken,
    ) -> Result<BoxedStream, ProxyError> {
        let mut hs = Socks5Handshake::new(address)?;
        run_async(&mut hs, &mut stream, cancel).await?;
        Ok(stream)
    }
}
