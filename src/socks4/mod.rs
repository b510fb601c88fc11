//! SOCKS4 and SOCKS4a client.
//!
//! Both variants share one implementation. SOCKS4a only adds the ability to
//! hand a hostname to the proxy, modelled as the `supports_hostname` flag.

pub mod codec;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::address::ProxyAddress;
use crate::error::ProxyError;
use crate::handshake::{run_async, run_blocking, Handshake, Suspend};
use crate::io::{BoxedBlockingStream, BoxedStream, Frame};
use crate::negotiator::Negotiator;

pub use codec::Socks4Reply;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks4Phase {
    WriteRequest,
    ReadReply,
    Done,
}

/// `WriteRequest → ReadReply(8 bytes) → Done`.
pub struct Socks4Handshake {
    frame: Frame,
    phase: Socks4Phase,
    supports_hostname: bool,
    reply: Option<Socks4Reply>,
}

impl Socks4Handshake {
    /// Encode the request up front; nothing is sent if the address cannot be
    /// expressed in this protocol.
    pub fn new(address: &ProxyAddress, supports_hostname: bool) -> Result<Self, ProxyError> {
        let user_id = address.username.as_deref().unwrap_or("");
        let request = codec::encode_connect(
            address.destination(),
            address.port,
            user_id,
            supports_hostname,
        )?;
        let mut frame = Frame::new();
        frame.load(&request);
        Ok(Self {
            frame,
            phase: Socks4Phase::WriteRequest,
            supports_hostname,
            reply: None,
        })
    }

    pub fn reply(&self) -> Option<&Socks4Reply> {
        self.reply.as_ref()
    }
}

impl Handshake for Socks4Handshake {
    type Phase = Socks4Phase;

    fn protocol(&self) -> &'static str {
        if self.supports_hostname {
            "socks4a"
        } else {
            "socks4"
        }
    }

    fn resume(&mut self) -> Result<Suspend<Socks4Phase>, ProxyError> {
        if self.frame.is_complete() {
            self.phase = match self.phase {
                Socks4Phase::WriteRequest => {
                    self.frame.expect(codec::REPLY_LEN);
                    Socks4Phase::ReadReply
                }
                Socks4Phase::ReadReply => {
                    self.reply = Some(codec::decode_reply(self.frame.filled())?);
                    Socks4Phase::Done
                }
                Socks4Phase::Done => Socks4Phase::Done,
            };
        }
        Ok(match self.phase {
            Socks4Phase::WriteRequest => Suspend::AwaitingWrite(self.phase),
            Socks4Phase::ReadReply => Suspend::AwaitingRead(self.phase),
            Socks4Phase::Done => Suspend::Done,
        })
    }

    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }
}

/// Registry entry for "socks4" and "socks4a".
#[derive(Debug, Clone, Copy)]
pub struct Socks4Negotiator {
    supports_hostname: bool,
}

impl Socks4Negotiator {
    pub const fn socks4() -> Self {
        Self {
            supports_hostname: false,
        }
    }

    pub const fn socks4a() -> Self {
        Self {
            supports_hostname: true,
        }
    }
}

#[async_trait]
impl Negotiator for Socks4Negotiator {
    fn protocol(&self) -> &'static str {
        if self.supports_hostname {
            "socks4a"
        } else {
            "socks4"
        }
    }

    fn supports_hostname(&self) -> bool {
        self.supports_hostname
    }

    fn connect(
        &self,
        mut stream: BoxedBlockingStream,
        address: &ProxyAddress,
        cancel: &CancellationToken,
    ) -> Result<BoxedBlockingStream, ProxyError> {
        let mut hs = Socks4Handshake::new(address, self.supports_hostname)?;
        run_blocking(&mut hs, &mut stream, cancel)?;
        Ok(stream)
    }

    async fn connect_async(
        &self,
        mut stream: BoxedStream,
        address: &ProxyAddress,
        cancel: &CancellationToken,
    ) -> Result<BoxedStream, ProxyError> {
        let mut hs = Socks4Handshake::new(address, self.supports_hostname)?;
        run_async(&mut hs, &mut stream, cancel).await?;
        Ok(stream)
    }
}
