//! Step runners shared by every protocol.
//!
//! A protocol is written once as a [`Handshake`] state machine that only
//! encodes and decodes bytes in its [`Frame`]. The runners here do the I/O:
//! [`drive_blocking`] over `std::io` streams and [`drive_async`] over tokio
//! streams. Both suspend only between reads and writes, never mid-decode.

use std::fmt;
use std::io::{self, Read, Write};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::ProxyError;
use crate::io::Frame;
use crate::telemetry;

/// Where a handshake is parked waiting for I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend<P> {
    /// Send `frame().pending()`.
    AwaitingWrite(P),
    /// Fill `frame_mut().pending_mut()`.
    AwaitingRead(P),
    Done,
}

/// A protocol handshake as an explicit state machine.
pub trait Handshake: Send {
    type Phase: Copy + fmt::Debug + Send;

    /// Protocol name used in logs.
    fn protocol(&self) -> &'static str;

    /// Decode whatever phase just completed, prepare the next one and report
    /// where the handshake is parked. Calling it while the current phase is
    /// still incomplete returns the same suspend point again.
    fn resume(&mut self) -> Result<Suspend<Self::Phase>, ProxyError>;

    fn frame(&self) -> &Frame;

    fn frame_mut(&mut self) -> &mut Frame;

    /// Error to report when the peer closes the stream during a read.
    fn eof(&self) -> ProxyError {
        ProxyError::UnexpectedEof
    }
}

fn write_zero() -> ProxyError {
    io::Error::new(io::ErrorKind::WriteZero, "proxy stream accepted zero bytes").into()
}

/// Run `hs` to completion over a blocking stream.
///
/// Cancellation is checked before every read and write; a blocked read is
/// only interrupted by the stream itself (e.g. a socket timeout).
pub fn drive_blocking<H, S>(
    hs: &mut H,
    stream: &mut S,
    cancel: &CancellationToken,
) -> Result<(), ProxyError>
where
    H: Handshake,
    S: Read + Write + ?Sized,
{
    loop {
        if cancel.is_cancelled() {
            return Err(ProxyError::Cancelled);
        }
        match hs.resume()? {
            Suspend::AwaitingWrite(phase) => {
                let n = match stream.write(hs.frame().pending()) {
                    Ok(0) => return Err(write_zero()),
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                trace!(protocol = hs.protocol(), ?phase, bytes = n, "wrote handshake bytes");
                telemetry::record_written(n);
                hs.frame_mut().advance(n);
                if hs.frame().is_complete() {
                    stream.flush()?;
                }
            }
            Suspend::AwaitingRead(phase) => {
                let n = match stream.read(hs.frame_mut().pending_mut()) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                if n == 0 {
                    return Err(hs.eof());
                }
                trace!(protocol = hs.protocol(), ?phase, bytes = n, "read handshake bytes");
                telemetry::record_read(n);
                hs.frame_mut().advance(n);
            }
            Suspend::Done => return Ok(()),
        }
    }
}

/// Run `hs` to completion over an async stream.
///
/// Every pending read and write is raced against `cancel`, so a silent peer
/// cannot hold a cancelled negotiation open.
pub async fn drive_async<H, S>(
    hs: &mut H,
    stream: &mut S,
    cancel: &CancellationToken,
) -> Result<(), ProxyError>
where
    H: Handshake,
    S: AsyncRead + AsyncWrite + Unpin + Send + ?Sized,
{
    loop {
        if cancel.is_cancelled() {
            return Err(ProxyError::Cancelled);
        }
        match hs.resume()? {
            Suspend::AwaitingWrite(phase) => {
                let n = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                    res = stream.write(hs.frame().pending()) => res?,
                };
                if n == 0 {
                    return Err(write_zero());
                }
                trace!(protocol = hs.protocol(), ?phase, bytes = n, "wrote handshake bytes");
                telemetry::record_written(n);
                hs.frame_mut().advance(n);
                if hs.frame().is_complete() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                        res = stream.flush() => res?,
                    }
                }
            }
            Suspend::AwaitingRead(phase) => {
                let n = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                    res = stream.read(hs.frame_mut().pending_mut()) => res?,
                };
                if n == 0 {
                    return Err(hs.eof());
                }
                trace!(protocol = hs.protocol(), ?phase, bytes = n, "read handshake bytes");
                telemetry::record_read(n);
                hs.frame_mut().advance(n);
            }
            Suspend::Done => return Ok(()),
        }
    }
}

/// [`drive_blocking`] with start/outcome logging and counters.
pub(crate) fn run_blocking<H, S>(
    hs: &mut H,
    stream: &mut S,
    cancel: &CancellationToken,
) -> Result<(), ProxyError>
where
    H: Handshake,
    S: Read + Write + ?Sized,
{
    let _guard = telemetry::NegotiationGuard::new(hs.protocol());
    let result = drive_blocking(hs, stream, cancel);
    report(hs.protocol(), &result);
    result
}

/// [`drive_async`] with start/outcome logging and counters.
pub(crate) async fn run_async<H, S>(
    hs: &mut H,
    stream: &mut S,
    cancel: &CancellationToken,
) -> Result<(), ProxyError>
where
    H: Handshake,
    S: AsyncRead + AsyncWrite + Unpin + Send + ?Sized,
{
    let _guard = telemetry::NegotiationGuard::new(hs.protocol());
    let result = drive_async(hs, stream, cancel).await;
    report(hs.protocol(), &result);
    result
}

fn report(protocol: &'static str, result: &Result<(), ProxyError>) {
    match result {
        Ok(()) => {
            debug!(protocol, "proxy negotiation succeeded");
            telemetry::record_success();
        }
        Err(ProxyError::Cancelled) => {
            debug!(protocol, "proxy negotiation cancelled");
            telemetry::record_cancelled();
        }
        Err(err) => {
            tracing::warn!(protocol, error = %err, "proxy negotiation failed");
            telemetry::record_failure();
        }
    }
}
