//! Shared test harness for the negotiation integration tests.
//!
//! Provides a `ScriptedStream` that replays canned proxy replies in fixed
//! chunks (blocking and async), and `FakeProxy`, a one-shot in-process proxy
//! on a tokio `TcpListener` that speaks the server side of each protocol and
//! then echoes tunnelled bytes.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Script {
    chunks: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    reads: usize,
    cancel_on_write: Option<CancellationToken>,
}

/// In-memory peer that hands out each scripted chunk across as many reads as
/// the caller's buffers require, never merging two chunks into one read. An
/// exhausted script reads as EOF. Clones share state, so a test can keep one
/// handle while the negotiator owns the other.
#[derive(Clone, Default)]
pub struct ScriptedStream {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedStream {
    pub fn new<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        let stream = Self::default();
        stream.lock().chunks = chunks.into_iter().map(|c| c.as_ref().to_vec()).collect();
        stream
    }

    /// Cancel `token` as soon as anything is written.
    pub fn cancel_on_write(self, token: CancellationToken) -> Self {
        self.lock().cancel_on_write = Some(token);
        self
    }

    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    /// Scripted bytes that were never read.
    pub fn unread(&self) -> Vec<u8> {
        self.lock().chunks.iter().flatten().copied().collect()
    }

    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.inner.lock().unwrap()
    }

    fn read_into(&self, buf: &mut [u8]) -> usize {
        let mut script = self.lock();
        script.reads += 1;
        let Some(chunk) = script.chunks.front_mut() else {
            return 0;
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            script.chunks.pop_front();
        }
        n
    }

    fn write_from(&self, buf: &[u8]) -> usize {
        let mut script = self.lock();
        script.written.extend_from_slice(buf);
        if let Some(token) = &script.cancel_on_write {
            token.cancel();
        }
        buf.len()
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf))
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_from(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsyncRead for ScriptedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let n = self.read_into(buf.initialize_unfilled());
        buf.advance(n);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ScriptedStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(self.write_from(buf)))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Server side a `FakeProxy` plays.
#[derive(Clone, Debug)]
pub enum FakeKind {
    /// SOCKSv4/4a: answers with the given CD byte.
    Socks4 { code: u8 },
    /// SOCKSv5 with optional required credentials and the REP byte to send.
    Socks5 {
        credentials: Option<(String, String)>,
        rep: u8,
    },
    /// HTTP CONNECT: answers with the given status line.
    Http { status_line: String },
}

/// What the fake proxy saw from the client.
#[derive(Debug, Default)]
pub struct Observed {
    /// Destination the client asked for, as "host:port".
    pub target: String,
    /// Raw bytes of the request that carried the destination.
    pub request: Vec<u8>,
}

pub struct FakeProxy {
    addr: SocketAddr,
    task: JoinHandle<io::Result<Observed>>,
}

impl FakeProxy {
    /// Bind on an ephemeral port and serve exactly one client.
    pub async fn spawn(kind: FakeKind) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await?;
            let (observed, granted) = match kind {
                FakeKind::Socks4 { code } => serve_socks4(&mut stream, code).await?,
                FakeKind::Socks5 { credentials, rep } => {
                    serve_socks5(&mut stream, credentials, rep).await?
                }
                FakeKind::Http { status_line } => serve_http(&mut stream, &status_line).await?,
            };
            if granted {
                echo(&mut stream).await?;
            }
            Ok(observed)
        });
        Ok(Self { addr, task })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn finish(self) -> Observed {
        self.task.await.unwrap().unwrap()
    }
}

async fn echo(stream: &mut TcpStream) -> io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        stream.write_all(&buf[..n]).await?;
    }
}

async fn read_nul_terminated(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == 0 {
            return Ok(out);
        }
        out.push(byte);
    }
}

async fn serve_socks4(stream: &mut TcpStream, code: u8) -> io::Result<(Observed, bool)> {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await?;
    let port = u16::from_be_bytes([header[2], header[3]]);
    let ip = [header[4], header[5], header[6], header[7]];
    let user = read_nul_terminated(stream).await?;

    let mut request = header.to_vec();
    request.extend_from_slice(&user);
    request.push(0);

    let host = if ip[..3] == [0, 0, 0] && ip[3] != 0 {
        let name = read_nul_terminated(stream).await?;
        request.extend_from_slice(&name);
        request.push(0);
        String::from_utf8_lossy(&name).into_owned()
    } else {
        std::net::Ipv4Addr::from(ip).to_string()
    };

    stream.write_all(&[0, code, 0, 0, 0, 0, 0, 0]).await?;
    stream.flush().await?;
    let observed = Observed {
        target: format!("{host}:{port}"),
        request,
    };
    Ok((observed, code == 90))
}

async fn serve_socks5(
    stream: &mut TcpStream,
    credentials: Option<(String, String)>,
    rep: u8,
) -> io::Result<(Observed, bool)> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    let mut methods = vec![0u8; header[1] as usize];
    stream.read_exact(&mut methods).await?;

    let chosen = match &credentials {
        Some(_) if methods.contains(&0x02) => 0x02,
        Some(_) => 0xFF,
        None => 0x00,
    };
    stream.write_all(&[0x05, chosen]).await?;
    if chosen == 0xFF {
        return Ok((Observed::default(), false));
    }

    if let Some((user, pass)) = &credentials {
        let mut auth_header = [0u8; 2];
        stream.read_exact(&mut auth_header).await?;
        let mut uname = vec![0u8; auth_header[1] as usize];
        stream.read_exact(&mut uname).await?;
        let plen = stream.read_u8().await?;
        let mut passwd = vec![0u8; plen as usize];
        stream.read_exact(&mut passwd).await?;
        let ok = uname == user.as_bytes() && passwd == pass.as_bytes();
        stream.write_all(&[0x01, if ok { 0x00 } else { 0x01 }]).await?;
        if !ok {
            return Ok((Observed::default(), false));
        }
    }

    let mut request = vec![0u8; 4];
    stream.read_exact(&mut request).await?;
    let host = match request[3] {
        0x01 => {
            let mut ip = [0u8; 4];
            stream.read_exact(&mut ip).await?;
            request.extend_from_slice(&ip);
            std::net::Ipv4Addr::from(ip).to_string()
        }
        0x03 => {
            let len = stream.read_u8().await?;
            let mut name = vec![0u8; len as usize];
            stream.read_exact(&mut name).await?;
            request.push(len);
            request.extend_from_slice(&name);
            String::from_utf8_lossy(&name).into_owned()
        }
        _ => {
            let mut ip = [0u8; 16];
            stream.read_exact(&mut ip).await?;
            request.extend_from_slice(&ip);
            format!("[{}]", std::net::Ipv6Addr::from(ip))
        }
    };
    let port = stream.read_u16().await?;
    request.extend_from_slice(&port.to_be_bytes());

    // Bound address 10.0.0.1:4321, sent in two segments.
    stream.write_all(&[0x05, rep, 0x00, 0x01]).await?;
    stream.flush().await?;
    stream.write_all(&[10, 0, 0, 1, 0x10, 0xE1]).await?;
    stream.flush().await?;

    let observed = Observed {
        target: format!("{host}:{port}"),
        request,
    };
    Ok((observed, rep == 0))
}

async fn serve_http(stream: &mut TcpStream, status_line: &str) -> io::Result<(Observed, bool)> {
    let mut request = Vec::new();
    while !request.ends_with(b"\r\n\r\n") {
        request.push(stream.read_u8().await?);
    }
    let text = String::from_utf8_lossy(&request).into_owned();
    let target = text
        .strip_prefix("CONNECT ")
        .and_then(|rest| rest.split(' ').next())
        .unwrap_or_default()
        .to_string();

    stream
        .write_all(format!("{status_line}\r\nVia: fake\r\n\r\n").as_bytes())
        .await?;
    stream.flush().await?;
    let granted = status_line.split(' ').nth(1) == Some("200");
    Ok((Observed { target, request }, granted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_stream_keeps_chunk_boundaries() {
        let mut stream = ScriptedStream::new([&b"abc"[..], b"de"]);
        let mut buf = [0u8; 8];
        assert_eq!(Read::read(&mut stream, &mut buf).unwrap(), 3);
        assert_eq!(Read::read(&mut stream, &mut buf[..1]).unwrap(), 1);
        assert_eq!(stream.unread(), b"e");
        assert_eq!(Read::read(&mut stream, &mut buf).unwrap(), 1);
        assert_eq!(Read::read(&mut stream, &mut buf).unwrap(), 0);
    }
}
