#![no_main]
use std::io::{self, Read, Write};

use libfuzzer_sys::fuzz_target;
use proxyshake::handshake::drive_blocking;
use proxyshake::http::HttpHandshake;
use proxyshake::socks4::Socks4Handshake;
use proxyshake::socks5::Socks5Handshake;
use proxyshake::ProxyAddress;
use tokio_util::sync::CancellationToken;

/// Serves the fuzz input as the proxy's replies and swallows writes.
struct Replay<'a> {
    data: &'a [u8],
}

impl Read for Replay<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.data.read(buf)
    }
}

impl Write for Replay<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// Whole handshakes against arbitrary replies: every outcome must be an Ok or
// a typed error, never a panic or a hang.
fuzz_target!(|data: &[u8]| {
    let cancel = CancellationToken::new();
    let domain = ProxyAddress::new("socks5", "example.com", 443).with_credentials("u", "p");
    let ipv4 = ProxyAddress::new("socks4", "192.0.2.1", 80);

    if let Ok(mut hs) = Socks5Handshake::new(&domain) {
        let _ = drive_blocking(&mut hs, &mut Replay { data }, &cancel);
    }
    if let Ok(mut hs) = Socks4Handshake::new(&ipv4, true) {
        let _ = drive_blocking(&mut hs, &mut Replay { data }, &cancel);
    }
    if let Ok(mut hs) = HttpHandshake::new(&domain, "fuzz") {
        let _ = drive_blocking(&mut hs, &mut Replay { data }, &cancel);
    }
});
