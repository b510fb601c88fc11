use std::net::Ipv4Addr;

use crate::address::{Destination, MAX_FIELD_LEN};
use crate::error::ProxyError;

pub const SOCKS4_VERSION: u8 = 0x04;
pub const CMD_CONNECT: u8 = 0x01;

pub const REPLY_VERSION: u8 = 0x00;
pub const REPLY_GRANTED: u8 = 90;
pub const REPLY_LEN: usize = 8;

/// DSTIP telling a SOCKS4a server that a hostname follows the user id.
const SOCKS4A_MARKER: [u8; 4] = [0, 0, 0, 1];

/// Encode a CONNECT request.
///
/// IPv4 literals go into DSTIP. Hostnames are only allowed when
/// `supports_hostname` is set, in which case the SOCKS4a layout is used.
/// The user id and hostname are NUL-terminated on the wire, so neither may
/// contain a NUL byte, and the hostname must be ASCII.
pub fn encode_connect(
    destination: Destination<'_>,
    port: u16,
    user_id: &str,
    supports_hostname: bool,
) -> Result<Vec<u8>, ProxyError> {
    let protocol = if supports_hostname { "SOCKSv4a" } else { "SOCKSv4" };
    if user_id.len() > MAX_FIELD_LEN {
        return Err(ProxyError::failed(format!(
            "username is too long for {protocol} protocol"
        )));
    }
    if user_id.contains('\0') {
        return Err(ProxyError::failed(format!(
            "username contains a NUL byte, which {protocol} cannot carry"
        )));
    }

    let (dst_ip, hostname) = match destination {
        Destination::Ipv4(v4) => (v4.octets(), None),
        Destination::Domain(name) if supports_hostname => {
            if name.len() > MAX_FIELD_LEN {
                return Err(ProxyError::failed(format!(
                    "hostname {name:?} is too long for {protocol} protocol"
                )));
            }
            if !name.is_ascii() || name.contains('\0') {
                return Err(ProxyError::failed(format!(
                    "hostname {name:?} is not a valid {protocol} hostname"
                )));
            }
            (SOCKS4A_MARKER, Some(name))
        }
        other => {
            return Err(ProxyError::AddressFamilyNotSupported {
                protocol,
                kind: other.kind(),
            })
        }
    };

    let mut buf = Vec::with_capacity(
        8 + user_id.len() + 1 + hostname.map_or(0, |h| h.len() + 1),
    );
    buf.push(SOCKS4_VERSION);
    buf.push(CMD_CONNECT);
    buf.extend_from_slice(&port.to_be_bytes());
    buf.extend_from_slice(&dst_ip);
    buf.extend_from_slice(user_id.as_bytes());
    buf.push(0);
    if let Some(name) = hostname {
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
    }
    Ok(buf)
}

/// A granted SOCKS4 reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Socks4Reply {
    pub port: u16,
    pub address: Ipv4Addr,
}

/// Decode the fixed 8-byte reply. Every status other than "granted" is a
/// rejection; the protocol carries no finer distinction.
pub fn decode_reply(data: &[u8]) -> Result<Socks4Reply, ProxyError> {
    if data.len() < REPLY_LEN {
        return Err(ProxyError::failed("truncated SOCKSv4 reply"));
    }
    if data[0] != REPLY_VERSION {
        return Err(ProxyError::NotAProxyServer("SOCKSv4"));
    }
    if data[1] != REPLY_GRANTED {
        tracing::warn!(status = data[1], "SOCKSv4 server rejected the connection");
        return Err(ProxyError::NotAllowed);
    }
    Ok(Socks4Reply {
        port: u16::from_be_bytes([data[2], data[3]]),
        address: Ipv4Addr::new(data[4], data[5], data[6], data[7]),
    })
}
