use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::address::{Destination, MAX_FIELD_LEN};
use crate::error::ProxyError;

pub const SOCKS_VER: u8 = 0x05;
pub const AUTH_VER: u8 = 0x01;

pub const METHOD_NO_AUTH: u8 = 0x00;
pub const METHOD_GSSAPI: u8 = 0x01;
pub const METHOD_USERPASS: u8 = 0x02;
pub const METHOD_NO_ACCEPT: u8 = 0xFF;

pub const CMD_CONNECT: u8 = 0x01;

pub const ATYP_IPV4: u8 = 0x01;
pub const ATYP_DOMAIN: u8 = 0x03;
pub const ATYP_IPV6: u8 = 0x04;

pub const AUTH_SUCCESS: u8 = 0x00;

pub const GREETING_REPLY_LEN: usize = 2;
pub const AUTH_REPLY_LEN: usize = 2;
pub const CONNECT_REPLY_HEADER_LEN: usize = 4;

const IPV4_ADDR_SIZE: usize = 4;
const IPV6_ADDR_SIZE: usize = 16;
const PORT_SIZE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Ipv4,
    Domain,
    Ipv6,
}

impl AddressType {
    pub fn from_byte(atyp: u8) -> Option<Self> {
        match atyp {
            ATYP_IPV4 => Some(AddressType::Ipv4),
            ATYP_DOMAIN => Some(AddressType::Domain),
            ATYP_IPV6 => Some(AddressType::Ipv6),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            AddressType::Ipv4 => ATYP_IPV4,
            AddressType::Domain => ATYP_DOMAIN,
            AddressType::Ipv6 => ATYP_IPV6,
        }
    }

    /// Bytes following the reply header, address plus port. `None` for
    /// domains, whose length is only known after reading the length byte.
    pub fn fixed_tail_len(self) -> Option<usize> {
        match self {
            AddressType::Ipv4 => Some(IPV4_ADDR_SIZE + PORT_SIZE),
            AddressType::Ipv6 => Some(IPV6_ADDR_SIZE + PORT_SIZE),
            AddressType::Domain => None,
        }
    }
}

/// Method picked by the server in its greeting reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    NoAuth,
    UsernamePassword,
}

/// REP field of the CONNECT reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5Status {
    Succeeded,
    GeneralFailure,
    NotAllowed,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    TtlExpired,
    CommandNotSupported,
    AddressTypeNotSupported,
    Unknown(u8),
}

impl Socks5Status {
    pub fn from_byte(rep: u8) -> Self {
        match rep {
            0x00 => Socks5Status::Succeeded,
            0x01 => Socks5Status::GeneralFailure,
            0x02 => Socks5Status::NotAllowed,
            0x03 => Socks5Status::NetworkUnreachable,
            0x04 => Socks5Status::HostUnreachable,
            0x05 => Socks5Status::ConnectionRefused,
            0x06 => Socks5Status::TtlExpired,
            0x07 => Socks5Status::CommandNotSupported,
            0x08 => Socks5Status::AddressTypeNotSupported,
            other => Socks5Status::Unknown(other),
        }
    }

    pub fn into_result(self) -> Result<(), ProxyError> {
        match self {
            Socks5Status::Succeeded => Ok(()),
            Socks5Status::GeneralFailure => {
                Err(ProxyError::failed("general SOCKSv5 server failure"))
            }
            Socks5Status::NotAllowed => Err(ProxyError::NotAllowed),
            Socks5Status::NetworkUnreachable => Err(ProxyError::NetworkUnreachable),
            Socks5Status::HostUnreachable | Socks5Status::TtlExpired => {
                Err(ProxyError::HostUnreachable)
            }
            Socks5Status::ConnectionRefused => Err(ProxyError::ConnectionRefused),
            Socks5Status::CommandNotSupported => Err(ProxyError::UnsupportedCommand),
            Socks5Status::AddressTypeNotSupported => Err(ProxyError::UnsupportedAddressType),
            Socks5Status::Unknown(rep) => Err(ProxyError::failed(format!(
                "unknown SOCKSv5 reply code {rep:#04x}"
            ))),
        }
    }
}

/// Parsed fixed header of a CONNECT reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Socks5ConnectReply {
    pub status: Socks5Status,
    pub address_type: AddressType,
}

/// Address the proxy reports in its CONNECT reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ip(SocketAddr),
    Domain(String, u16),
}

pub fn encode_greeting(offer_userpass: bool) -> Vec<u8> {
    if offer_userpass {
        vec![SOCKS_VER, 2, METHOD_NO_AUTH, METHOD_USERPASS]
    } else {
        vec![SOCKS_VER, 1, METHOD_NO_AUTH]
    }
}

pub fn decode_greeting_reply(data: &[u8], offered_userpass: bool) -> Result<AuthMethod, ProxyError> {
    if data.len() < GREETING_REPLY_LEN {
        return Err(ProxyError::failed("truncated SOCKSv5 method reply"));
    }
    if data[0] != SOCKS_VER {
        return Err(ProxyError::NotAProxyServer("SOCKSv5"));
    }
    match data[1] {
        METHOD_NO_AUTH => Ok(AuthMethod::NoAuth),
        METHOD_USERPASS if offered_userpass => Ok(AuthMethod::UsernamePassword),
        METHOD_USERPASS => Err(ProxyError::AuthenticationRequired),
        other => Err(ProxyError::UnsupportedAuthMethod(other)),
    }
}

/// RFC 1929 username/password request.
pub fn encode_auth(username: &str, password: &str) -> Result<Vec<u8>, ProxyError> {
    if username.len() > MAX_FIELD_LEN || password.len() > MAX_FIELD_LEN {
        return Err(ProxyError::failed(
            "username or password is too long for SOCKSv5 protocol",
        ));
    }
    let mut buf = Vec::with_capacity(3 + username.len() + password.len());
    buf.push(AUTH_VER);
    buf.push(username.len() as u8);
    buf.extend_from_slice(username.as_bytes());
    buf.push(password.len() as u8);
    buf.extend_from_slice(password.as_bytes());
    Ok(buf)
}

pub fn decode_auth_reply(data: &[u8]) -> Result<(), ProxyError> {
    if data.len() < AUTH_REPLY_LEN {
        return Err(ProxyError::failed("truncated SOCKSv5 authentication reply"));
    }
    if data[0] != AUTH_VER {
        return Err(ProxyError::NotAProxyServer("SOCKSv5"));
    }
    if data[1] != AUTH_SUCCESS {
        return Err(ProxyError::AuthenticationFailed);
    }
    Ok(())
}

pub fn encode_connect(destination: Destination<'_>, port: u16) -> Result<Vec<u8>, ProxyError> {
    let mut buf = vec![SOCKS_VER, CMD_CONNECT, 0x00];
    match destination {
        Destination::Ipv4(v4) => {
            buf.push(ATYP_IPV4);
            buf.extend_from_slice(&v4.octets());
        }
        Destination::Ipv6(v6) => {
            buf.push(ATYP_IPV6);
            buf.extend_from_slice(&v6.octets());
        }
        Destination::Domain(name) => {
            if name.len() > MAX_FIELD_LEN {
                return Err(ProxyError::failed(format!(
                    "hostname {name:?} is too long for SOCKSv5 protocol"
                )));
            }
            buf.push(ATYP_DOMAIN);
            buf.push(name.len() as u8);
            buf.extend_from_slice(name.as_bytes());
        }
    }
    buf.extend_from_slice(&port.to_be_bytes());
    Ok(buf)
}

/// Decode `VER REP RSV ATYP`. A non-success REP is reported as its error.
pub fn decode_connect_header(data: &[u8]) -> Result<Socks5ConnectReply, ProxyError> {
    if data.len() < CONNECT_REPLY_HEADER_LEN {
        return Err(ProxyError::failed("truncated SOCKSv5 connect reply"));
    }
    if data[0] != SOCKS_VER {
        return Err(ProxyError::NotAProxyServer("SOCKSv5"));
    }
    let status = Socks5Status::from_byte(data[1]);
    if status != Socks5Status::Succeeded {
        tracing::warn!(?status, "SOCKSv5 server refused the connection");
    }
    status.into_result()?;
    let address_type = AddressType::from_byte(data[3])
        .ok_or_else(|| ProxyError::failed("the SOCKSv5 proxy server uses an unknown address type"))?;
    Ok(Socks5ConnectReply {
        status,
        address_type,
    })
}

/// Decode BND.ADDR and BND.PORT. For domains `data` starts at the length byte.
pub fn decode_bound_address(address_type: AddressType, data: &[u8]) -> Result<TargetAddr, ProxyError> {
    let truncated = || ProxyError::failed("truncated SOCKSv5 bound address");
    let port_at = |at: usize| -> Result<u16, ProxyError> {
        let bytes = data.get(at..at + PORT_SIZE).ok_or_else(truncated)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    };
    match address_type {
        AddressType::Ipv4 => {
            let octets: [u8; IPV4_ADDR_SIZE] = data
                .get(..IPV4_ADDR_SIZE)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(truncated)?;
            let ip = IpAddr::V4(Ipv4Addr::from(octets));
            Ok(TargetAddr::Ip(SocketAddr::new(ip, port_at(IPV4_ADDR_SIZE)?)))
        }
        AddressType::Ipv6 => {
            let octets: [u8; IPV6_ADDR_SIZE] = data
                .get(..IPV6_ADDR_SIZE)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(truncated)?;
            let ip = IpAddr::V6(Ipv6Addr::from(octets));
            Ok(TargetAddr::Ip(SocketAddr::new(ip, port_at(IPV6_ADDR_SIZE)?)))
        }
        AddressType::Domain => {
            let len = *data.first().ok_or_else(truncated)? as usize;
            let name = data.get(1..1 + len).ok_or_else(truncated)?;
            Ok(TargetAddr::Domain(
                String::from_utf8_lossy(name).into_owned(),
                port_at(1 + len)?,
            ))
        }
    }
}
