pub mod address;
pub mod config;
pub mod error;
pub mod handshake;
pub mod http;
pub mod io;
pub mod negotiator;
pub mod registry;
pub mod socks4;
pub mod socks5;
pub mod telemetry;
pub mod tls;

pub use address::{Destination, ProxyAddress, ProxyUri};
pub use error::ProxyError;
pub use io::{BoxedBlockingStream, BoxedStream};
pub use negotiator::Negotiator;
pub use registry::{
    default_registry, lookup, negotiate, negotiate_async, negotiate_async_cancellable,
    negotiate_cancellable, Registry,
};
pub use telemetry::{telemetry_snapshot, NegotiationSnapshot};
