//! Socket manager (spec §4.C, component C): acquires and owns raw-send
//! and sniffer endpoints for IPv4 and IPv6, hands assembled packets out,
//! and decodes replies coming back in. Owns no algorithm state; purely a
//! thin wrapper around the OS network stack.

pub mod decode;
pub mod error;
pub mod socket;

pub use decode::DecodedReply;
pub use error::{Error, Result};
pub use socket::SocketManager;
