//! Wire codec for the MDA topology tracer (spec §4.A, component A).
//!
//! Declarative protocol descriptors drive generic field access for the
//! probe template layer in `mda-core`; each protocol module additionally
//! exposes a concrete, typed header struct for the hot encode/decode
//! path. Checksums follow RFC 1071 with the IPv4/IPv6 pseudoheaders
//! where the transport requires one.

pub mod address;
pub mod bits;
pub mod checksum;
pub mod error;
pub mod field;
pub mod icmpv4;
pub mod icmpv6;
pub mod ipv4;
pub mod ipv6;
pub mod quote;
pub mod registry;
pub mod tcp;
pub mod udp;

pub use address::Address;
pub use error::{Error, Result};
