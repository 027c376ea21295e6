//! The inner layer quoted by an ICMP error (spec §4.A "ICMP quotation
//! parsing"): the offending IP header plus at least the first 8 bytes of
//! its transport header, enough to recover the flow identifier the
//! correlator needs to match the error back to an in-flight probe.

use crate::address::Address;
use crate::{icmpv4, ipv4, ipv6, tcp, udp};

/// The quoted transport header's flow-relevant fields. Only the first 8
/// bytes of the transport header are guaranteed present in an ICMP
/// quotation, which is exactly enough for each of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotedTransport {
    Udp {
        src_port: u16,
        dst_port: u16,
        checksum: u16,
    },
    Tcp {
        src_port: u16,
        dst_port: u16,
        sequence: u32,
    },
    Icmp {
        identifier: u16,
        sequence: u16,
    },
    Other {
        protocol_number: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quotation {
    pub src: Address,
    pub dst: Address,
    pub transport: QuotedTransport,
}

impl Quotation {
    #[must_use]
    pub fn parse_v4(quoted: &[u8]) -> Option<Self> {
        let ip = ipv4::Ipv4Header::from_bytes(quoted)?;
        let header_len = ip.header_len_bytes().max(ipv4::HEADER_LEN);
        let transport_bytes = quoted.get(header_len..)?;
        let transport = parse_transport(ip.protocol(), transport_bytes)?;
        Some(Self {
            src: Address::V4(ip.src()),
            dst: Address::V4(ip.dst()),
            transport,
        })
    }

    #[must_use]
    pub fn parse_v6(quoted: &[u8]) -> Option<Self> {
        let ip = ipv6::Ipv6Header::from_bytes(quoted)?;
        let transport_bytes = quoted.get(ipv6::HEADER_LEN..)?;
        let transport = parse_transport(ip.next_header(), transport_bytes)?;
        Some(Self {
            src: Address::V6(ip.src()),
            dst: Address::V6(ip.dst()),
            transport,
        })
    }
}

fn parse_transport(protocol_number: u8, bytes: &[u8]) -> Option<QuotedTransport> {
    match protocol_number {
        udp::PROTOCOL_NUMBER => {
            let b = bytes.get(..8)?;
            Some(QuotedTransport::Udp {
                src_port: u16::from_be_bytes([b[0], b[1]]),
                dst_port: u16::from_be_bytes([b[2], b[3]]),
                checksum: u16::from_be_bytes([b[6], b[7]]),
            })
        }
        tcp::PROTOCOL_NUMBER => {
            let b = bytes.get(..8)?;
            Some(QuotedTransport::Tcp {
                src_port: u16::from_be_bytes([b[0], b[1]]),
                dst_port: u16::from_be_bytes([b[2], b[3]]),
                sequence: u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
            })
        }
        icmpv4::PROTOCOL_NUMBER => {
            let hdr = icmpv4::IcmpV4Header::from_bytes(bytes.get(..icmpv4::HEADER_LEN)?)?;
            Some(QuotedTransport::Icmp {
                identifier: hdr.identifier(),
                sequence: hdr.sequence(),
            })
        }
        other => Some(QuotedTransport::Other {
            protocol_number: other,
        }),
    }
}
