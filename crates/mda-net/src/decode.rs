//! Decodes raw bytes read off a sniffer endpoint into a [`DecodedReply`],
//! the socket manager's half of spec §4.C: "attempt to decode it as a
//! packet whose outer layer is ICMP (v4 or v6), whose quoted inner
//! transport may be UDP/TCP/ICMP; return the decoded reply or
//! `DecodeFailed`."

use mda_packet::address::Address;
use mda_packet::quote::Quotation;
use mda_packet::{icmpv4, icmpv6};
use std::time::SystemTime;

/// The outcome of decoding one sniffed packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedReply {
    pub received: SystemTime,
    /// The address that sent this ICMP message (the responding hop, or
    /// the destination for an echo reply).
    pub responder: Address,
    pub icmp_type: u8,
    pub icmp_code: u8,
    /// Present for Time Exceeded / Destination Unreachable; absent for
    /// Echo Reply, whose own identifier/sequence are read directly off
    /// the outer ICMP header instead.
    pub quotation: Option<Quotation>,
    pub echo_identifier: Option<u16>,
    pub echo_sequence: Option<u16>,
}

/// Decodes an IPv4 ICMP datagram: `icmp_bytes` is the ICMP message alone
/// (header + payload), as handed back by a Layer4 ICMP sniffer.
pub fn decode_icmpv4(
    responder: Address,
    icmp_bytes: &[u8],
    received: SystemTime,
) -> mda_packet::Result<DecodedReply> {
    let hdr = icmpv4::IcmpV4Header::from_bytes(icmp_bytes).ok_or(mda_packet::Error::Truncated {
        need: icmpv4::HEADER_LEN,
        got: icmp_bytes.len(),
    })?;
    let payload = &icmp_bytes[icmpv4::HEADER_LEN..];
    let quotation = hdr.parse_quotation(payload);
    let (echo_identifier, echo_sequence) = if hdr.icmp_type() == icmpv4::TYPE_ECHO_REPLY {
        (Some(hdr.identifier()), Some(hdr.sequence()))
    } else {
        (None, None)
    };
    Ok(DecodedReply {
        received,
        responder,
        icmp_type: hdr.icmp_type(),
        icmp_code: hdr.icmp_code(),
        quotation,
        echo_identifier,
        echo_sequence,
    })
}

/// Decodes an IPv6 ICMP datagram analogously to [`decode_icmpv4`].
pub fn decode_icmpv6(
    responder: Address,
    icmp_bytes: &[u8],
    received: SystemTime,
) -> mda_packet::Result<DecodedReply> {
    let hdr = icmpv6::IcmpV6Header::from_bytes(icmp_bytes).ok_or(mda_packet::Error::Truncated {
        need: icmpv6::HEADER_LEN,
        got: icmp_bytes.len(),
    })?;
    let payload = &icmp_bytes[icmpv6::HEADER_LEN..];
    let quotation = hdr.parse_quotation(payload);
    let (echo_identifier, echo_sequence) = if hdr.icmp_type() == icmpv6::TYPE_ECHO_REPLY {
        (Some(hdr.identifier()), Some(hdr.sequence()))
    } else {
        (None, None)
    };
    Ok(DecodedReply {
        received,
        responder,
        icmp_type: hdr.icmp_type(),
        icmp_code: hdr.icmp_code(),
        quotation,
        echo_identifier,
        echo_sequence,
    })
}
