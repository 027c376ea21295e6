//! Assembles the actual wire bytes for a [`Probe`] (spec §4.A + §4.B):
//! builds the IP header carrying the probe's TTL, tunes the transport
//! header to the probe's flow id, and hands back a buffer ready for
//! `SocketManager::send`. This is the one place probe templates and the
//! wire codec meet.

use crate::probe::{Probe, Protocol};
use mda_packet::{icmpv4, icmpv6, ipv4, ipv6, tcp, udp, Address};

/// A fixed filler byte for probe payloads that carry no Paris-tunable
/// word (ICMP probes have none; UDP/TCP overwrite the first two bytes).
const PAYLOAD_FILLER: u8 = 0xAB;

/// Builds a complete packet (IP header onward) for `probe`, sent from
/// `src`. Panics if `src` and the probe's destination are different
/// address families — the caller is responsible for only ever pairing a
/// probe template with a same-family source address.
#[must_use]
pub fn build_packet(probe: &Probe, src: Address) -> Vec<u8> {
    match (src, probe.template.dst) {
        (Address::V4(_), Address::V4(_)) => build_v4(probe, src),
        (Address::V6(_), Address::V6(_)) => build_v6(probe, src),
        _ => panic!("probe source and destination must share an address family"),
    }
}

fn build_v4(probe: &Probe, src: Address) -> Vec<u8> {
    let mut payload = vec![PAYLOAD_FILLER; probe.template.payload_len];
    let (protocol_number, transport_bytes) = build_transport(probe, src, &mut payload);

    let Address::V4(src4) = src else { unreachable!() };
    let Address::V4(dst4) = probe.template.dst else {
        unreachable!()
    };
    let mut ip = ipv4::Ipv4Header::default();
    ip.set_src(src4);
    ip.set_dst(dst4);
    ip.set_ttl(probe.ttl);
    ip.set_protocol(protocol_number);
    ip.set_identification(probe.sequence as u16);
    ip.set_total_length((ipv4::HEADER_LEN + transport_bytes.len()) as u16);
    ip.finalize_checksum();

    let mut packet = ip.as_bytes().to_vec();
    packet.extend_from_slice(&transport_bytes);
    packet
}

fn build_v6(probe: &Probe, src: Address) -> Vec<u8> {
    let mut payload = vec![PAYLOAD_FILLER; probe.template.payload_len];
    let (next_header, transport_bytes) = build_transport(probe, src, &mut payload);

    let Address::V6(src6) = src else { unreachable!() };
    let Address::V6(dst6) = probe.template.dst else {
        unreachable!()
    };
    let mut ip = ipv6::Ipv6Header::default();
    ip.set_src(src6);
    ip.set_dst(dst6);
    ip.set_hop_limit(probe.ttl);
    ip.set_next_header(next_header);
    ip.set_payload_length(transport_bytes.len() as u16);

    let mut packet = ip.as_bytes().to_vec();
    packet.extend_from_slice(&transport_bytes);
    packet
}

/// Builds and checksums the transport header + payload, returning its
/// IP protocol number alongside the bytes. Shared between the v4 and v6
/// paths since every transport builder here already takes a generic
/// [`Address`] for its pseudoheader.
fn build_transport(probe: &Probe, src: Address, payload: &mut Vec<u8>) -> (u8, Vec<u8>) {
    match probe.template.protocol {
        Protocol::Udp => {
            let mut hdr = udp::UdpHeader::default();
            hdr.set_src_port(probe.template.src_port);
            hdr.set_dst_port(probe.template.dst_port);
            hdr.set_length((udp::HEADER_LEN + payload.len()) as u16);
            udp::tune_flow_identifier(&mut hdr, src, probe.template.dst, payload, probe.flow_id.as_u16());
            let mut bytes = hdr.as_bytes().to_vec();
            bytes.extend_from_slice(payload);
            (udp::PROTOCOL_NUMBER, bytes)
        }
        Protocol::Tcp => {
            let mut hdr = tcp::TcpHeader::default();
            hdr.set_src_port(probe.template.src_port);
            hdr.set_dst_port(probe.template.dst_port);
            hdr.set_syn(true);
            tcp::set_flow_identifier(
                &mut hdr,
                probe.template.tcp_flow_field,
                probe.flow_id.0,
                src,
                probe.template.dst,
                payload,
            );
            let mut bytes = hdr.as_bytes().to_vec();
            bytes.extend_from_slice(payload);
            (tcp::PROTOCOL_NUMBER, bytes)
        }
        Protocol::Icmp => match (src, probe.template.dst) {
            (Address::V6(_), Address::V6(_)) => {
                let mut hdr = icmpv6::IcmpV6Header::default();
                hdr.set_icmp_type(icmpv6::TYPE_ECHO_REQUEST);
                hdr.set_identifier(probe.icmp_identifier);
                hdr.set_sequence(probe.icmp_sequence);
                hdr.finalize_checksum(src, probe.template.dst, payload);
                let mut bytes = hdr.as_bytes().to_vec();
                bytes.extend_from_slice(payload);
                (icmpv6::PROTOCOL_NUMBER, bytes)
            }
            _ => {
                let mut hdr = icmpv4::IcmpV4Header::default();
                hdr.set_icmp_type(icmpv4::TYPE_ECHO_REQUEST);
                hdr.set_identifier(probe.icmp_identifier);
                hdr.set_sequence(probe.icmp_sequence);
                hdr.finalize_checksum(payload);
                let mut bytes = hdr.as_bytes().to_vec();
                bytes.extend_from_slice(payload);
                (icmpv4::PROTOCOL_NUMBER, bytes)
            }
        },
    }
}
