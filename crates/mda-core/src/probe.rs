//! Probe and reply model (spec §4.B, component B).
//!
//! Grounded on the teacher's `trippy-core` `probe.rs`: a lightweight
//! template describing what to send, a mutable per-send copy carrying
//! sequencing state, and a `Reply` that owns the `Probe` it completes.
//! Generalized here across address family and transport (ICMP/UDP/TCP)
//! since the teacher's `Probe` is ICMP-only.

use mda_packet::quote::QuotedTransport;
use mda_packet::tcp::FlowIdentifierField;
use mda_packet::Address;
use mda_net::DecodedReply;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Icmp,
    Udp,
    Tcp,
}

/// The classifier-visible flow identifier a probe was tuned to carry
/// (spec §3 "Flow"). Widened to `u32` to cover TCP's sequence-number
/// field; ICMP and UDP only ever use the low 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowId(pub u32);

impl FlowId {
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0 as u16
    }
}

/// Everything about a probe that stays fixed across retransmissions at a
/// given TTL: destination, transport, and which field carries the flow
/// id. The scheduler combines this with a sequence number and TTL to
/// build one [`Probe`] per send (spec §3 "Probe template vs. mutable
/// copy").
#[derive(Debug, Clone)]
pub struct ProbeTemplate {
    pub protocol: Protocol,
    pub src: Address,
    pub dst: Address,
    pub src_port: u16,
    pub dst_port: u16,
    pub tcp_flow_field: FlowIdentifierField,
    pub payload_len: usize,
}

/// Outcome of a completed probe (spec §3 "Reply"), generalized from the
/// teacher's `ProbeComplete`/`Response`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    TimeExceeded { responder: Address },
    DestinationUnreachable { responder: Address, icmp_code: u8 },
    EchoReply { responder: Address },
    Timeout,
}

impl ProbeOutcome {
    /// Whether this outcome ends the TTL's search (a responder answered,
    /// one way or another) rather than leaving it a silent hop.
    #[must_use]
    pub fn is_answered(self) -> bool {
        !matches!(self, ProbeOutcome::Timeout)
    }

    #[must_use]
    pub fn is_destination_reached(self) -> bool {
        matches!(
            self,
            ProbeOutcome::EchoReply { .. } | ProbeOutcome::DestinationUnreachable { .. }
        )
    }

    #[must_use]
    pub fn responder(self) -> Option<Address> {
        match self {
            ProbeOutcome::TimeExceeded { responder }
            | ProbeOutcome::DestinationUnreachable { responder, .. }
            | ProbeOutcome::EchoReply { responder } => Some(responder),
            ProbeOutcome::Timeout => None,
        }
    }
}

/// A single probe in flight or completed (spec §3 "Probe"). The
/// scheduler owns the canonical copy while `Awaited`; a matching
/// [`Reply`] takes ownership once correlated (spec §3 ownership summary).
#[derive(Debug, Clone)]
pub struct Probe {
    pub sequence: u32,
    pub template: ProbeTemplate,
    pub flow_id: FlowId,
    pub ttl: u8,
    pub round: u8,
    /// ICMP identifier/sequence pair; meaningless for UDP/TCP probes but
    /// kept unconditionally to avoid an enum-of-protocol-specific-fields
    /// split that the correlator would only have to match back apart.
    pub icmp_identifier: u16,
    pub icmp_sequence: u16,
    pub sent: SystemTime,
}

impl Probe {
    /// Elapsed time since this probe was sent, for RTT computation on a
    /// matching reply.
    #[must_use]
    pub fn elapsed_since_sent(&self, now: SystemTime) -> Duration {
        now.duration_since(self.sent).unwrap_or_default()
    }
}

/// A completed round trip: the probe it answers, plus timing.
#[derive(Debug, Clone)]
pub struct Reply {
    pub probe: Probe,
    pub outcome: ProbeOutcome,
    pub received: SystemTime,
    pub rtt: Duration,
}

/// The correlator's core predicate (spec §4.B "matches"): does this
/// decoded ICMP message answer `probe`? Dispatches on the probe's
/// transport since each carries its flow id in a different wire field.
#[must_use]
pub fn matches(probe: &Probe, reply: &DecodedReply) -> bool {
    match probe.template.protocol {
        Protocol::Icmp => matches_icmp(probe, reply),
        Protocol::Udp => matches_udp(probe, reply),
        Protocol::Tcp => matches_tcp(probe, reply),
    }
}

fn matches_icmp(probe: &Probe, reply: &DecodedReply) -> bool {
    if let (Some(identifier), Some(sequence)) = (reply.echo_identifier, reply.echo_sequence) {
        return identifier == probe.icmp_identifier && sequence == probe.icmp_sequence;
    }
    let Some(quotation) = reply.quotation.as_ref() else {
        return false;
    };
    if quotation.src != probe.template.src || quotation.dst != probe.template.dst {
        return false;
    }
    match quotation.transport {
        QuotedTransport::Icmp { identifier, sequence } => {
            identifier == probe.icmp_identifier && sequence == probe.icmp_sequence
        }
        _ => false,
    }
}

fn matches_udp(probe: &Probe, reply: &DecodedReply) -> bool {
    let Some(quotation) = reply.quotation.as_ref() else {
        return false;
    };
    let QuotedTransport::Udp {
        src_port,
        dst_port,
        checksum,
    } = quotation.transport
    else {
        return false;
    };
    quotation.src == probe.template.src
        && quotation.dst == probe.template.dst
        && src_port == probe.template.src_port
        && dst_port == probe.template.dst_port
        && checksum == probe.flow_id.as_u16()
}

fn matches_tcp(probe: &Probe, reply: &DecodedReply) -> bool {
    let Some(quotation) = reply.quotation.as_ref() else {
        return false;
    };
    let QuotedTransport::Tcp {
        src_port,
        dst_port,
        sequence,
    } = quotation.transport
    else {
        return false;
    };
    if quotation.src != probe.template.src || quotation.dst != probe.template.dst || dst_port != probe.template.dst_port {
        return false;
    }
    match probe.template.tcp_flow_field {
        FlowIdentifierField::SourcePort => src_port == probe.flow_id.as_u16(),
        FlowIdentifierField::SequenceNumber => sequence as u16 == probe.flow_id.as_u16(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mda_packet::quote::Quotation;
    use std::net::Ipv4Addr;

    fn base_probe(protocol: Protocol, dst: Address) -> Probe {
        Probe {
            sequence: 1,
            template: ProbeTemplate {
                protocol,
                src: Address::V4(Ipv4Addr::new(192, 168, 0, 1)),
                dst,
                src_port: 33434,
                dst_port: 33457,
                tcp_flow_field: FlowIdentifierField::SourcePort,
                payload_len: 12,
            },
            flow_id: FlowId(0xBEEF),
            ttl: 5,
            round: 0,
            icmp_identifier: 0xABCD,
            icmp_sequence: 7,
            sent: SystemTime::now(),
        }
    }

    #[test]
    fn udp_quotation_with_matching_checksum_matches() {
        let dst = Address::V4(Ipv4Addr::new(8, 8, 8, 8));
        let probe = base_probe(Protocol::Udp, dst);
        let reply = DecodedReply {
            received: SystemTime::now(),
            responder: Address::V4(Ipv4Addr::new(10, 0, 0, 1)),
            icmp_type: 11,
            icmp_code: 0,
            quotation: Some(Quotation {
                src: Address::V4(Ipv4Addr::new(192, 168, 0, 1)),
                dst,
                transport: QuotedTransport::Udp {
                    src_port: 33434,
                    dst_port: 33457,
                    checksum: 0xBEEF,
                },
            }),
            echo_identifier: None,
            echo_sequence: None,
        };
        assert!(matches(&probe, &reply));
    }

    #[test]
    fn udp_quotation_with_wrong_checksum_does_not_match() {
        let dst = Address::V4(Ipv4Addr::new(8, 8, 8, 8));
        let probe = base_probe(Protocol::Udp, dst);
        let reply = DecodedReply {
            received: SystemTime::now(),
            responder: Address::V4(Ipv4Addr::new(10, 0, 0, 1)),
            icmp_type: 11,
            icmp_code: 0,
            quotation: Some(Quotation {
                src: Address::V4(Ipv4Addr::new(192, 168, 0, 1)),
                dst,
                transport: QuotedTransport::Udp {
                    src_port: 33434,
                    dst_port: 33457,
                    checksum: 0x0001,
                },
            }),
            echo_identifier: None,
            echo_sequence: None,
        };
        assert!(!matches(&probe, &reply));
    }

    #[test]
    fn icmp_echo_reply_matches_on_identifier_and_sequence() {
        let dst = Address::V4(Ipv4Addr::new(8, 8, 8, 8));
        let probe = base_probe(Protocol::Icmp, dst);
        let reply = DecodedReply {
            received: SystemTime::now(),
            responder: dst,
            icmp_type: 0,
            icmp_code: 0,
            quotation: None,
            echo_identifier: Some(0xABCD),
            echo_sequence: Some(7),
        };
        assert!(matches(&probe, &reply));
    }

    #[test]
    fn icmp_echo_reply_with_different_sequence_does_not_match() {
        let dst = Address::V4(Ipv4Addr::new(8, 8, 8, 8));
        let probe = base_probe(Protocol::Icmp, dst);
        let reply = DecodedReply {
            received: SystemTime::now(),
            responder: dst,
            icmp_type: 0,
            icmp_code: 0,
            quotation: None,
            echo_identifier: Some(0xABCD),
            echo_sequence: Some(8),
        };
        assert!(!matches(&probe, &reply));
    }

    #[test]
    fn tcp_sequence_flow_field_matches_on_truncated_sequence() {
        let dst = Address::V4(Ipv4Addr::new(8, 8, 8, 8));
        let mut probe = base_probe(Protocol::Tcp, dst);
        probe.template.tcp_flow_field = FlowIdentifierField::SequenceNumber;
        let reply = DecodedReply {
            received: SystemTime::now(),
            responder: Address::V4(Ipv4Addr::new(10, 0, 0, 1)),
            icmp_type: 11,
            icmp_code: 0,
            quotation: Some(Quotation {
                src: Address::V4(Ipv4Addr::new(192, 168, 0, 1)),
                dst,
                transport: QuotedTransport::Tcp {
                    src_port: 12345,
                    dst_port: 33457,
                    sequence: 0x1234_BEEF,
                },
            }),
            echo_identifier: None,
            echo_sequence: None,
        };
        assert!(matches(&probe, &reply));
    }
}
