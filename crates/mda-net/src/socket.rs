//! Owns the raw-send and sniffer endpoints for both address families
//! (spec §4.C, component C). Sends take a fully-assembled packet (the
//! codec already wrote every header, including checksums) and hand it to
//! the matching family's raw endpoint; sniffing decodes one ICMP
//! datagram per call and never blocks.
//!
//! Grounded on the teacher's `IcmpChannel` (`src/icmp/net.rs`): a
//! `pnet::transport` send/receive pair per family, generalized from a
//! single ICMPv4-echo-only channel into one raw sender plus one ICMP
//! sniffer for each of IPv4 and IPv6.

use crate::decode::{decode_icmpv4, decode_icmpv6, DecodedReply};
use crate::error::{Error, Result};
use mda_packet::address::Address;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::transport::{
    icmp_packet_iter, icmpv6_packet_iter, transport_channel, TransportChannelType,
    TransportProtocol, TransportReceiver, TransportSender,
};
use std::net::IpAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, SystemTime};

/// Largest packet this manager will ever hand to the kernel. Mirrors the
/// teacher's `MAX_PACKET_SIZE` constant.
pub const MAX_PACKET_SIZE: usize = 1500;

struct FamilyChannels {
    send: TransportSender,
    sniff: TransportReceiver,
}

/// Owns one send/sniff pair per address family. Sharing this instance
/// across algorithm instances is intentional (spec §5 "Shared
/// resources"): only the scheduler mutates it.
pub struct SocketManager {
    v4: Option<FamilyChannels>,
    v6: Option<FamilyChannels>,
}

impl SocketManager {
    /// Acquires raw-send and sniffer endpoints for both families.
    /// Requires `CAP_NET_RAW` (or root) like the teacher's `IcmpChannel`.
    pub fn new() -> Result<Self> {
        Ok(Self {
            v4: Some(make_v4_channels()?),
            v6: Some(make_v6_channels()?),
        })
    }

    /// Builds a manager with only the requested families acquired, for
    /// callers that only want `-4` or `-6` behavior and would otherwise
    /// fail acquiring a family they don't need.
    pub fn with_families(want_v4: bool, want_v6: bool) -> Result<Self> {
        Ok(Self {
            v4: want_v4.then(make_v4_channels).transpose()?,
            v6: want_v6.then(make_v6_channels).transpose()?,
        })
    }

    /// Sends a fully-assembled packet (IP header onward) to `dst`.
    /// Returns `Error::WouldBlock` when the kernel send buffer is full;
    /// callers retry on the next writable-readiness tick (spec §5).
    pub fn send(&mut self, packet: &[u8], dst: IpAddr) -> Result<()> {
        let channels = match dst {
            IpAddr::V4(_) => self.v4.as_mut().ok_or(Error::NoEndpoint("ipv4"))?,
            IpAddr::V6(_) => self.v6.as_mut().ok_or(Error::NoEndpoint("ipv6"))?,
        };
        match channels.send.send_to(packet, dst) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::WouldBlock),
            Err(e) => Err(Error::SendFailed(e)),
        }
    }

    /// Reads and decodes at most one ICMPv4 datagram, waiting up to
    /// `timeout`. Returns `Ok(None)` on a clean timeout.
    pub fn sniff_v4(&mut self, timeout: Duration) -> Result<Option<DecodedReply>> {
        let channels = self.v4.as_mut().ok_or(Error::NoEndpoint("ipv4"))?;
        let mut iter = icmp_packet_iter(&mut channels.sniff);
        match iter.next_with_timeout(timeout) {
            Ok(Some((packet, addr))) => {
                let received = SystemTime::now();
                let responder = Address::from(addr);
                let reply = decode_icmpv4(responder, packet.packet(), received)?;
                Ok(Some(reply))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(Error::SendFailed(e)),
        }
    }

    /// As [`Self::sniff_v4`], for ICMPv6.
    pub fn sniff_v6(&mut self, timeout: Duration) -> Result<Option<DecodedReply>> {
        let channels = self.v6.as_mut().ok_or(Error::NoEndpoint("ipv6"))?;
        let mut iter = icmpv6_packet_iter(&mut channels.sniff);
        match iter.next_with_timeout(timeout) {
            Ok(Some((packet, addr))) => {
                let received = SystemTime::now();
                let responder = Address::from(addr);
                let reply = decode_icmpv6(responder, packet.packet(), received)?;
                Ok(Some(reply))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(Error::SendFailed(e)),
        }
    }

    /// The raw file descriptor the event loop should register for IPv4
    /// sniffer readiness, if that family was acquired.
    #[must_use]
    pub fn v4_sniff_fd(&self) -> Option<RawFd> {
        self.v4.as_ref().map(|c| c.sniff.as_raw_fd())
    }

    /// As [`Self::v4_sniff_fd`], for IPv6.
    #[must_use]
    pub fn v6_sniff_fd(&self) -> Option<RawFd> {
        self.v6.as_ref().map(|c| c.sniff.as_raw_fd())
    }
}

// Sending goes over a Layer3 (`IP_HDRINCL`) socket because the codec
// already wrote a complete IP header with the right protocol number and
// checksum — the send-side protocol argument below only selects the
// socket, it is not written to the wire. Sniffing uses a separate Layer4
// ICMP socket per family, exactly as the teacher's `IcmpChannel` does.

fn make_v4_channels() -> Result<FamilyChannels> {
    let (send, _unused) = transport_channel(
        MAX_PACKET_SIZE,
        TransportChannelType::Layer3(IpNextHeaderProtocols::Icmp),
    )
    .map_err(Error::SocketAcquire)?;
    let (_unused_tx, sniff) = transport_channel(
        MAX_PACKET_SIZE,
        TransportChannelType::Layer4(TransportProtocol::Ipv4(IpNextHeaderProtocols::Icmp)),
    )
    .map_err(Error::SocketAcquire)?;
    Ok(FamilyChannels { send, sniff })
}

fn make_v6_channels() -> Result<FamilyChannels> {
    let (send, _unused) = transport_channel(
        MAX_PACKET_SIZE,
        TransportChannelType::Layer3(IpNextHeaderProtocols::Icmpv6),
    )
    .map_err(Error::SocketAcquire)?;
    let (_unused_tx, sniff) = transport_channel(
        MAX_PACKET_SIZE,
        TransportChannelType::Layer4(TransportProtocol::Ipv6(IpNextHeaderProtocols::Icmpv6)),
    )
    .map_err(Error::SocketAcquire)?;
    Ok(FamilyChannels { send, sniff })
}
