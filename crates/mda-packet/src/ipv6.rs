//! IPv6 header encode/decode (RFC 8200).

use crate::field::{FieldDescriptor, FieldType, ProtocolDescriptor};
use std::net::Ipv6Addr;

pub const HEADER_LEN: usize = 40;

fn get_total_length(buf: &[u8]) -> u128 {
    let payload_len = u16::from_be_bytes([buf[4], buf[5]]);
    u128::from(payload_len) + HEADER_LEN as u128
}

fn set_total_length(buf: &mut [u8], value: u128) {
    let payload_len = (value.saturating_sub(HEADER_LEN as u128)) as u16;
    buf[4..6].copy_from_slice(&payload_len.to_be_bytes());
}

pub static FIELDS: [FieldDescriptor; 8] = [
    FieldDescriptor::bits("version", 0, 0, 4),
    FieldDescriptor::bits("traffic_class", 0, 4, 8),
    FieldDescriptor::bits("flow_label", 1, 4, 20),
    FieldDescriptor::new("payload_length", FieldType::U16, 4),
    FieldDescriptor::new("next_header", FieldType::U8, 6),
    FieldDescriptor::new("hop_limit", FieldType::U8, 7),
    FieldDescriptor::new("src_ip", FieldType::AddressV6, 8),
    FieldDescriptor::new("dst_ip", FieldType::AddressV6, 24),
];

/// `length` is a computed field (payload_length + 40, the fixed header
/// size) exposed so family-generic code can read a packet's total length
/// the same way for IPv4 and IPv6, per spec §4.A.
pub static COMPUTED_TOTAL_LENGTH: FieldDescriptor =
    FieldDescriptor::computed("total_length", get_total_length, set_total_length);

pub static DESCRIPTOR: ProtocolDescriptor = ProtocolDescriptor {
    name: "ipv6",
    header_len: HEADER_LEN,
    fields: &FIELDS,
    owns_checksum: false, // IPv6 has no header checksum; transports carry one instead.
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Header {
    buf: [u8; HEADER_LEN],
}

impl Default for Ipv6Header {
    fn default() -> Self {
        let mut buf = [0_u8; HEADER_LEN];
        buf[0] = 0x60; // version 6
        buf[7] = 64; // a conventional default hop limit
        Self { buf }
    }
}

impl Ipv6Header {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let buf: [u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
        Some(Self { buf })
    }

    #[must_use]
    pub fn payload_length(&self) -> u16 {
        u16::from_be_bytes([self.buf[4], self.buf[5]])
    }

    pub fn set_payload_length(&mut self, len: u16) {
        self.buf[4..6].copy_from_slice(&len.to_be_bytes());
    }

    #[must_use]
    pub fn next_header(&self) -> u8 {
        self.buf[6]
    }

    pub fn set_next_header(&mut self, next: u8) {
        self.buf[6] = next;
    }

    #[must_use]
    pub fn hop_limit(&self) -> u8 {
        self.buf[7]
    }

    pub fn set_hop_limit(&mut self, ttl: u8) {
        self.buf[7] = ttl;
    }

    #[must_use]
    pub fn src(&self) -> Ipv6Addr {
        let b: [u8; 16] = self.buf[8..24].try_into().unwrap();
        Ipv6Addr::from(b)
    }

    pub fn set_src(&mut self, addr: Ipv6Addr) {
        self.buf[8..24].copy_from_slice(&addr.octets());
    }

    #[must_use]
    pub fn dst(&self) -> Ipv6Addr {
        let b: [u8; 16] = self.buf[24..40].try_into().unwrap();
        Ipv6Addr::from(b)
    }

    pub fn set_dst(&mut self, addr: Ipv6Addr) {
        self.buf[24..40].copy_from_slice(&addr.octets());
    }
}
