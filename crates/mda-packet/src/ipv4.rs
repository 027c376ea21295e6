//! IPv4 header encode/decode (RFC 791).

use crate::checksum::internet_checksum;
use crate::field::{FieldDescriptor, FieldType, ProtocolDescriptor};
use std::net::Ipv4Addr;

pub const HEADER_LEN: usize = 20;

pub static FIELDS: [FieldDescriptor; 12] = [
    FieldDescriptor::bits("version", 0, 0, 4),
    FieldDescriptor::bits("ihl", 0, 4, 4),
    FieldDescriptor::new("dscp_ecn", FieldType::U8, 1),
    FieldDescriptor::new("total_length", FieldType::U16, 2),
    FieldDescriptor::new("identification", FieldType::U16, 4),
    FieldDescriptor::bits("flags", 6, 0, 3),
    FieldDescriptor::bits("fragment_offset", 6, 3, 13),
    FieldDescriptor::new("ttl", FieldType::U8, 8),
    FieldDescriptor::new("protocol", FieldType::U8, 9),
    FieldDescriptor::new("checksum", FieldType::U16, 10),
    FieldDescriptor::new("src_ip", FieldType::AddressV4, 12),
    FieldDescriptor::new("dst_ip", FieldType::AddressV4, 16),
];

pub static DESCRIPTOR: ProtocolDescriptor = ProtocolDescriptor {
    name: "ipv4",
    header_len: HEADER_LEN,
    fields: &FIELDS,
    owns_checksum: true,
};

/// A mutable IPv4 header over an owned, fixed-size buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    buf: [u8; HEADER_LEN],
}

impl Default for Ipv4Header {
    fn default() -> Self {
        let mut buf = [0_u8; HEADER_LEN];
        buf[0] = 0x45; // version 4, IHL 5 (no options)
        buf[8] = 64; // a conventional default TTL
        Self { buf }
    }
}

impl Ipv4Header {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let buf: [u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
        Some(Self { buf })
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        self.buf[0] >> 4
    }

    #[must_use]
    pub fn ihl_words(&self) -> u8 {
        self.buf[0] & 0x0F
    }

    #[must_use]
    pub fn header_len_bytes(&self) -> usize {
        usize::from(self.ihl_words()) * 4
    }

    #[must_use]
    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buf[2], self.buf[3]])
    }

    pub fn set_total_length(&mut self, len: u16) {
        self.buf[2..4].copy_from_slice(&len.to_be_bytes());
    }

    #[must_use]
    pub fn identification(&self) -> u16 {
        u16::from_be_bytes([self.buf[4], self.buf[5]])
    }

    pub fn set_identification(&mut self, id: u16) {
        self.buf[4..6].copy_from_slice(&id.to_be_bytes());
    }

    #[must_use]
    pub fn ttl(&self) -> u8 {
        self.buf[8]
    }

    pub fn set_ttl(&mut self, ttl: u8) {
        self.buf[8] = ttl;
    }

    #[must_use]
    pub fn protocol(&self) -> u8 {
        self.buf[9]
    }

    pub fn set_protocol(&mut self, protocol: u8) {
        self.buf[9] = protocol;
    }

    #[must_use]
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buf[10], self.buf[11]])
    }

    #[must_use]
    pub fn src(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.buf[12], self.buf[13], self.buf[14], self.buf[15])
    }

    pub fn set_src(&mut self, addr: Ipv4Addr) {
        self.buf[12..16].copy_from_slice(&addr.octets());
    }

    #[must_use]
    pub fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.buf[16], self.buf[17], self.buf[18], self.buf[19])
    }

    pub fn set_dst(&mut self, addr: Ipv4Addr) {
        self.buf[16..20].copy_from_slice(&addr.octets());
    }

    /// Recomputes and writes the header checksum, walking the layers from
    /// innermost out is the caller's job (spec §4.A); this only folds the
    /// 20 header bytes with the checksum field zeroed.
    pub fn finalize_checksum(&mut self) {
        self.buf[10] = 0;
        self.buf[11] = 0;
        let sum = internet_checksum(&self.buf);
        self.buf[10..12].copy_from_slice(&sum.to_be_bytes());
    }

    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        internet_checksum(&self.buf) == 0
    }
}
