//! ICMPv4 header encode/decode (RFC 792): echo request/reply, time
//! exceeded and destination unreachable, including the nested quotation
//! those error types carry.

use crate::address::Address;
use crate::checksum::internet_checksum;
use crate::field::{FieldDescriptor, FieldType, ProtocolDescriptor};
use crate::quote::Quotation;

pub const HEADER_LEN: usize = 8;
pub const PROTOCOL_NUMBER: u8 = 1;

pub const TYPE_ECHO_REPLY: u8 = 0;
pub const TYPE_DESTINATION_UNREACHABLE: u8 = 3;
pub const TYPE_ECHO_REQUEST: u8 = 8;
pub const TYPE_TIME_EXCEEDED: u8 = 11;

pub const CODE_TTL_EXCEEDED_IN_TRANSIT: u8 = 0;
pub const CODE_PORT_UNREACHABLE: u8 = 3;

pub static FIELDS: [FieldDescriptor; 5] = [
    FieldDescriptor::new("icmp_type", FieldType::U8, 0),
    FieldDescriptor::new("icmp_code", FieldType::U8, 1),
    FieldDescriptor::new("checksum", FieldType::U16, 2),
    FieldDescriptor::new("identifier", FieldType::U16, 4),
    FieldDescriptor::new("sequence", FieldType::U16, 6),
];

pub static DESCRIPTOR: ProtocolDescriptor = ProtocolDescriptor {
    name: "icmpv4",
    header_len: HEADER_LEN,
    fields: &FIELDS,
    owns_checksum: true,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcmpV4Header {
    buf: [u8; HEADER_LEN],
}

impl Default for IcmpV4Header {
    fn default() -> Self {
        let mut buf = [0_u8; HEADER_LEN];
        buf[0] = TYPE_ECHO_REQUEST;
        Self { buf }
    }
}

impl IcmpV4Header {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let buf: [u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
        Some(Self { buf })
    }

    #[must_use]
    pub fn icmp_type(&self) -> u8 {
        self.buf[0]
    }

    pub fn set_icmp_type(&mut self, ty: u8) {
        self.buf[0] = ty;
    }

    #[must_use]
    pub fn icmp_code(&self) -> u8 {
        self.buf[1]
    }

    pub fn set_icmp_code(&mut self, code: u8) {
        self.buf[1] = code;
    }

    #[must_use]
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buf[2], self.buf[3]])
    }

    pub fn set_checksum(&mut self, checksum: u16) {
        self.buf[2..4].copy_from_slice(&checksum.to_be_bytes());
    }

    #[must_use]
    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes([self.buf[4], self.buf[5]])
    }

    pub fn set_identifier(&mut self, id: u16) {
        self.buf[4..6].copy_from_slice(&id.to_be_bytes());
    }

    #[must_use]
    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes([self.buf[6], self.buf[7]])
    }

    pub fn set_sequence(&mut self, seq: u16) {
        self.buf[6..8].copy_from_slice(&seq.to_be_bytes());
    }

    /// ICMP has no pseudoheader: the checksum covers only the ICMP
    /// message (header + payload).
    pub fn finalize_checksum(&mut self, payload: &[u8]) {
        self.set_checksum(0);
        let mut msg = self.buf.to_vec();
        msg.extend_from_slice(payload);
        let sum = internet_checksum(&msg);
        self.set_checksum(sum);
    }

    #[must_use]
    pub fn verify_checksum(&self, payload: &[u8]) -> bool {
        let mut msg = self.buf.to_vec();
        msg.extend_from_slice(payload);
        internet_checksum(&msg) == 0
    }

    /// Parses an ICMP Time Exceeded or Destination Unreachable payload:
    /// 4 unused bytes, then the quoted inner IP header and at least the
    /// first 8 bytes of its transport header (spec §4.A "ICMP quotation
    /// parsing").
    #[must_use]
    pub fn parse_quotation(&self, payload: &[u8]) -> Option<Quotation> {
        if !matches!(
            self.icmp_type(),
            TYPE_TIME_EXCEEDED | TYPE_DESTINATION_UNREACHABLE
        ) {
            return None;
        }
        let quoted = payload.get(4..)?;
        Quotation::parse_v4(quoted)
    }
}
