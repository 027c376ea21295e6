//! TCP header encode/decode (RFC 9293), minimal (no options).
//!
//! Per spec §4.A, TCP's flow-identifier field is configurable: either the
//! source port or the initial sequence number, since both are hashed by
//! common per-flow load balancers and both can be varied independently of
//! the classifier-visible 5-tuple bits the operator wants held constant.

use crate::address::Address;
use crate::field::{FieldDescriptor, FieldType, ProtocolDescriptor};

pub const HEADER_LEN: usize = 20;
pub const PROTOCOL_NUMBER: u8 = 6;

pub static FIELDS: [FieldDescriptor; 9] = [
    FieldDescriptor::new("src_port", FieldType::U16, 0),
    FieldDescriptor::new("dst_port", FieldType::U16, 2),
    FieldDescriptor::new("sequence", FieldType::U32, 4),
    FieldDescriptor::new("ack_number", FieldType::U32, 8),
    FieldDescriptor::bits("data_offset", 12, 0, 4),
    FieldDescriptor::bits("flags", 12, 4, 12),
    FieldDescriptor::new("window", FieldType::U16, 14),
    FieldDescriptor::new("checksum", FieldType::U16, 16),
    FieldDescriptor::new("urgent_pointer", FieldType::U16, 18),
];

pub static DESCRIPTOR: ProtocolDescriptor = ProtocolDescriptor {
    name: "tcp",
    header_len: HEADER_LEN,
    fields: &FIELDS,
    owns_checksum: true,
};

/// Which part of the TCP header carries the tunable flow identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowIdentifierField {
    SourcePort,
    SequenceNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    buf: [u8; HEADER_LEN],
}

impl Default for TcpHeader {
    fn default() -> Self {
        let mut buf = [0_u8; HEADER_LEN];
        buf[12] = 5 << 4; // data offset: 5 words, no options
        Self { buf }
    }
}

impl TcpHeader {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let buf: [u8; HEADER_LEN] = bytes.get(..HEADER_LEN)?.try_into().ok()?;
        Some(Self { buf })
    }

    #[must_use]
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.buf[0], self.buf[1]])
    }

    pub fn set_src_port(&mut self, port: u16) {
        self.buf[0..2].copy_from_slice(&port.to_be_bytes());
    }

    #[must_use]
    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.buf[2], self.buf[3]])
    }

    pub fn set_dst_port(&mut self, port: u16) {
        self.buf[2..4].copy_from_slice(&port.to_be_bytes());
    }

    #[must_use]
    pub fn sequence(&self) -> u32 {
        u32::from_be_bytes(self.buf[4..8].try_into().unwrap())
    }

    pub fn set_sequence(&mut self, seq: u32) {
        self.buf[4..8].copy_from_slice(&seq.to_be_bytes());
    }

    pub fn set_syn(&mut self, syn: bool) {
        let flags = u16::from_be_bytes([self.buf[12] & 0x0F, self.buf[13]]);
        let flags = if syn { flags | 0x002 } else { flags & !0x002 };
        self.buf[12] = (self.buf[12] & 0xF0) | ((flags >> 8) as u8 & 0x0F);
        self.buf[13] = flags as u8;
    }

    #[must_use]
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.buf[16], self.buf[17]])
    }

    pub fn set_checksum(&mut self, checksum: u16) {
        self.buf[16..18].copy_from_slice(&checksum.to_be_bytes());
    }

    pub fn finalize_checksum(&mut self, src: Address, dst: Address, payload: &[u8]) {
        self.set_checksum(0);
        let mut segment = self.buf.to_vec();
        segment.extend_from_slice(payload);
        let sum = crate::checksum::transport_checksum(src, dst, PROTOCOL_NUMBER, &segment);
        self.set_checksum(sum);
    }

    #[must_use]
    pub fn verify_checksum(&self, src: Address, dst: Address, payload: &[u8]) -> bool {
        let mut segment = self.buf.to_vec();
        segment.extend_from_slice(payload);
        crate::checksum::transport_checksum(src, dst, PROTOCOL_NUMBER, &segment) == 0
    }
}

/// Sets the configured flow-identifier field to `flow_id`, then finalizes
/// the checksum. Unlike UDP, TCP's flow id is carried directly in a
/// header field rather than forced via payload tuning (the checksum is
/// not classifier-visible for TCP-hashing load balancers).
pub fn set_flow_identifier(
    header: &mut TcpHeader,
    field: FlowIdentifierField,
    flow_id: u32,
    src: Address,
    dst: Address,
    payload: &[u8],
) {
    match field {
        FlowIdentifierField::SourcePort => header.set_src_port(flow_id as u16),
        FlowIdentifierField::SequenceNumber => header.set_sequence(flow_id),
    }
    header.finalize_checksum(src, dst, payload);
}
