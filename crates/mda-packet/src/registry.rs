//! Protocol descriptor registry (spec §9 "Global state").
//!
//! The original registers each protocol's descriptor into a process-wide
//! list via file-scope constructors. Here the registry is an ordinary
//! value built once at program start from a static table and passed to
//! whatever needs to look a protocol up by name — never a global.

use crate::field::ProtocolDescriptor;
use crate::{icmpv4, icmpv6, ipv4, ipv6, tcp, udp};

/// An explicit, constructible table of the protocol descriptors this
/// codec knows about.
pub struct ProtocolRegistry {
    descriptors: Vec<&'static ProtocolDescriptor>,
}

impl ProtocolRegistry {
    /// Builds the registry covering every protocol this crate implements.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            descriptors: vec![
                &ipv4::DESCRIPTOR,
                &ipv6::DESCRIPTOR,
                &icmpv4::DESCRIPTOR,
                &icmpv6::DESCRIPTOR,
                &udp::DESCRIPTOR,
                &tcp::DESCRIPTOR,
            ],
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'static ProtocolDescriptor> {
        self.descriptors.iter().copied().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static ProtocolDescriptor> + '_ {
        self.descriptors.iter().copied()
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
