//! Interface / hop node (spec §3 "Interface"): one distinct next-hop
//! address observed at a TTL, or the null interface standing in for a
//! non-answering (star) hop.

use crate::probe::FlowId;
use mda_packet::Address;

/// How the MDA controller has classified the link leading to this
/// interface (spec §4.G): how many next hops its predecessor fans out
/// to, inferred once enumeration at that TTL completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkClass {
    /// Exactly one next hop: a simple (non-load-balancing) router.
    SimpleRouter,
    /// More than one next hop, hashed per-flow: classical Paris-stable
    /// load balancing.
    PerFlowLoadBalancer,
    /// More than one next hop, varying even within one flow: a
    /// per-packet load balancer.
    PerPacketLoadBalancer,
    /// This interface's address is the probed destination.
    EndHost,
    /// Enumeration at this TTL has not yet concluded.
    Unclassified,
}

/// One node of the [`crate::lattice::Lattice`]: a next-hop interface, or
/// `address: None` for a TTL at which some flows went unanswered (a star).
#[derive(Debug, Clone)]
pub struct Interface {
    pub address: Option<Address>,
    pub ttl: u8,
    flows: Vec<FlowId>,
    pub classification: LinkClass,
    pub enumeration_done: bool,
}

impl Interface {
    #[must_use]
    pub fn new(address: Option<Address>, ttl: u8) -> Self {
        Self {
            address,
            ttl,
            flows: Vec::new(),
            classification: LinkClass::Unclassified,
            enumeration_done: false,
        }
    }

    #[must_use]
    pub fn is_star(&self) -> bool {
        self.address.is_none()
    }

    /// Records that `flow_id` was observed to lead here, if not already.
    pub fn record_flow(&mut self, flow_id: FlowId) {
        if !self.flows.contains(&flow_id) {
            self.flows.push(flow_id);
        }
    }

    #[must_use]
    pub fn flows(&self) -> &[FlowId] {
        &self.flows
    }

    #[must_use]
    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }
}
