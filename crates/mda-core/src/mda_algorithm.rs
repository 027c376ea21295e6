//! MDA controller (spec §4.G, component G) — the hardest part: extends
//! classical per-hop probing into per-hop *interface enumeration*. At
//! each hop it consults the stopping-rule table for how many distinct
//! flows to try given the interface count observed so far, classifies
//! the hop's fan-out once enumeration settles, and stitches discovered
//! interfaces into the topology lattice before recursing to their
//! children.
//!
//! Like [`crate::traceroute::Traceroute`] this is an explicit state
//! machine: a frontier of hops under active enumeration, each advanced
//! one `Reply` at a time.

use crate::bound::StoppingRuleTable;
use crate::flow::Flow;
use crate::interface::{Interface, LinkClass};
use crate::lattice::{Lattice, NodeId};
use crate::options::MdaOptions;
use crate::probe::{FlowId, ProbeTemplate, Reply};
use mda_packet::Address;
use std::collections::{HashMap, HashSet};

/// A re-probe round testing whether a hop's fan-out is hashed per-flow
/// (same next hop on every repeat of a flow id) or per-packet (varies
/// even within one flow). `first` is what enumeration already observed
/// per flow; `second` fills in as confirmation replies arrive.
#[derive(Debug, Clone, Default)]
struct ConfirmRound {
    first: HashMap<FlowId, Address>,
    pending: HashSet<FlowId>,
    second: HashMap<FlowId, Address>,
}

/// A hop still under active enumeration. Its probes go out at `ttl`,
/// hanging off `parent` (the already-resolved interface one hop closer
/// to the source).
#[derive(Debug, Clone)]
struct HopState {
    parent: NodeId,
    ttl: u8,
    flows: Vec<Flow>,
    next_flow_id: u32,
    confirm: Option<ConfirmRound>,
}

impl HopState {
    fn distinct_interfaces(&self) -> usize {
        self.flows
            .iter()
            .filter_map(Flow::revealed_interface)
            .collect::<HashSet<_>>()
            .len()
    }

    /// How many flows the stopping-rule table says are needed to confirm
    /// `observed + 1` interfaces given the interface count observed so
    /// far (spec §4.G: the table is always consulted for the *next*
    /// hypothesis, not the one already confirmed, since `n_k` probes
    /// only bound the false-negative rate for distinguishing `k`
    /// branches from `k - 1`).
    fn target_probe_count(&self, table: &StoppingRuleTable, max_k: u8) -> usize {
        let observed = u8::try_from(self.distinct_interfaces()).unwrap_or(max_k).max(1);
        table.n_k((observed + 1).clamp(2, max_k))
    }

    fn all_flows_resolved(&self) -> bool {
        self.flows.iter().all(Flow::is_resolved)
    }

    /// Whether `flow_id` belongs to this hop, either to its enumeration
    /// round or to an in-progress confirmation round.
    fn owns_flow(&self, flow_id: FlowId) -> bool {
        self.flows.iter().any(|f| f.flow_id == flow_id)
            || self
                .confirm
                .as_ref()
                .is_some_and(|c| c.pending.contains(&flow_id) || c.first.contains_key(&flow_id))
    }
}

/// One instruction the controller hands back to its driver.
#[derive(Debug, Clone)]
pub enum MdaAction {
    SendProbe { parent: NodeId, ttl: u8, flow_id: FlowId },
    HopEnumerated { parent: NodeId, ttl: u8 },
    /// A previously-unseen interface was added to the lattice as a child
    /// of `parent` (spec §4.G: one event per newly-discovered branch).
    NewLink {
        parent: NodeId,
        child: NodeId,
        address: Option<Address>,
    },
    Finished,
}

pub struct MdaAlgorithm {
    options: MdaOptions,
    table: StoppingRuleTable,
    template: ProbeTemplate,
    lattice: Lattice,
    frontier: Vec<HopState>,
    finished: bool,
}

impl MdaAlgorithm {
    #[must_use]
    pub fn new(options: MdaOptions, template: ProbeTemplate) -> Self {
        let table = StoppingRuleTable::build(options.confidence, options.max_branching);
        Self {
            options,
            table,
            template,
            lattice: Lattice::new(),
            frontier: Vec::new(),
            finished: false,
        }
    }

    #[must_use]
    pub fn template(&self) -> &ProbeTemplate {
        &self.template
    }

    #[must_use]
    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Starts enumeration at `min_ttl`, hanging the first hop off an
    /// implicit root standing in for the probing source itself.
    pub fn start(&mut self) -> Vec<MdaAction> {
        let source_ttl = self.options.traceroute.min_ttl.saturating_sub(1);
        let root = self.lattice.add_root(Interface::new(None, source_ttl));
        self.frontier.push(HopState {
            parent: root,
            ttl: self.options.traceroute.min_ttl,
            flows: Vec::new(),
            next_flow_id: 1,
            confirm: None,
        });
        let idx = self.frontier.len() - 1;
        self.dispatch_hop(idx)
    }

    fn dispatch_hop(&mut self, idx: usize) -> Vec<MdaAction> {
        let max_k = self.options.max_branching;
        let target = self.frontier[idx].target_probe_count(&self.table, max_k);
        let hop = &mut self.frontier[idx];
        let mut actions = Vec::new();
        while hop.flows.len() < target {
            let flow_id = FlowId(hop.next_flow_id);
            hop.next_flow_id += 1;
            hop.flows.push(Flow::new(flow_id));
            actions.push(MdaAction::SendProbe {
                parent: hop.parent,
                ttl: hop.ttl,
                flow_id,
            });
        }
        actions
    }

    /// Feeds one completed probe in, re-evaluating its hop and, once
    /// enumeration there settles, classifying the hop and recursing to
    /// its children. Replies belonging to an in-progress confirmation
    /// round are routed there instead of the normal enumeration path.
    pub fn on_reply(&mut self, reply: &Reply) -> Vec<MdaAction> {
        let Some(idx) = self
            .frontier
            .iter()
            .position(|h| h.ttl == reply.probe.ttl && h.owns_flow(reply.probe.flow_id))
        else {
            return Vec::new();
        };

        if self.frontier[idx].confirm.is_some() {
            return self.advance_confirm(idx, reply);
        }

        let mut actions = Vec::new();
        {
            let max_retries = self.options.max_flow_retries;
            let hop = &mut self.frontier[idx];
            if let Some(flow) = hop.flows.iter_mut().find(|f| f.flow_id == reply.probe.flow_id) {
                match reply.outcome.responder() {
                    Some(addr) => flow.mark_answered(addr),
                    None => {
                        if flow.mark_timed_out() <= max_retries {
                            flow.reset_for_retry();
                            actions.push(MdaAction::SendProbe {
                                parent: hop.parent,
                                ttl: hop.ttl,
                                flow_id: flow.flow_id,
                            });
                        }
                    }
                }
            }
        }

        actions.extend(self.dispatch_hop(idx));
        let target = self.frontier[idx].target_probe_count(&self.table, self.options.max_branching);
        let done = self.frontier[idx].flows.len() >= target && self.frontier[idx].all_flows_resolved();
        if done {
            actions.extend(self.begin_completion(idx));
        }
        actions
    }

    /// Enumeration at `idx` has produced as many flows as the stopping
    /// rule demands. If more than one distinct interface answered, a
    /// per-flow re-probe round is needed before classifying the hop as a
    /// per-flow vs. per-packet load balancer; otherwise it resolves
    /// immediately as a simple (non-branching) router.
    fn begin_completion(&mut self, idx: usize) -> Vec<MdaAction> {
        let answered_interfaces = self.frontier[idx].distinct_interfaces();
        if answered_interfaces <= 1 {
            return self.finish_hop(idx, LinkClass::SimpleRouter);
        }

        let hop = &mut self.frontier[idx];
        let first: HashMap<FlowId, Address> = hop
            .flows
            .iter()
            .filter_map(|f| f.revealed_interface().map(|addr| (f.flow_id, addr)))
            .collect();
        let pending: HashSet<FlowId> = first.keys().copied().collect();
        let sends = pending
            .iter()
            .map(|&flow_id| MdaAction::SendProbe {
                parent: hop.parent,
                ttl: hop.ttl,
                flow_id,
            })
            .collect();
        hop.confirm = Some(ConfirmRound {
            first,
            pending,
            second: HashMap::new(),
        });
        sends
    }

    /// Consumes one reply belonging to hop `idx`'s confirmation round.
    /// Once every re-probe has come back, compares each flow's second
    /// observation against its first: any mismatch means the next hop
    /// varies even within one flow (per-packet), otherwise it's stable
    /// (per-flow).
    fn advance_confirm(&mut self, idx: usize, reply: &Reply) -> Vec<MdaAction> {
        let flow_id = reply.probe.flow_id;
        {
            let confirm = self.frontier[idx].confirm.as_mut().expect("checked by caller");
            confirm.pending.remove(&flow_id);
            if let Some(addr) = reply.outcome.responder() {
                confirm.second.insert(flow_id, addr);
            }
        }
        if !self.frontier[idx].confirm.as_ref().expect("checked above").pending.is_empty() {
            return Vec::new();
        }

        let confirm = self.frontier[idx].confirm.take().expect("checked above");
        let consistent = confirm
            .first
            .iter()
            .all(|(flow_id, addr)| confirm.second.get(flow_id).map_or(true, |second| second == addr));
        let classification = if consistent {
            LinkClass::PerFlowLoadBalancer
        } else {
            LinkClass::PerPacketLoadBalancer
        };
        self.finish_hop(idx, classification)
    }

    /// Removes hop `idx` from the frontier, stitches its discovered
    /// interfaces into the lattice (classifying newly-created children
    /// as `classification`, overridden to `EndHost` for any interface
    /// whose address is the probed destination), and recurses into
    /// children that aren't the destination.
    fn finish_hop(&mut self, idx: usize, classification: LinkClass) -> Vec<MdaAction> {
        let hop = self.frontier.remove(idx);
        let mut actions = vec![MdaAction::HopEnumerated {
            parent: hop.parent,
            ttl: hop.ttl,
        }];

        let mut by_address: HashMap<Option<Address>, Vec<FlowId>> = HashMap::new();
        for flow in &hop.flows {
            by_address.entry(flow.revealed_interface()).or_default().push(flow.flow_id);
        }

        let mut children = Vec::new();
        for (address, flow_ids) in by_address {
            let existing = self.lattice.find_child_by_address(hop.parent, address);
            let node = existing.unwrap_or_else(|| {
                let mut interface = Interface::new(address, hop.ttl);
                interface.classification = if address == Some(self.template.dst) {
                    LinkClass::EndHost
                } else {
                    classification
                };
                interface.enumeration_done = true;
                self.lattice.add_child(hop.parent, interface)
            });
            if existing.is_none() {
                actions.push(MdaAction::NewLink {
                    parent: hop.parent,
                    child: node,
                    address,
                });
            }
            for flow_id in flow_ids {
                self.lattice.interface_mut(node).record_flow(flow_id);
            }
            if let Some(addr) = address {
                children.push((node, addr));
            }
        }

        if hop.ttl < self.options.traceroute.max_ttl {
            for (child, addr) in children {
                if addr == self.template.dst {
                    // The destination answered; nothing lies beyond it.
                    continue;
                }
                self.frontier.push(HopState {
                    parent: child,
                    ttl: hop.ttl + 1,
                    flows: Vec::new(),
                    next_flow_id: 1,
                    confirm: None,
                });
                let new_idx = self.frontier.len() - 1;
                actions.extend(self.dispatch_hop(new_idx));
            }
        }

        if self.frontier.is_empty() {
            self.finished = true;
            actions.push(MdaAction::Finished);
        }

        actions
    }

    /// Stops enumeration for `ttl` at `parent` early, e.g. because the
    /// destination answered at this hop and no children are needed
    /// (spec §4.G "terminate once the destination is reached").
    pub fn stop_hop(&mut self, parent: NodeId, ttl: u8) {
        if let Some(idx) = self.frontier.iter().position(|h| h.parent == parent && h.ttl == ttl) {
            self.frontier.remove(idx);
            if self.frontier.is_empty() {
                self.finished = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowState as FS;
    use crate::probe::{Probe, ProbeOutcome, ProbeTemplate, Protocol};
    use mda_packet::tcp::FlowIdentifierField;
    use std::net::Ipv4Addr;
    use std::time::{Duration, SystemTime};

    fn options() -> MdaOptions {
        let mut options = MdaOptions::default();
        options.confidence = 0.05;
        options.max_branching = 10;
        options.traceroute.min_ttl = 1;
        options.traceroute.max_ttl = 2;
        options
    }

    /// `max_ttl == min_ttl`: enumeration never recurses past the first
    /// hop, so a test can observe that hop's classification without also
    /// having to drive a second hop to completion.
    fn single_hop_options() -> MdaOptions {
        let mut options = options();
        options.traceroute.max_ttl = 1;
        options
    }

    fn template() -> ProbeTemplate {
        ProbeTemplate {
            protocol: Protocol::Udp,
            src: Address::V4(Ipv4Addr::new(192, 168, 0, 1)),
            dst: Address::V4(Ipv4Addr::new(8, 8, 8, 8)),
            src_port: 33434,
            dst_port: 33457,
            tcp_flow_field: FlowIdentifierField::SourcePort,
            payload_len: 12,
        }
    }

    fn reply_for(parent_ttl: u8, flow_id: FlowId, outcome: ProbeOutcome) -> Reply {
        let probe = Probe {
            sequence: 1,
            template: template(),
            flow_id,
            ttl: parent_ttl,
            round: 0,
            icmp_identifier: 0,
            icmp_sequence: 0,
            sent: SystemTime::now(),
        };
        Reply {
            probe,
            outcome,
            received: SystemTime::now(),
            rtt: Duration::from_millis(5),
        }
    }

    fn flow_ids_of(actions: &[MdaAction]) -> Vec<FlowId> {
        actions
            .iter()
            .filter_map(|a| match a {
                MdaAction::SendProbe { flow_id, .. } => Some(*flow_id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn start_sends_n_2_probes_for_the_first_hop() {
        let mut mda = MdaAlgorithm::new(options(), template());
        let actions = mda.start();
        // n_2 = 6 for alpha=0.05 is the initial hypothesis (one observed
        // interface clamped up to the minimum testable hypothesis of 2).
        assert_eq!(actions.len(), 6);
        assert!(actions.iter().all(|a| matches!(a, MdaAction::SendProbe { ttl: 1, .. })));
    }

    #[test]
    fn a_single_responding_interface_is_classified_as_a_simple_router() {
        let mut mda = MdaAlgorithm::new(options(), template());
        let sent = mda.start();
        let responder = Address::V4(Ipv4Addr::new(10, 0, 0, 1));
        let mut last_actions = Vec::new();
        for flow_id in flow_ids_of(&sent) {
            last_actions = mda.on_reply(&reply_for(1, flow_id, ProbeOutcome::TimeExceeded { responder }));
        }
        assert!(last_actions
            .iter()
            .any(|a| matches!(a, MdaAction::HopEnumerated { ttl: 1, .. })));
        assert!(last_actions.iter().any(|a| matches!(a, MdaAction::NewLink { .. })));
        let root = mda.lattice().roots()[0];
        let child = mda.lattice().find_child_by_address(root, Some(responder)).unwrap();
        assert_eq!(mda.lattice().interface(child).classification, LinkClass::SimpleRouter);
    }

    #[test]
    fn an_interface_matching_the_destination_is_classified_as_an_end_host() {
        let mut mda = MdaAlgorithm::new(options(), template());
        let sent = mda.start();
        let dst = template().dst;
        let mut last_actions = Vec::new();
        for flow_id in flow_ids_of(&sent) {
            last_actions = mda.on_reply(&reply_for(1, flow_id, ProbeOutcome::EchoReply { responder: dst }));
        }
        assert!(last_actions
            .iter()
            .any(|a| matches!(a, MdaAction::Finished)));
        let root = mda.lattice().roots()[0];
        let child = mda.lattice().find_child_by_address(root, Some(dst)).unwrap();
        assert_eq!(mda.lattice().interface(child).classification, LinkClass::EndHost);
    }

    /// Drives enumeration and any follow-up confirmation round to
    /// completion, answering each flow (by flow id, consistently across
    /// retries and confirmation re-probes) with `responder_of`.
    fn drive_to_completion(
        mda: &mut MdaAlgorithm,
        initial: Vec<MdaAction>,
        mut responder_of: impl FnMut(FlowId) -> Address,
    ) -> Vec<MdaAction> {
        let mut pending = flow_ids_of(&initial);
        let mut idx = 0;
        let mut last_actions = Vec::new();
        while idx < pending.len() {
            let flow_id = pending[idx];
            let responder = responder_of(flow_id);
            last_actions = mda.on_reply(&reply_for(1, flow_id, ProbeOutcome::TimeExceeded { responder }));
            pending.extend(flow_ids_of(&last_actions));
            idx += 1;
        }
        last_actions
    }

    #[test]
    fn two_interfaces_are_classified_as_a_per_flow_load_balancer() {
        let mut mda = MdaAlgorithm::new(single_hop_options(), template());
        let sent = mda.start();
        let a = Address::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = Address::V4(Ipv4Addr::new(10, 0, 0, 2));

        // Every flow id is hashed to the same next hop on every probe,
        // including the confirmation round's re-probes: a stable
        // assignment keyed by the flow id itself models that.
        let mut assignment: HashMap<FlowId, Address> = HashMap::new();
        let mut next_parity = 0usize;
        let last_actions = drive_to_completion(&mut mda, sent, |flow_id| {
            *assignment.entry(flow_id).or_insert_with(|| {
                let addr = if next_parity % 2 == 0 { a } else { b };
                next_parity += 1;
                addr
            })
        });

        assert!(last_actions.iter().any(|a| matches!(a, MdaAction::Finished)));
        let root = mda.lattice().roots()[0];
        let child_a = mda.lattice().find_child_by_address(root, Some(a));
        assert!(child_a.is_some());
        assert_eq!(
            mda.lattice().interface(child_a.unwrap()).classification,
            LinkClass::PerFlowLoadBalancer
        );
        let new_links = last_actions
            .iter()
            .filter(|a| matches!(a, MdaAction::NewLink { .. }))
            .count();
        assert!(new_links >= 2);
    }

    #[test]
    fn a_next_hop_that_varies_within_one_flow_is_a_per_packet_load_balancer() {
        let mut mda = MdaAlgorithm::new(single_hop_options(), template());
        let sent = mda.start();
        let a = Address::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = Address::V4(Ipv4Addr::new(10, 0, 0, 2));

        // First observation of a flow id picks its interface by send
        // order; any later re-probe of that same flow id (only the
        // confirmation round re-probes an already-answered flow) comes
        // back from the *other* interface instead, a genuinely
        // per-packet hop.
        let mut first_observed: HashMap<FlowId, Address> = HashMap::new();
        let mut next_parity = 0usize;
        let last_actions = drive_to_completion(&mut mda, sent, |flow_id| {
            if let Some(&first) = first_observed.get(&flow_id) {
                if first == a { b } else { a }
            } else {
                let addr = if next_parity % 2 == 0 { a } else { b };
                next_parity += 1;
                first_observed.insert(flow_id, addr);
                addr
            }
        });

        assert!(last_actions.iter().any(|a| matches!(a, MdaAction::Finished)));
        let root = mda.lattice().roots()[0];
        let child_a = mda.lattice().find_child_by_address(root, Some(a)).unwrap();
        assert_eq!(
            mda.lattice().interface(child_a).classification,
            LinkClass::PerPacketLoadBalancer
        );
    }

    #[test]
    fn flow_state_starts_pending() {
        let flow = Flow::new(FlowId(1));
        assert_eq!(flow.state, FS::Pending);
    }

    #[test]
    fn a_timed_out_flow_is_reprobed_up_to_max_flow_retries() {
        let mut opts = options();
        opts.max_flow_retries = 2;
        let mut mda = MdaAlgorithm::new(opts, template());
        let sent = mda.start();
        let first_flow = match sent[0] {
            MdaAction::SendProbe { flow_id, .. } => flow_id,
            _ => unreachable!(),
        };

        // Two timeouts on the same flow should each come back as a retry
        // (`SendProbe` for the same flow id), not an immediate give-up.
        let retry_one = mda.on_reply(&reply_for(1, first_flow, ProbeOutcome::Timeout));
        assert!(retry_one
            .iter()
            .any(|a| matches!(a, MdaAction::SendProbe { flow_id, .. } if *flow_id == first_flow)));
        let retry_two = mda.on_reply(&reply_for(1, first_flow, ProbeOutcome::Timeout));
        assert!(retry_two
            .iter()
            .any(|a| matches!(a, MdaAction::SendProbe { flow_id, .. } if *flow_id == first_flow)));

        // The third timeout exhausts the retry budget: no further
        // `SendProbe` is issued for this flow id.
        let retry_three = mda.on_reply(&reply_for(1, first_flow, ProbeOutcome::Timeout));
        assert!(!retry_three
            .iter()
            .any(|a| matches!(a, MdaAction::SendProbe { flow_id, .. } if *flow_id == first_flow)));
    }
}
