//! End-to-end scenarios for the MDA controller (spec §8), driven purely
//! through `start`/`on_reply`: a simple-router-then-load-balancer path,
//! a three-branch per-flow fan-out, and a per-packet load balancer.

use mda_core::mda_algorithm::{MdaAction, MdaAlgorithm};
use mda_core::options::MdaOptions;
use mda_core::probe::{FlowId, Probe, ProbeOutcome, ProbeTemplate, Protocol, Reply};
use mda_packet::tcp::FlowIdentifierField;
use mda_packet::Address;
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

fn template() -> ProbeTemplate {
    ProbeTemplate {
        protocol: Protocol::Udp,
        src: Address::V4(Ipv4Addr::new(192, 168, 1, 1)),
        dst: Address::V4(Ipv4Addr::new(8, 8, 8, 8)),
        src_port: 33434,
        dst_port: 33457,
        tcp_flow_field: FlowIdentifierField::SourcePort,
        payload_len: 12,
    }
}

fn single_hop_options() -> MdaOptions {
    let mut options = MdaOptions::default();
    options.confidence = 0.05;
    options.max_branching = 10;
    options.traceroute.min_ttl = 1;
    options.traceroute.max_ttl = 1;
    options
}

fn reply_for(ttl: u8, flow_id: FlowId, outcome: ProbeOutcome) -> Reply {
    let probe = Probe {
        sequence: 1,
        template: template(),
        flow_id,
        ttl,
        round: 0,
        icmp_identifier: 0,
        icmp_sequence: 0,
        sent: SystemTime::now(),
    };
    Reply {
        probe,
        outcome,
        received: SystemTime::now(),
        rtt: Duration::from_millis(10),
    }
}

/// Drains `mda`'s pending `SendProbe` queue, answering every flow with
/// `responder_of` (called consistently for both enumeration and any
/// follow-up confirmation re-probe of the same flow id), until the
/// controller reports `Finished`. Returns every action observed.
fn drain(mda: &mut MdaAlgorithm, initial: Vec<MdaAction>, mut responder_of: impl FnMut(u8, FlowId) -> Address) -> Vec<MdaAction> {
    let mut pending: VecDeque<(u8, FlowId)> = initial
        .into_iter()
        .filter_map(|a| match a {
            MdaAction::SendProbe { ttl, flow_id, .. } => Some((ttl, flow_id)),
            _ => None,
        })
        .collect();
    let mut all_actions = Vec::new();
    while let Some((ttl, flow_id)) = pending.pop_front() {
        let responder = responder_of(ttl, flow_id);
        let actions = mda.on_reply(&reply_for(ttl, flow_id, ProbeOutcome::TimeExceeded { responder }));
        for action in &actions {
            if let MdaAction::SendProbe { ttl, flow_id, .. } = action {
                pending.push_back((*ttl, *flow_id));
            }
        }
        all_actions.extend(actions);
    }
    all_actions
}

#[test]
fn two_hops_classify_as_simple_router_then_per_flow_load_balancer() {
    let mut options = MdaOptions::default();
    options.confidence = 0.05;
    options.max_branching = 10;
    options.traceroute.min_ttl = 1;
    options.traceroute.max_ttl = 2;
    let mut mda = MdaAlgorithm::new(options, template());

    let hop1 = Address::V4(Ipv4Addr::new(10, 0, 0, 1));
    let hop2a = Address::V4(Ipv4Addr::new(10, 0, 1, 1));
    let hop2b = Address::V4(Ipv4Addr::new(10, 0, 1, 2));

    // Stable per-flow assignment for hop 2 so the confirmation round's
    // re-probe of each flow id comes back from the same interface.
    let mut hop2_assignment: HashMap<FlowId, Address> = HashMap::new();
    let initial = mda.start();
    let actions = drain(&mut mda, initial, |ttl, flow_id| {
        if ttl == 1 {
            hop1
        } else {
            *hop2_assignment
                .entry(flow_id)
                .or_insert_with(|| if flow_id.0 % 2 == 0 { hop2a } else { hop2b })
        }
    });

    assert!(actions.iter().any(|a| matches!(a, MdaAction::Finished)));
    assert!(mda.is_finished());

    let root = mda.lattice().roots()[0];
    let hop1_node = mda.lattice().find_child_by_address(root, Some(hop1)).expect("hop 1 present");
    assert_eq!(
        mda.lattice().interface(hop1_node).classification,
        mda_core::interface::LinkClass::SimpleRouter
    );

    let hop2a_node = mda
        .lattice()
        .find_child_by_address(hop1_node, Some(hop2a))
        .expect("first hop-2 interface present");
    let hop2b_node = mda
        .lattice()
        .find_child_by_address(hop1_node, Some(hop2b))
        .expect("second hop-2 interface present");
    assert_eq!(
        mda.lattice().interface(hop2a_node).classification,
        mda_core::interface::LinkClass::PerFlowLoadBalancer
    );
    assert_eq!(
        mda.lattice().interface(hop2b_node).classification,
        mda_core::interface::LinkClass::PerFlowLoadBalancer
    );
}

/// Three next hops fanning out from a single interface. Once a second
/// branch appears the hypothesis escalates from 2 to 3 (target `n_3 =
/// 11`, alpha=0.05), and once the third actually shows up it escalates
/// again to `n_4 = 16` to rule out a fourth before settling — the
/// stopping rule only concludes "3 branches" once that many probes have
/// come back with no further branch appearing. Each of the three
/// branches gets its own `NewLink`.
#[test]
fn three_way_fan_out_escalates_past_n_3_and_emits_three_new_links() {
    let mut mda = MdaAlgorithm::new(single_hop_options(), template());
    let branches = [
        Address::V4(Ipv4Addr::new(10, 0, 2, 1)),
        Address::V4(Ipv4Addr::new(10, 0, 2, 2)),
        Address::V4(Ipv4Addr::new(10, 0, 2, 3)),
    ];

    let mut assignment: HashMap<FlowId, Address> = HashMap::new();
    let mut next = 0usize;
    let initial = mda.start();
    let first_round_len = initial.len();
    assert_eq!(first_round_len, 6, "n_2 = 6 is the initial hypothesis");

    let actions = drain(&mut mda, initial, |_ttl, flow_id| {
        *assignment.entry(flow_id).or_insert_with(|| {
            let addr = branches[next % branches.len()];
            next += 1;
            addr
        })
    });

    assert!(actions.iter().any(|a| matches!(a, MdaAction::Finished)));
    assert_eq!(
        assignment.len(),
        16,
        "n_4 = 16 probes needed to confirm exactly 3 branches with no fourth"
    );

    let new_links = actions.iter().filter(|a| matches!(a, MdaAction::NewLink { .. })).count();
    assert_eq!(new_links, 3);

    let root = mda.lattice().roots()[0];
    for branch in branches {
        let node = mda.lattice().find_child_by_address(root, Some(branch)).expect("branch present");
        assert_eq!(
            mda.lattice().interface(node).classification,
            mda_core::interface::LinkClass::PerFlowLoadBalancer
        );
    }
}

/// A next hop that varies even within a single flow (i.e. answers a
/// confirmation re-probe with a *different* address than its first
/// enumeration response) is a per-packet load balancer, not per-flow.
#[test]
fn a_next_hop_that_varies_within_a_flow_is_classified_per_packet() {
    let mut mda = MdaAlgorithm::new(single_hop_options(), template());
    let a = Address::V4(Ipv4Addr::new(10, 0, 3, 1));
    let b = Address::V4(Ipv4Addr::new(10, 0, 3, 2));

    let mut first_seen: HashMap<FlowId, Address> = HashMap::new();
    let mut next = 0usize;
    let initial = mda.start();
    let actions = drain(&mut mda, initial, |_ttl, flow_id| {
        if let Some(&first) = first_seen.get(&flow_id) {
            if first == a {
                b
            } else {
                a
            }
        } else {
            let addr = if next % 2 == 0 { a } else { b };
            next += 1;
            first_seen.insert(flow_id, addr);
            addr
        }
    });

    assert!(actions.iter().any(|a| matches!(a, MdaAction::Finished)));
    let root = mda.lattice().roots()[0];
    let node_a = mda.lattice().find_child_by_address(root, Some(a)).expect("interface a present");
    assert_eq!(
        mda.lattice().interface(node_a).classification,
        mda_core::interface::LinkClass::PerPacketLoadBalancer
    );
}
